use std::sync::{Arc, Mutex};

use super::{ContainerResult, InspectResponse, Runtime, RuntimeError};
use crate::task::Config;

/// Scripted runtime for tests: records every call and answers from fixed
/// responses instead of talking to an engine.
#[derive(Debug, Clone)]
pub struct FakeRuntime {
    calls: Arc<Mutex<Vec<String>>>,
    container_id: String,
    fail_run: bool,
    fail_stop: bool,
    inspect: Arc<Mutex<Result<InspectResponse, RuntimeError>>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        FakeRuntime {
            calls: Arc::new(Mutex::new(Vec::new())),
            container_id: "fake-container".to_string(),
            fail_run: false,
            fail_stop: false,
            inspect: Arc::new(Mutex::new(Ok(InspectResponse {
                status: "running".to_string(),
                host_ports: Default::default(),
            }))),
        }
    }

    pub fn with_container_id(id: &str) -> Self {
        FakeRuntime {
            container_id: id.to_string(),
            ..FakeRuntime::new()
        }
    }

    /// All run calls will fail at the start step.
    pub fn failing_run() -> Self {
        FakeRuntime {
            fail_run: true,
            ..FakeRuntime::new()
        }
    }

    /// All stop calls will report an engine error.
    pub fn failing_stop() -> Self {
        FakeRuntime {
            fail_stop: true,
            ..FakeRuntime::new()
        }
    }

    /// Replace the scripted inspect answer.
    pub fn set_inspect(&self, response: Result<InspectResponse, RuntimeError>) {
        *self.inspect.lock().unwrap() = response;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        FakeRuntime::new()
    }
}

impl Runtime for FakeRuntime {
    async fn run(&self, config: &Config) -> ContainerResult {
        self.record(format!("run {}", config.name));
        if self.fail_run {
            ContainerResult::failure(RuntimeError::Start("scripted start failure".to_string()))
        } else {
            ContainerResult::success(self.container_id.clone(), "start")
        }
    }

    async fn stop(&self, container_id: &str) -> ContainerResult {
        self.record(format!("stop {container_id}"));
        if self.fail_stop {
            ContainerResult {
                container_id: container_id.to_string(),
                action: "stop".to_string(),
                result: String::new(),
                error: Some(RuntimeError::Stop("scripted stop failure".to_string())),
            }
        } else {
            ContainerResult::success(container_id.to_string(), "stop")
        }
    }

    async fn inspect(&self, container_id: &str) -> Result<InspectResponse, RuntimeError> {
        self.record(format!("inspect {container_id}"));
        self.inspect.lock().unwrap().clone()
    }
}
