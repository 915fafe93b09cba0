//! Container runtime adapters. The worker holds exactly one, picked at
//! configuration time; the rest of the crate treats it as a black box.

mod docker;
mod fake;

pub use docker::DockerRuntime;
pub use fake::FakeRuntime;

use thiserror::Error;

use crate::task::{Config, HostPortMap};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("engine connection failed: {0}")]
    Connection(String),
    #[error("image pull failed: {0}")]
    ImagePull(String),
    #[error("container create failed: {0}")]
    Create(String),
    #[error("container start failed: {0}")]
    Start(String),
    #[error("container stop failed: {0}")]
    Stop(String),
    #[error("container remove failed: {0}")]
    Remove(String),
    #[error("container inspect failed: {0}")]
    Inspect(String),
    #[error("container not found: {0}")]
    NotFound(String),
}

/// Outcome of a run or stop call against the engine.
#[derive(Debug, Clone, Default)]
pub struct ContainerResult {
    pub container_id: String,
    pub action: String,
    pub result: String,
    pub error: Option<RuntimeError>,
}

impl ContainerResult {
    pub fn success(container_id: String, action: &str) -> Self {
        ContainerResult {
            container_id,
            action: action.to_string(),
            result: "success".to_string(),
            error: None,
        }
    }

    pub fn failure(error: RuntimeError) -> Self {
        ContainerResult {
            error: Some(error),
            ..ContainerResult::default()
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// Current container state as reported by the engine. Status values worth
/// reacting to are "running" and "exited".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InspectResponse {
    pub status: String,
    pub host_ports: HostPortMap,
}

#[allow(async_fn_in_trait)]
pub trait Runtime {
    /// Pull the image if absent, create a container from the config, start
    /// it. Any sub-step failure is returned without starting.
    async fn run(&self, config: &Config) -> ContainerResult;
    /// Graceful stop, then remove. Removal failures are reported but callers
    /// may still converge the task.
    async fn stop(&self, container_id: &str) -> ContainerResult;
    async fn inspect(&self, container_id: &str) -> Result<InspectResponse, RuntimeError>;
}

/// Tagged adapter selection; no trait objects needed.
#[derive(Debug, Clone)]
pub enum AnyRuntime {
    Docker(DockerRuntime),
    Fake(FakeRuntime),
}

impl Runtime for AnyRuntime {
    async fn run(&self, config: &Config) -> ContainerResult {
        match self {
            AnyRuntime::Docker(r) => r.run(config).await,
            AnyRuntime::Fake(r) => r.run(config).await,
        }
    }

    async fn stop(&self, container_id: &str) -> ContainerResult {
        match self {
            AnyRuntime::Docker(r) => r.stop(container_id).await,
            AnyRuntime::Fake(r) => r.stop(container_id).await,
        }
    }

    async fn inspect(&self, container_id: &str) -> Result<InspectResponse, RuntimeError> {
        match self {
            AnyRuntime::Docker(r) => r.inspect(container_id).await,
            AnyRuntime::Fake(r) => r.inspect(container_id).await,
        }
    }
}
