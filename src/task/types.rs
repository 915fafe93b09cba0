use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task. Legal moves between states are decided by
/// [`super::state::valid_state_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum State {
    #[default]
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Pending => "Pending",
            State::Scheduled => "Scheduled",
            State::Running => "Running",
            State::Completed => "Completed",
            State::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Container restart policy, passed through to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestartPolicy {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "unless-stopped")]
    UnlessStopped,
    #[serde(rename = "on-failure")]
    OnFailure,
}

/// A requested port mapping from a container port to a host port.
/// A zero host port asks the engine to assign one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    #[serde(default)]
    pub host_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// One observed host-side binding for a container port.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostPort {
    pub host_ip: String,
    pub host_port: String,
}

/// Observed bindings keyed by container port ("80/tcp").
pub type HostPortMap = HashMap<String, Vec<HostPort>>;

/// One container workload: the user's request plus what has been observed
/// about it since.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Empty until the task has entered Running at least once.
    #[serde(default)]
    pub container_id: String,
    pub name: String,
    #[serde(default)]
    pub state: State,
    pub image: String,
    /// CPU shares (1024 = one core).
    #[serde(default)]
    pub cpu: u64,
    /// Memory request in bytes.
    #[serde(default)]
    pub memory: u64,
    /// Disk request in bytes.
    #[serde(default)]
    pub disk: u64,
    #[serde(default)]
    pub exposed_ports: Vec<PortMapping>,
    #[serde(default)]
    pub host_ports: HostPortMap,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
    /// HTTP path probed by the manager's health-check loop ("/health").
    #[serde(default)]
    pub health_check: String,
    #[serde(default)]
    pub restart_count: u32,
}

impl Default for Task {
    fn default() -> Self {
        Task {
            id: Uuid::new_v4(),
            container_id: String::new(),
            name: String::new(),
            state: State::Pending,
            image: String::new(),
            cpu: 0,
            memory: 0,
            disk: 0,
            exposed_ports: Vec::new(),
            host_ports: HashMap::new(),
            restart_policy: RestartPolicy::None,
            start_time: None,
            finish_time: None,
            health_check: String::new(),
            restart_count: 0,
        }
    }
}

/// A request to drive a task to a target state. Created by clients, persisted
/// when dispatched, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: Uuid,
    pub state: State,
    pub timestamp: DateTime<Utc>,
    pub task: Task,
}

impl TaskEvent {
    pub fn new(state: State, task: Task) -> Self {
        TaskEvent {
            id: Uuid::new_v4(),
            state,
            timestamp: Utc::now(),
            task,
        }
    }
}

/// Container configuration handed to the runtime adapter, derived from a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub name: String,
    pub image: String,
    pub cpu: u64,
    pub memory: u64,
    pub disk: u64,
    pub env: Vec<String>,
    pub exposed_ports: Vec<PortMapping>,
    pub restart_policy: RestartPolicy,
}

impl Config {
    pub fn from_task(task: &Task) -> Self {
        Config {
            name: task.name.clone(),
            image: task.image.clone(),
            cpu: task.cpu,
            memory: task.memory,
            disk: task.disk,
            env: Vec::new(),
            exposed_ports: task.exposed_ports.clone(),
            restart_policy: task.restart_policy,
        }
    }
}
