use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use uuid::Uuid;

use crate::node::Node;
use crate::scheduler::AnyScheduler;
use crate::store::{Store, StoreError};
use crate::task::{Task, TaskEvent};

/// The control plane: pending events, the task and event databases, the
/// node inventory, and the two task/worker indexes. Shared between the API
/// server and the control loops behind one async mutex, so the indexes (and
/// everything else) always change together.
pub struct Manager {
    pub pending: VecDeque<TaskEvent>,
    pub task_db: Box<dyn Store<Task> + Send + Sync>,
    pub event_db: Box<dyn Store<TaskEvent> + Send + Sync>,
    /// Static worker list (host:port), fixed at construction.
    pub workers: Vec<String>,
    /// Worker name -> tasks placed on it. Must agree with `task_worker_map`.
    pub worker_task_map: HashMap<String, Vec<Uuid>>,
    /// Task -> worker name owning it. Must agree with `worker_task_map`.
    pub task_worker_map: HashMap<Uuid, String>,
    pub worker_nodes: Vec<Node>,
    pub scheduler: AnyScheduler,
    pub(crate) client: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("health check failed: {0}")]
    HealthCheck(String),
}
