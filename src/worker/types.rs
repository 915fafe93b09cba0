use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::AnyRuntime;
use crate::stats::Stats;
use crate::store::{Store, StoreError};
use crate::task::{State, Task};

/// One worker: a queue of lifecycle requests, the local task database, and
/// the runtime adapter that does the actual container work. Shared between
/// the API server and the control loops behind one async mutex.
pub struct Worker {
    pub name: String,
    pub queue: VecDeque<Task>,
    pub db: Box<dyn Store<Task> + Send + Sync>,
    pub task_count: u64,
    pub runtime: AnyRuntime,
    pub stats: Stats,
    pub(crate) system: sysinfo::System,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no tasks in the queue")]
    EmptyQueue,
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: State, to: State },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error envelope returned by the worker API and decoded by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrResponse {
    #[serde(rename = "HTTPStatusCode")]
    pub http_status_code: u16,
    #[serde(rename = "Message")]
    pub message: String,
}
