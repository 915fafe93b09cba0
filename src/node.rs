//! Worker node inventory entries held by the manager.

use serde::{Deserialize, Serialize};

use crate::stats::Stats;

/// A known worker endpoint: capacity, allocation counters, and the last
/// stats snapshot observed by the reconcile loop. Created from the static
/// worker list at manager start and never destroyed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// host:port of the worker, also its identity in the task/worker maps.
    pub name: String,
    /// Base URL of the worker API.
    pub api: String,
    pub role: String,
    pub cores: u64,
    /// Memory capacity in bytes, learned from the first stats snapshot.
    pub memory: u64,
    pub memory_allocated: u64,
    /// Disk capacity in bytes, learned from the first stats snapshot.
    pub disk: u64,
    pub disk_allocated: u64,
    pub stats: Option<Stats>,
    pub task_count: u64,
}

impl Node {
    pub fn new(name: &str, api: &str, role: &str) -> Self {
        Node {
            name: name.to_string(),
            api: api.to_string(),
            role: role.to_string(),
            ..Node::default()
        }
    }

    /// Disk still available for placement.
    pub fn disk_remaining(&self) -> u64 {
        self.disk.saturating_sub(self.disk_allocated)
    }
}
