//! String-keyed persistence behind the task and event databases.

mod memory;
mod persistent;

pub use memory::MemoryStore;
pub use persistent::SqliteStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key/value persistence contract shared by the in-memory and on-disk
/// variants. Every call is total: callers get an explicit error and decide
/// locally whether to retry, requeue, or skip.
pub trait Store<T>: Send {
    /// Upsert. Fails only on an underlying I/O error.
    fn put(&mut self, key: &str, value: &T) -> Result<(), StoreError>;
    /// Fails with [`StoreError::NotFound`] when the key is absent.
    fn get(&self, key: &str) -> Result<T, StoreError>;
    /// All current values, in unspecified order.
    fn list(&self) -> Result<Vec<T>, StoreError>;
    fn count(&self) -> Result<usize, StoreError>;
    /// Idempotent; deleting an absent key is not an error.
    fn delete(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Which store backs a manager or worker, chosen at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Memory,
    Persistent,
}

impl DbKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "persistent" => DbKind::Persistent,
            _ => DbKind::Memory,
        }
    }
}
