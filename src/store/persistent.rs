use std::marker::PhantomData;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{Store, StoreError};

/// SQLite-backed store: one file per store, one named bucket (table) inside,
/// keys are UUID strings and values are serde_json payloads. Survives process
/// restarts; each call runs as its own implicit transaction.
///
/// The connection is behind a `Mutex` solely so the store is `Sync` (callers
/// only ever reach it while already holding the manager/worker's own async
/// lock, so this never actually contends).
pub struct SqliteStore<T> {
    conn: Mutex<Connection>,
    bucket: String,
    _value: PhantomData<fn() -> T>,
}

impl<T> SqliteStore<T> {
    /// Open or create the store file with the given bucket.
    pub fn open<P: AsRef<Path>>(path: P, bucket: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn, bucket)
    }

    /// In-memory variant for tests.
    pub fn open_in_memory(bucket: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, bucket)
    }

    fn with_connection(conn: Connection, bucket: &str) -> Result<Self, StoreError> {
        // Bucket names are internal constants, never user input.
        debug_assert!(bucket.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {bucket} (key TEXT PRIMARY KEY, value BLOB NOT NULL);"
        ))?;
        debug!(bucket, "store schema ready");
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            bucket: bucket.to_string(),
            _value: PhantomData,
        })
    }
}

impl<T: Serialize + DeserializeOwned + Send> Store<T> for SqliteStore<T> {
    fn put(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(value)?;
        self.conn.get_mut().unwrap().execute(
            &format!(
                "INSERT INTO {} (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                self.bucket
            ),
            params![key, payload],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<T, StoreError> {
        let payload: Option<Vec<u8>> = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", self.bucket),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT value FROM {}", self.bucket))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(StoreError::from))
            .collect()
    }

    fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self.conn.lock().unwrap().query_row(
            &format!("SELECT COUNT(*) FROM {}", self.bucket),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.conn.get_mut().unwrap().execute(
            &format!("DELETE FROM {} WHERE key = ?1", self.bucket),
            params![key],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::task::{HostPort, PortMapping, RestartPolicy, State, Task};

    fn full_task() -> Task {
        Task {
            container_id: "deadbeef".to_string(),
            name: "round-trip".to_string(),
            state: State::Running,
            image: "strm/helloworld-http".to_string(),
            cpu: 512,
            memory: 64 * 1024 * 1024,
            disk: 1024 * 1024 * 1024,
            exposed_ports: vec![PortMapping {
                container_port: 80,
                host_port: 8080,
                protocol: "tcp".to_string(),
            }],
            host_ports: HashMap::from([(
                "80/tcp".to_string(),
                vec![HostPort {
                    host_ip: "0.0.0.0".to_string(),
                    host_port: "8080".to_string(),
                }],
            )]),
            restart_policy: RestartPolicy::OnFailure,
            start_time: Some(Utc::now()),
            finish_time: None,
            health_check: "/health".to_string(),
            restart_count: 1,
            ..Task::default()
        }
    }

    #[test]
    fn task_round_trips_on_every_field() {
        let mut store: SqliteStore<Task> = SqliteStore::open_in_memory("tasks").unwrap();
        let task = full_task();
        store.put(&task.id.to_string(), &task).unwrap();
        assert_eq!(store.get(&task.id.to_string()).unwrap(), task);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let task = full_task();

        {
            let mut store: SqliteStore<Task> = SqliteStore::open(&path, "tasks").unwrap();
            store.put(&task.id.to_string(), &task).unwrap();
        }

        let store: SqliteStore<Task> = SqliteStore::open(&path, "tasks").unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get(&task.id.to_string()).unwrap(), task);
    }

    #[test]
    fn missing_keys_and_idempotent_delete() {
        let mut store: SqliteStore<Task> = SqliteStore::open_in_memory("tasks").unwrap();
        assert!(matches!(store.get("nope"), Err(StoreError::NotFound(_))));
        store.delete("nope").unwrap();

        let task = full_task();
        store.put(&task.id.to_string(), &task).unwrap();
        store.delete(&task.id.to_string()).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}
