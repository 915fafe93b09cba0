use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sysinfo::System;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{Worker, WorkerError};
use crate::runtime::{AnyRuntime, ContainerResult, Runtime, RuntimeError};
use crate::stats::Stats;
use crate::store::{DbKind, MemoryStore, SqliteStore, Store, StoreError};
use crate::task::{valid_state_transition, Config, State, Task};

pub const EXECUTE_INTERVAL: Duration = Duration::from_secs(10);
pub const INSPECT_INTERVAL: Duration = Duration::from_secs(15);
pub const STATS_INTERVAL: Duration = Duration::from_secs(15);

impl Worker {
    pub fn new(name: &str, db_kind: DbKind, runtime: AnyRuntime) -> Result<Self, StoreError> {
        let db: Box<dyn Store<Task> + Send + Sync> = match db_kind {
            DbKind::Memory => Box::new(MemoryStore::new()),
            DbKind::Persistent => {
                Box::new(SqliteStore::open(format!("{name}_tasks.db"), "tasks")?)
            }
        };
        Ok(Worker {
            name: name.to_string(),
            queue: VecDeque::new(),
            db,
            task_count: 0,
            runtime,
            stats: Stats::default(),
            system: System::new_all(),
        })
    }

    /// Enqueue a lifecycle request for the execute loop.
    pub fn add_task(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    /// Snapshot of the local task database.
    pub fn get_tasks(&self) -> Vec<Task> {
        match self.db.list() {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "failed to list tasks");
                Vec::new()
            }
        }
    }

    pub fn find_task(&self, id: &Uuid) -> Option<Task> {
        self.db.get(&id.to_string()).ok()
    }

    pub fn stats(&self) -> Stats {
        self.stats.clone()
    }

    /// One execute-loop iteration: dequeue a request, guard the transition
    /// against the persisted record, and drive the runtime.
    pub async fn run_next_task(&mut self) -> Result<ContainerResult, WorkerError> {
        let incoming = self.queue.pop_front().ok_or(WorkerError::EmptyQueue)?;
        let key = incoming.id.to_string();

        let persisted = match self.db.get(&key) {
            Ok(task) => task,
            Err(StoreError::NotFound(_)) => {
                // First observation of this task.
                self.db.put(&key, &incoming)?;
                incoming.clone()
            }
            Err(e) => return Err(e.into()),
        };

        if !valid_state_transition(&persisted.state, &incoming.state) {
            warn!(
                task_id = %incoming.id,
                from = %persisted.state,
                to = %incoming.state,
                "rejecting invalid state transition"
            );
            self.db.put(&key, &persisted)?;
            return Err(WorkerError::InvalidTransition {
                from: persisted.state,
                to: incoming.state,
            });
        }

        match incoming.state {
            State::Scheduled => self.start_task(incoming).await,
            State::Completed => self.stop_task(incoming).await,
            _ => {
                debug!(task_id = %incoming.id, state = %incoming.state, "no lifecycle action");
                self.db.put(&key, &persisted)?;
                Ok(ContainerResult::default())
            }
        }
    }

    /// Stamp the start time, run the container, and persist Running or
    /// Failed depending on the outcome.
    pub async fn start_task(&mut self, mut task: Task) -> Result<ContainerResult, WorkerError> {
        task.start_time = Some(Utc::now());
        let config = Config::from_task(&task);

        let result = self.runtime.run(&config).await;
        if let Some(err) = &result.error {
            error!(task_id = %task.id, error = %err, "failed to start task");
            task.state = State::Failed;
            self.db.put(&task.id.to_string(), &task)?;
            return Ok(result);
        }

        task.container_id = result.container_id.clone();
        task.state = State::Running;
        self.db.put(&task.id.to_string(), &task)?;
        info!(task_id = %task.id, container_id = %task.container_id, "task running");
        Ok(result)
    }

    /// Best-effort stop. The task converges to Completed with a finish time
    /// even when the engine reports an error; a stop request is an intent
    /// and the container may already be gone.
    pub async fn stop_task(&mut self, mut task: Task) -> Result<ContainerResult, WorkerError> {
        let result = self.runtime.stop(&task.container_id).await;
        if let Some(err) = &result.error {
            warn!(
                task_id = %task.id,
                container_id = %task.container_id,
                error = %err,
                "stop reported an error, completing anyway"
            );
        }

        task.finish_time = Some(Utc::now());
        task.state = State::Completed;
        self.db.put(&task.id.to_string(), &task)?;
        info!(task_id = %task.id, container_id = %task.container_id, "task stopped");
        Ok(result)
    }

    /// One inspect-loop iteration: verify every Running task against the
    /// engine, marking vanished or exited containers Failed and copying
    /// observed host bindings otherwise.
    pub async fn inspect_tasks(&mut self) {
        let running: Vec<Task> = self
            .get_tasks()
            .into_iter()
            .filter(|t| t.state == State::Running)
            .collect();

        for mut task in running {
            match self.runtime.inspect(&task.container_id).await {
                Ok(resp) if resp.status == "exited" => {
                    warn!(task_id = %task.id, "container exited, marking failed");
                    task.state = State::Failed;
                }
                Ok(resp) => {
                    task.host_ports = resp.host_ports;
                }
                Err(RuntimeError::NotFound(_)) => {
                    warn!(task_id = %task.id, "container missing, marking failed");
                    task.state = State::Failed;
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "inspect failed, skipping");
                    continue;
                }
            }
            if let Err(e) = self.db.put(&task.id.to_string(), &task) {
                error!(task_id = %task.id, error = %e, "failed to persist inspected task");
            }
        }
    }

    /// One stats-loop iteration: refresh the snapshot and the running-task
    /// count.
    pub fn collect_stats(&mut self) {
        let running = self
            .get_tasks()
            .iter()
            .filter(|t| t.state == State::Running)
            .count() as u64;
        self.task_count = running;
        self.stats = Stats::collect(&mut self.system, running);
    }
}

/// Drains the queue one task per tick.
pub async fn run_execute_loop(worker: Arc<Mutex<Worker>>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(EXECUTE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let mut w = worker.lock().await;
                if w.queue.is_empty() {
                    debug!("no tasks to process");
                    continue;
                }
                match w.run_next_task().await {
                    Ok(result) => debug!(action = %result.action, "task processed"),
                    Err(e) => warn!(error = %e, "task iteration failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("execute loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Verifies Running tasks against the engine every tick.
pub async fn run_inspect_loop(worker: Arc<Mutex<Worker>>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(INSPECT_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                debug!("checking status of running tasks");
                worker.lock().await.inspect_tasks().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("inspect loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Refreshes the resource snapshot every tick.
pub async fn run_stats_loop(worker: Arc<Mutex<Worker>>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(STATS_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                debug!("collecting stats");
                worker.lock().await.collect_stats();
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("stats loop shutting down");
                    break;
                }
            }
        }
    }
}
