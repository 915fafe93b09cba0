use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{Manager, ManagerError};
use crate::node::Node;
use crate::scheduler::{AnyScheduler, Scheduler, SchedulingError};
use crate::stats::Stats;
use crate::store::{DbKind, MemoryStore, SqliteStore, Store, StoreError};
use crate::task::{valid_state_transition, State, Task, TaskEvent};
use crate::worker::ErrResponse;

pub const DISPATCH_INTERVAL: Duration = Duration::from_secs(10);
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(15);
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

const POST_TIMEOUT: Duration = Duration::from_secs(5);
const GET_TIMEOUT: Duration = Duration::from_secs(2);

/// Tasks at this restart count are left alone by the health-check loop.
const MAX_RESTARTS: u32 = 3;

impl Manager {
    pub fn new(
        workers: Vec<String>,
        scheduler: AnyScheduler,
        db_kind: DbKind,
    ) -> Result<Self, ManagerError> {
        let mut worker_task_map = HashMap::new();
        let mut worker_nodes = Vec::new();
        for worker in &workers {
            worker_task_map.insert(worker.clone(), Vec::new());
            worker_nodes.push(Node::new(worker, &format!("http://{worker}"), "worker"));
        }

        let (task_db, event_db): (
            Box<dyn Store<Task> + Send + Sync>,
            Box<dyn Store<TaskEvent> + Send + Sync>,
        ) = match db_kind {
            DbKind::Memory => (Box::new(MemoryStore::new()), Box::new(MemoryStore::new())),
            DbKind::Persistent => (
                Box::new(SqliteStore::open("tasks.db", "tasks")?),
                Box::new(SqliteStore::open("events.db", "events")?),
            ),
        };

        Ok(Manager {
            pending: VecDeque::new(),
            task_db,
            event_db,
            workers,
            worker_task_map,
            task_worker_map: HashMap::new(),
            worker_nodes,
            scheduler,
            client: reqwest::Client::new(),
        })
    }

    /// Append an event to the pending queue for the dispatch loop.
    pub fn add_event(&mut self, event: TaskEvent) {
        self.pending.push_back(event);
    }

    /// Snapshot of the persisted tasks.
    pub fn get_tasks(&self) -> Vec<Task> {
        match self.task_db.list() {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "failed to list tasks");
                Vec::new()
            }
        }
    }

    pub fn find_task(&self, id: &Uuid) -> Option<Task> {
        self.task_db.get(&id.to_string()).ok()
    }

    /// Snapshot of the node inventory.
    pub fn get_nodes(&self) -> Vec<Node> {
        self.worker_nodes.clone()
    }

    /// Run the scheduler's three-step protocol over a snapshot of the
    /// inventory; returns the picked node and its candidate index.
    pub fn select_worker(&self, task: &Task) -> Result<(Node, usize), SchedulingError> {
        let candidates = self.scheduler.select_candidate_nodes(task, &self.worker_nodes);
        if candidates.is_empty() {
            return Err(SchedulingError::NoCandidates);
        }
        let scores = self.scheduler.score(task, &candidates);
        let node = self
            .scheduler
            .pick(&scores, &candidates)
            .ok_or(SchedulingError::NoCandidates)?;
        let index = candidates
            .iter()
            .position(|c| c.name == node.name)
            .unwrap_or(0);
        Ok((node, index))
    }

    /// One dispatch-loop iteration: pull an event off the pending queue,
    /// persist it, and either forward a stop to the owning worker or place
    /// the task on a node picked by the scheduler.
    pub async fn send_work(&mut self) {
        let Some(event) = self.pending.pop_front() else {
            debug!("no work in the queue");
            return;
        };

        if let Err(e) = self.event_db.put(&event.id.to_string(), &event) {
            error!(event_id = %event.id, error = %e, "failed to persist event, requeueing");
            self.pending.push_back(event);
            return;
        }
        debug!(event_id = %event.id, task_id = %event.task.id, "pulled event off the queue");

        // A task that already has a worker can only be asked to stop.
        if let Some(worker) = self.task_worker_map.get(&event.task.id).cloned() {
            let persisted = match self.task_db.get(&event.task.id.to_string()) {
                Ok(task) => task,
                Err(e) => {
                    error!(task_id = %event.task.id, error = %e, "unable to load mapped task");
                    return;
                }
            };
            if event.state == State::Completed
                && valid_state_transition(&persisted.state, &event.state)
            {
                self.stop_task(&worker, &event).await;
            } else {
                warn!(
                    task_id = %persisted.id,
                    state = %persisted.state,
                    requested = %event.state,
                    "rejecting request for task that already has a worker"
                );
            }
            return;
        }

        let mut task = event.task.clone();
        let (node, index) = match self.select_worker(&task) {
            Ok(picked) => picked,
            Err(e) => {
                // The event stays in the event db as an audit record.
                error!(task_id = %task.id, error = %e, "dropping event");
                return;
            }
        };

        task.state = State::Scheduled;
        if let Err(e) = self.task_db.put(&task.id.to_string(), &task) {
            error!(task_id = %task.id, error = %e, "failed to persist task, requeueing");
            self.pending.push_back(event);
            return;
        }

        self.commit_placement(&node.name, &task);

        let mut outbound = event.clone();
        outbound.task = task.clone();
        let url = format!("{}/tasks", node.api);
        match self
            .client
            .post(&url)
            .json(&outbound)
            .timeout(POST_TIMEOUT)
            .send()
            .await
        {
            Err(e) => {
                warn!(worker = %node.name, error = %e, "dispatch failed in transport, requeueing");
                self.rollback_placement(&node.name, &task);
                self.pending.push_back(event);
            }
            Ok(resp) => {
                // Rotation advances only once the worker has the event.
                self.scheduler.note_pick(index);
                if resp.status() != StatusCode::CREATED {
                    let status = resp.status();
                    let message = match resp.json::<ErrResponse>().await {
                        Ok(err) => err.message,
                        Err(e) => format!("undecodable error body: {e}"),
                    };
                    // Worker-side validation failure; not retried.
                    error!(worker = %node.name, %status, %message, "worker rejected dispatch");
                    return;
                }
                match resp.json::<Task>().await {
                    Ok(accepted) => {
                        info!(task_id = %accepted.id, worker = %node.name, "task dispatched")
                    }
                    Err(e) => error!(error = %e, "failed to decode worker response"),
                }
            }
        }
    }

    fn commit_placement(&mut self, worker: &str, task: &Task) {
        self.worker_task_map
            .entry(worker.to_string())
            .or_default()
            .push(task.id);
        self.task_worker_map.insert(task.id, worker.to_string());
        if let Some(node) = self.worker_nodes.iter_mut().find(|n| n.name == worker) {
            node.memory_allocated += task.memory;
            node.disk_allocated += task.disk;
            node.task_count += 1;
        }
    }

    fn rollback_placement(&mut self, worker: &str, task: &Task) {
        if let Some(ids) = self.worker_task_map.get_mut(worker) {
            ids.retain(|id| id != &task.id);
        }
        self.task_worker_map.remove(&task.id);
        if let Some(node) = self.worker_nodes.iter_mut().find(|n| n.name == worker) {
            node.memory_allocated = node.memory_allocated.saturating_sub(task.memory);
            node.disk_allocated = node.disk_allocated.saturating_sub(task.disk);
            node.task_count = node.task_count.saturating_sub(1);
        }
    }

    async fn stop_task(&mut self, worker: &str, event: &TaskEvent) {
        let url = format!("http://{}/tasks/{}", worker, event.task.id);
        match self.client.delete(&url).timeout(POST_TIMEOUT).send().await {
            Err(e) => {
                warn!(worker = %worker, error = %e, "stop failed in transport, requeueing");
                self.pending.push_back(event.clone());
            }
            Ok(resp) if resp.status() != StatusCode::NO_CONTENT => {
                error!(worker = %worker, status = %resp.status(), "unexpected status stopping task");
            }
            Ok(_) => {
                info!(task_id = %event.task.id, worker = %worker, "task scheduled to stop");
            }
        }
    }

    /// One reconcile-loop iteration: merge every worker's observed task
    /// state into the task db and refresh its node's stats snapshot.
    /// Unreachable workers are skipped; their tasks are never evicted.
    pub async fn update_tasks(&mut self) {
        for worker in self.workers.clone() {
            debug!(worker = %worker, "checking worker for task updates");
            let url = format!("http://{worker}/tasks");
            let resp = match self.client.get(&url).timeout(GET_TIMEOUT).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(worker = %worker, error = %e, "worker unreachable, skipping");
                    continue;
                }
            };
            if !resp.status().is_success() {
                warn!(worker = %worker, status = %resp.status(), "unexpected status listing tasks");
                continue;
            }
            let observed: Vec<Task> = match resp.json().await {
                Ok(tasks) => tasks,
                Err(e) => {
                    error!(worker = %worker, error = %e, "failed to decode task list");
                    continue;
                }
            };

            for task in observed {
                self.merge_observed_task(task);
            }
            self.update_node_stats(&worker).await;
        }
    }

    /// Last-writer-wins on the fields the worker owns; everything else is
    /// preserved from the local record.
    fn merge_observed_task(&mut self, observed: Task) {
        let key = observed.id.to_string();
        let merged = match self.task_db.get(&key) {
            Ok(mut local) => {
                local.state = observed.state;
                local.start_time = observed.start_time;
                local.finish_time = observed.finish_time;
                local.container_id = observed.container_id;
                local.host_ports = observed.host_ports;
                local
            }
            // First observation of this task.
            Err(StoreError::NotFound(_)) => observed,
            Err(e) => {
                error!(task_id = %observed.id, error = %e, "failed to load task for merge");
                return;
            }
        };
        if let Err(e) = self.task_db.put(&key, &merged) {
            error!(task_id = %merged.id, error = %e, "failed to persist merged task");
        }
    }

    async fn update_node_stats(&mut self, worker: &str) {
        let url = format!("http://{worker}/stats");
        let resp = match self.client.get(&url).timeout(GET_TIMEOUT).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(worker = %worker, error = %e, "stats fetch failed, skipping");
                return;
            }
        };
        let stats: Stats = match resp.json().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(worker = %worker, error = %e, "failed to decode stats");
                return;
            }
        };
        if let Some(node) = self.worker_nodes.iter_mut().find(|n| n.name == worker) {
            if node.memory == 0 {
                node.memory = stats.mem_total;
            }
            if node.disk == 0 {
                node.disk = stats.disk_total;
            }
            node.cores = stats.cpu_cores;
            node.task_count = stats.task_count;
            node.stats = Some(stats);
        }
    }

    /// One health-check-loop iteration: probe every Running task's health
    /// endpoint and restart unhealthy or Failed tasks that still have
    /// restarts left.
    pub async fn do_health_checks(&mut self) {
        for task in self.get_tasks() {
            if task.state == State::Running && task.restart_count < MAX_RESTARTS {
                if let Err(e) = self.check_task_health(&task).await {
                    warn!(task_id = %task.id, error = %e, "health check failed");
                    self.restart_task(task).await;
                }
            } else if task.state == State::Failed && task.restart_count < MAX_RESTARTS {
                self.restart_task(task).await;
            }
        }
    }

    async fn check_task_health(&self, task: &Task) -> Result<(), ManagerError> {
        if task.health_check.is_empty() {
            debug!(task_id = %task.id, "no health check configured");
            return Ok(());
        }
        let Some(worker) = self.task_worker_map.get(&task.id) else {
            return Err(ManagerError::HealthCheck(format!(
                "no worker mapping for task {}",
                task.id
            )));
        };
        let Some(port) = task.exposed_ports.first().map(|p| p.host_port) else {
            return Err(ManagerError::HealthCheck(format!(
                "task {} exposes no ports",
                task.id
            )));
        };
        let host = worker.split(':').next().unwrap_or(worker.as_str());
        let url = format!("http://{host}:{port}{}", task.health_check);
        debug!(task_id = %task.id, %url, "calling health check");

        let resp = self
            .client
            .get(&url)
            .timeout(GET_TIMEOUT)
            .send()
            .await
            .map_err(|e| ManagerError::HealthCheck(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ManagerError::HealthCheck(format!(
                "health check returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Reschedule a task onto the worker that already owns it, bumping its
    /// restart count. Bypasses the pending queue and the scheduler to keep
    /// the placement local; only a transport failure falls back to Pending.
    async fn restart_task(&mut self, mut task: Task) {
        let Some(worker) = self.task_worker_map.get(&task.id).cloned() else {
            warn!(task_id = %task.id, "no worker mapping, cannot restart");
            return;
        };

        task.state = State::Scheduled;
        task.restart_count += 1;
        if let Err(e) = self.task_db.put(&task.id.to_string(), &task) {
            error!(task_id = %task.id, error = %e, "failed to persist restarting task");
        }

        let event = TaskEvent::new(State::Running, task.clone());
        let url = format!("http://{worker}/tasks");
        match self
            .client
            .post(&url)
            .json(&event)
            .timeout(POST_TIMEOUT)
            .send()
            .await
        {
            Err(e) => {
                warn!(worker = %worker, error = %e, "restart failed in transport, queueing for dispatch");
                self.pending.push_back(event);
            }
            Ok(resp) if resp.status() != StatusCode::CREATED => {
                let status = resp.status();
                let message = match resp.json::<ErrResponse>().await {
                    Ok(err) => err.message,
                    Err(e) => format!("undecodable error body: {e}"),
                };
                error!(worker = %worker, %status, %message, "worker rejected restart");
            }
            Ok(_) => {
                info!(
                    task_id = %task.id,
                    restart_count = task.restart_count,
                    worker = %worker,
                    "restart dispatched"
                );
            }
        }
    }
}

/// Drains the pending queue one event per tick.
pub async fn run_dispatch_loop(manager: Arc<Mutex<Manager>>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(DISPATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                debug!("processing pending events");
                manager.lock().await.send_work().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("dispatch loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Merges worker-observed state every tick.
pub async fn run_reconcile_loop(manager: Arc<Mutex<Manager>>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                debug!("reconciling task state from workers");
                manager.lock().await.update_tasks().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("reconcile loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Probes task health every tick.
pub async fn run_health_check_loop(
    manager: Arc<Mutex<Manager>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                debug!("performing task health checks");
                manager.lock().await.do_health_checks().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("health check loop shutting down");
                    break;
                }
            }
        }
    }
}
