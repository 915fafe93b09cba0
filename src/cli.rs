//! Command-line surface: thin HTTP client subcommands against the manager,
//! plus `up` to boot a worker and a manager in this process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tabled::{Table, Tabled};
use tokio::sync::{watch, Mutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::manager::{self, Manager, ManagerServer};
use crate::node::Node;
use crate::runtime::{AnyRuntime, DockerRuntime};
use crate::scheduler::AnyScheduler;
use crate::task::{State, Task, TaskEvent};
use crate::worker::{self, Worker, WorkerServer};

#[derive(Debug, Parser)]
#[command(name = "stevedore", version, about = "A small container orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a task to the manager.
    Run {
        #[arg(short, long, default_value = "localhost:5555")]
        manager: String,
        /// Path to a JSON task spec.
        #[arg(short, long)]
        filename: PathBuf,
    },
    /// List tasks known to the manager.
    Status {
        #[arg(short, long, default_value = "localhost:5555")]
        manager: String,
    },
    /// Stop a running task.
    Stop {
        #[arg(short, long, default_value = "localhost:5555")]
        manager: String,
        task_id: Uuid,
    },
    /// List worker nodes.
    Node {
        #[arg(short, long, default_value = "localhost:5555")]
        manager: String,
    },
    /// Start a worker and a manager in this process.
    Up,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Run { manager, filename } => run_task(&manager, &filename).await,
            Command::Status { manager } => status(&manager).await,
            Command::Stop { manager, task_id } => stop(&manager, task_id).await,
            Command::Node { manager } => nodes(&manager).await,
            Command::Up => up().await,
        }
    }
}

async fn run_task(manager: &str, filename: &PathBuf) -> Result<()> {
    let spec = std::fs::read_to_string(filename)
        .with_context(|| format!("reading {}", filename.display()))?;
    let task: Task = serde_json::from_str(&spec).context("invalid task spec")?;
    let event = TaskEvent::new(State::Running, task);

    let url = format!("http://{manager}/tasks");
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&event)
        .send()
        .await
        .with_context(|| format!("connecting to {url}"))?;
    ensure!(
        resp.status().is_success(),
        "manager returned {}",
        resp.status()
    );

    let accepted: Task = resp.json().await.context("decoding manager response")?;
    println!("submitted task {} ({})", accepted.id, accepted.name);
    Ok(())
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "CREATED")]
    created: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "IMAGE")]
    image: String,
}

async fn status(manager: &str) -> Result<()> {
    let url = format!("http://{manager}/tasks");
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    ensure!(
        resp.status().is_success(),
        "manager returned {}",
        resp.status()
    );
    let tasks: Vec<Task> = resp.json().await.context("decoding task list")?;

    let rows: Vec<TaskRow> = tasks
        .iter()
        .map(|t| TaskRow {
            id: t.id.to_string(),
            name: t.name.clone(),
            created: match t.start_time {
                Some(start) => format!("{}s ago", (Utc::now() - start).num_seconds()),
                None => "-".to_string(),
            },
            state: t.state.to_string(),
            image: t.image.clone(),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

async fn stop(manager: &str, task_id: Uuid) -> Result<()> {
    let url = format!("http://{manager}/tasks/{task_id}");
    let resp = reqwest::Client::new()
        .delete(&url)
        .send()
        .await
        .with_context(|| format!("connecting to {url}"))?;
    ensure!(
        resp.status().is_success(),
        "manager returned {}",
        resp.status()
    );
    println!("task {task_id} has been stopped");
    Ok(())
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ROLE")]
    role: String,
    #[tabled(rename = "MEMORY (MiB)")]
    memory: u64,
    #[tabled(rename = "DISK (GiB)")]
    disk: u64,
    #[tabled(rename = "TASKS")]
    tasks: u64,
}

async fn nodes(manager: &str) -> Result<()> {
    let url = format!("http://{manager}/nodes");
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    ensure!(
        resp.status().is_success(),
        "manager returned {}",
        resp.status()
    );
    let nodes: Vec<Node> = resp.json().await.context("decoding node list")?;

    let rows: Vec<NodeRow> = nodes
        .iter()
        .map(|n| NodeRow {
            name: n.name.clone(),
            role: n.role.clone(),
            memory: n.memory / 1024 / 1024,
            disk: n.disk / 1024 / 1024 / 1024,
            tasks: n.task_count,
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

async fn up() -> Result<()> {
    let config = Config::from_env()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!("starting stevedore worker");
    let worker_name = format!("{}:{}", config.worker_host, config.worker_port);
    let runtime = AnyRuntime::Docker(DockerRuntime::connect()?);
    let worker = Arc::new(Mutex::new(Worker::new(
        &worker_name,
        config.db_kind,
        runtime,
    )?));

    tokio::spawn(worker::run_execute_loop(worker.clone(), shutdown_rx.clone()));
    tokio::spawn(worker::run_inspect_loop(worker.clone(), shutdown_rx.clone()));
    tokio::spawn(worker::run_stats_loop(worker.clone(), shutdown_rx.clone()));

    let worker_api = WorkerServer::new(worker.clone(), &config.worker_host, config.worker_port);
    let worker_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = worker_api.serve(worker_shutdown).await {
            error!(error = %e, "worker api failed");
        }
    });

    info!("starting stevedore manager");
    let scheduler = AnyScheduler::from_name(&config.scheduler);
    let manager = Arc::new(Mutex::new(Manager::new(
        config.workers.clone(),
        scheduler,
        config.db_kind,
    )?));

    tokio::spawn(manager::run_dispatch_loop(
        manager.clone(),
        shutdown_rx.clone(),
    ));
    tokio::spawn(manager::run_reconcile_loop(
        manager.clone(),
        shutdown_rx.clone(),
    ));
    tokio::spawn(manager::run_health_check_loop(
        manager.clone(),
        shutdown_rx.clone(),
    ));

    let manager_api = ManagerServer::new(manager.clone(), &config.manager_host, config.manager_port);
    let manager_handle = tokio::spawn(manager_api.serve(shutdown_rx));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = manager_handle.await;
    Ok(())
}
