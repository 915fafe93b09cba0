use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tracing::info;
use uuid::Uuid;

use super::types::{ErrResponse, Worker};
use crate::stats::Stats;
use crate::task::{State as TaskState, Task, TaskEvent};

/// HTTP surface of one worker.
pub struct WorkerServer {
    worker: Arc<Mutex<Worker>>,
    host: String,
    port: u16,
}

impl WorkerServer {
    pub fn new(worker: Arc<Mutex<Worker>>, host: &str, port: u16) -> Self {
        WorkerServer {
            worker,
            host: host.to_string(),
            port,
        }
    }

    pub fn router(worker: Arc<Mutex<Worker>>) -> Router {
        Router::new()
            .route("/tasks", get(get_tasks).post(start_task))
            .route("/tasks/{task_id}", delete(stop_task))
            .route("/stats", get(get_stats))
            .with_state(worker)
    }

    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "worker api listening");
        axum::serve(listener, Self::router(self.worker))
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
    }
}

async fn get_tasks(State(worker): State<Arc<Mutex<Worker>>>) -> Json<Vec<Task>> {
    Json(worker.lock().await.get_tasks())
}

async fn start_task(
    State(worker): State<Arc<Mutex<Worker>>>,
    payload: Result<Json<TaskEvent>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(event)) => {
            let task = event.task.clone();
            worker.lock().await.add_task(event.task);
            info!(task_id = %task.id, "task queued");
            (StatusCode::CREATED, Json(task)).into_response()
        }
        Err(rejection) => (
            StatusCode::BAD_REQUEST,
            Json(ErrResponse {
                http_status_code: StatusCode::BAD_REQUEST.as_u16(),
                message: rejection.body_text(),
            }),
        )
            .into_response(),
    }
}

async fn stop_task(
    State(worker): State<Arc<Mutex<Worker>>>,
    Path(task_id): Path<Uuid>,
) -> Response {
    let mut w = worker.lock().await;
    match w.find_task(&task_id) {
        Some(mut task) => {
            task.state = TaskState::Completed;
            w.add_task(task);
            info!(%task_id, "task queued to stop");
            StatusCode::NO_CONTENT.into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrResponse {
                http_status_code: StatusCode::NOT_FOUND.as_u16(),
                message: format!("task {task_id} not found"),
            }),
        )
            .into_response(),
    }
}

async fn get_stats(State(worker): State<Arc<Mutex<Worker>>>) -> Json<Stats> {
    Json(worker.lock().await.stats())
}
