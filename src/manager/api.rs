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

use super::types::Manager;
use crate::node::Node;
use crate::task::{State as TaskState, Task, TaskEvent};
use crate::worker::ErrResponse;

/// HTTP surface of the manager.
pub struct ManagerServer {
    manager: Arc<Mutex<Manager>>,
    host: String,
    port: u16,
}

impl ManagerServer {
    pub fn new(manager: Arc<Mutex<Manager>>, host: &str, port: u16) -> Self {
        ManagerServer {
            manager,
            host: host.to_string(),
            port,
        }
    }

    pub fn router(manager: Arc<Mutex<Manager>>) -> Router {
        Router::new()
            .route("/tasks", get(get_tasks).post(start_task))
            .route("/tasks/{task_id}", delete(stop_task))
            .route("/nodes", get(get_nodes))
            .with_state(manager)
    }

    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "manager api listening");
        axum::serve(listener, Self::router(self.manager))
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
    }
}

async fn get_tasks(State(manager): State<Arc<Mutex<Manager>>>) -> Json<Vec<Task>> {
    Json(manager.lock().await.get_tasks())
}

async fn start_task(
    State(manager): State<Arc<Mutex<Manager>>>,
    payload: Result<Json<TaskEvent>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(event)) => {
            let task = event.task.clone();
            manager.lock().await.add_event(event);
            info!(task_id = %task.id, "event accepted");
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
    State(manager): State<Arc<Mutex<Manager>>>,
    Path(task_id): Path<Uuid>,
) -> Response {
    let mut m = manager.lock().await;
    match m.find_task(&task_id) {
        Some(task) => {
            m.add_event(TaskEvent::new(TaskState::Completed, task));
            info!(%task_id, "stop event accepted");
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

async fn get_nodes(State(manager): State<Arc<Mutex<Manager>>>) -> Json<Vec<Node>> {
    Json(manager.lock().await.get_nodes())
}
