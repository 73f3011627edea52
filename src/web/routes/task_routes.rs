use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::get,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::tasks::TaggingTask;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};

async fn list_tasks_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let tasks: Vec<TaggingTask> = app_state
        .tagging_queue
        .as_ref()
        .map(|queue| queue.list_for_user(authenticated_user.id))
        .unwrap_or_default();
    Json(serde_json::json!({ "tasks": tasks }))
}

async fn get_task_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaggingTask>, AppError> {
    app_state
        .tagging_queue
        .as_ref()
        .and_then(|queue| queue.get(task_id, authenticated_user.id))
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Task {task_id} not found")))
}

pub fn create_tasks_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks_handler))
        .route("/tasks/{task_id}", get(get_task_handler))
}
