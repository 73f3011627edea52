use axum::{Extension, Json, Router, extract::State, routing::get};
use std::sync::Arc;

use crate::db::services::tag_service;
use crate::web::models::AuthenticatedUser;
use crate::web::models::image_models::{TagListResponse, TagResponse};
use crate::web::{AppError, AppState};

/// Tags in use on the caller's images, ordered by name.
async fn list_tags_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<TagListResponse>, AppError> {
    let tags = tag_service::list_used_tags(&app_state.db_pool, authenticated_user.id).await?;
    Ok(Json(TagListResponse {
        tags: tags.into_iter().map(TagResponse::from).collect(),
    }))
}

pub fn create_tags_router() -> Router<Arc<AppState>> {
    Router::new().route("/tags", get(list_tags_handler))
}
