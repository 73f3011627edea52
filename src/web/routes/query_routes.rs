use axum::{Extension, Json, Router, extract::State, routing::post};
use std::sync::Arc;
use tracing::info;

use crate::ai::AiError;
use crate::db::services::{ImageFilter, image_query_service, tag_service};
use crate::web::models::AuthenticatedUser;
use crate::web::models::image_models::{ImageResponse, McpQueryRequest, McpQueryResponse};
use crate::web::{AppError, AppState};

/// Natural-language search: the model turns the request into a structured
/// condition, which is then run against the caller's library.
async fn mcp_query_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<McpQueryRequest>,
) -> Result<Json<McpQueryResponse>, AppError> {
    let query = payload.query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput("Query must not be empty.".to_string()));
    }
    let translator = app_state
        .query_translator
        .as_ref()
        .ok_or(AiError::NotConfigured)?;

    let vocabulary = tag_service::used_tag_names(&app_state.db_pool, authenticated_user.id).await?;
    let condition = translator.translate(query, &vocabulary).await?;

    let filter = ImageFilter::from(&condition);
    let images =
        image_query_service::query_images(&app_state.db_pool, authenticated_user.id, &filter)
            .await?;
    let count = images.len();
    info!(user_id = authenticated_user.id, count, "Natural-language query answered.");

    let message = if condition.reasoning.trim().is_empty() {
        format!("Found {count} matching images.")
    } else {
        condition.reasoning.clone()
    };
    Ok(Json(McpQueryResponse {
        images: images.into_iter().map(ImageResponse::from).collect(),
        count,
        condition,
        message,
    }))
}

pub fn create_query_router() -> Router<Arc<AppState>> {
    Router::new().route("/mcp/query", post(mcp_query_handler))
}
