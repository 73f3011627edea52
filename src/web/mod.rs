use axum::{
    Router,
    http::Method,
    middleware as axum_middleware,
    routing::get,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ai::{ImageTagger, QueryTranslator};
use crate::ingest::IngestPipeline;
use crate::media::MediaStore;
use crate::server::config::ServerConfig;
use crate::services::auth_service::AuthKeys;
use crate::tasks::TaggingQueue;
use crate::web::{middleware::auth, routes::*};

pub use error::AppError;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

pub const API_PREFIX: &str = "/api/v1";

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabaseConnection,
    pub config: Arc<ServerConfig>,
    pub auth_keys: Arc<AuthKeys>,
    pub media_store: MediaStore,
    pub ingest: IngestPipeline,
    /// Absent when no model API key is configured.
    pub query_translator: Option<Arc<QueryTranslator>>,
    pub image_tagger: Option<Arc<ImageTagger>>,
    pub tagging_queue: Option<TaggingQueue>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let max_upload_bytes = app_state.config.max_upload_mb.saturating_mul(1024 * 1024);

    let public = Router::new()
        .route("/health", get(health_check_handler))
        .merge(user_routes::create_public_router());

    let protected = Router::new()
        .merge(user_routes::create_protected_router())
        .merge(image_routes::create_images_router(max_upload_bytes))
        .merge(tag_routes::create_tags_router())
        .merge(query_routes::create_query_router())
        .merge(task_routes::create_tasks_router())
        .route_layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth::auth,
        ));

    Router::new()
        .nest(API_PREFIX, public.merge(protected))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state)
}
