use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use std::sync::Arc;

use crate::services::auth_service;
use crate::web::middleware::auth::TOKEN_COOKIE;
use crate::web::models::{LoginRequest, RegisterRequest, UserResponse};
use crate::web::{AppError, AppState};

async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user_response =
        auth_service::register_user(&app_state.db_pool, payload, app_state.config.bcrypt_cost)
            .await?;
    Ok((StatusCode::CREATED, Json(user_response)))
}

async fn login_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let login_response =
        auth_service::login_user(&app_state.db_pool, payload, &app_state.auth_keys).await?;

    let auth_cookie = Cookie::build((TOKEN_COOKIE, login_response.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(true)
        .build();
    let cookie_header = HeaderValue::from_str(&auth_cookie.to_string())
        .map_err(|e| AppError::InternalServerError(format!("Invalid cookie header: {e}")))?;

    let mut response = Json(login_response).into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie_header);
    Ok(response)
}

pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/register", post(register_handler))
        .route("/users/login", post(login_handler))
}

pub fn create_protected_router() -> Router<Arc<AppState>> {
    Router::new().route("/users/me", get(auth_service::me))
}
