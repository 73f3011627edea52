use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::warn;

use crate::web::models::AuthenticatedUser;
use crate::web::{AppState, error::AppError};

pub const TOKEN_COOKIE: &str = "token";

pub async fn auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    // Authorization header first, then the login cookie.
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .or_else(|| jar.get(TOKEN_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::Unauthorized("Missing authentication token".to_string()))?;

    let claims = state.auth_keys.verify(&token).map_err(|e| {
        warn!(error = ?e, "JWT decoding error during auth middleware.");
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;

    let authenticated_user = AuthenticatedUser {
        id: claims.user_id,
        username: claims.sub,
    };
    req.extensions_mut().insert(authenticated_user);
    Ok(next.run(req).await)
}
