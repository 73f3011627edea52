use axum::Extension;
use axum::extract::State;
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{DbConn, SqlErr};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::entities::user;
use crate::db::services::user_service;
use crate::web::AppState;
use crate::web::error::AppError;
use crate::web::models::{
    AuthenticatedUser, Claims, LoginRequest, LoginResponse, MeResponse, RegisterRequest,
    UserResponse,
};

pub const MIN_JWT_SECRET_BYTES: usize = 32;
/// One year.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;
const MIN_USERNAME_CHARS: usize = 4;
const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AuthKeyError {
    #[error("JWT secret must be at least {MIN_JWT_SECRET_BYTES} bytes, got {0}")]
    SecretTooShort(usize),
    #[error("Token lifetime must be within {MAX_TOKEN_TTL_HOURS} hours, got {0}")]
    TtlOutOfRange(i64),
}

/// Signing and verification keys, built once at startup and shared.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
}

impl AuthKeys {
    pub fn new(secret: &str, token_ttl_hours: i64) -> Result<Self, AuthKeyError> {
        if secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(AuthKeyError::SecretTooShort(secret.len()));
        }
        let token_ttl = Duration::try_hours(token_ttl_hours)
            .filter(|_| token_ttl_hours.abs() <= MAX_TOKEN_TTL_HOURS)
            .ok_or(AuthKeyError::TtlOutOfRange(token_ttl_hours))?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl,
        })
    }

    pub fn issue(&self, user: &user::Model) -> Result<String, AppError> {
        let expiration = (Utc::now() + self.token_ttl).timestamp() as usize;
        let claims = Claims {
            sub: user.username.clone(),
            user_id: user.id,
            exp: expiration,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::TokenCreationError(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn validate_registration(req: &RegisterRequest) -> Result<(), AppError> {
    if req.username.trim().chars().count() < MIN_USERNAME_CHARS {
        return Err(AppError::InvalidInput(format!(
            "Username must be at least {MIN_USERNAME_CHARS} characters."
        )));
    }
    if !looks_like_email(req.email.trim()) {
        return Err(AppError::InvalidInput("A valid email address is required.".to_string()));
    }
    if req.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters."
        )));
    }
    Ok(())
}

pub async fn register_user(
    db: &DbConn,
    req: RegisterRequest,
    bcrypt_cost: u32,
) -> Result<UserResponse, AppError> {
    validate_registration(&req)?;
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();

    if user_service::find_user_by_username_or_email(db, &username, &email)
        .await?
        .is_some()
    {
        return Err(AppError::UserAlreadyExists(
            "Username or email already exists.".to_string(),
        ));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash(password, bcrypt_cost))
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .map_err(|e| AppError::PasswordHashingError(e.to_string()))?;

    let user = user_service::create_user(db, username, email, password_hash)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                AppError::UserAlreadyExists("Username or email already exists.".to_string())
            }
            _ => AppError::from(e),
        })?;

    info!(user_id = user.id, username = %user.username, "Registered new user.");
    Ok(UserResponse {
        id: user.id,
        username: user.username,
    })
}

pub async fn login_user(
    db: &DbConn,
    req: LoginRequest,
    keys: &AuthKeys,
) -> Result<LoginResponse, AppError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::InvalidInput("Email and password are required.".to_string()));
    }

    let Some(user) = user_service::get_user_by_email(db, req.email.trim()).await? else {
        warn!(email = %req.email, "Login attempt for unknown email.");
        return Err(AppError::InvalidCredentials);
    };

    let password = req.password;
    let password_hash = user.password_hash.clone();
    let valid_password = tokio::task::spawn_blocking(move || verify(password, &password_hash))
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))?;

    if !valid_password {
        warn!(user_id = user.id, "Login attempt with wrong password.");
        return Err(AppError::InvalidCredentials);
    }

    let token = keys.issue(&user)?;
    Ok(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
    })
}

pub async fn me(
    State(app_state): State<Arc<AppState>>,
    Extension(authenticated_user): Extension<AuthenticatedUser>,
) -> Result<axum::Json<MeResponse>, AppError> {
    let user = user_service::get_user_by_id(&app_state.db_pool, authenticated_user.id)
        .await?
        .ok_or(AppError::UserNotFound)?;
    Ok(axum::Json(MeResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        created_at: user.created_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const TEST_COST: u32 = 4;

    fn register_request(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_short_secret_is_rejected() {
        assert!(matches!(
            AuthKeys::new("too-short", 24),
            Err(AuthKeyError::SecretTooShort(9))
        ));
        assert!(AuthKeys::new(SECRET, 24).is_ok());
    }

    #[test]
    fn test_oversized_token_lifetime_is_rejected() {
        assert!(AuthKeys::new(SECRET, MAX_TOKEN_TTL_HOURS).is_ok());
        assert!(matches!(
            AuthKeys::new(SECRET, MAX_TOKEN_TTL_HOURS + 1),
            Err(AuthKeyError::TtlOutOfRange(_))
        ));
        assert!(matches!(
            AuthKeys::new(SECRET, i64::MAX),
            Err(AuthKeyError::TtlOutOfRange(_))
        ));
    }

    #[test]
    fn test_token_round_trip_and_expiry() {
        let keys = AuthKeys::new(SECRET, 24).unwrap();
        let user = user::Model {
            id: 42,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let claims = keys.verify(&keys.issue(&user).unwrap()).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "alice");

        let expired = AuthKeys::new(SECRET, -2).unwrap();
        assert!(keys.verify(&expired.issue(&user).unwrap()).is_err());

        let other = AuthKeys::new("another-secret-that-is-long-enough!!", 24).unwrap();
        assert!(other.verify(&keys.issue(&user).unwrap()).is_err());
    }

    #[test]
    fn test_email_shape() {
        assert!(looks_like_email("a@b.co"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("a b@c.de"));
        assert!(!looks_like_email("a@@b.co"));
    }

    #[tokio::test]
    async fn test_register_validation_and_conflict() {
        let db = memory_db().await;
        assert!(matches!(
            register_user(&db, register_request("abc", "a@b.co", "secret1"), TEST_COST).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            register_user(&db, register_request("alice", "nope", "secret1"), TEST_COST).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            register_user(&db, register_request("alice", "a@b.co", "12345"), TEST_COST).await,
            Err(AppError::InvalidInput(_))
        ));

        register_user(&db, register_request("alice", "a@b.co", "secret1"), TEST_COST)
            .await
            .unwrap();
        assert!(matches!(
            register_user(&db, register_request("alice", "other@b.co", "secret1"), TEST_COST).await,
            Err(AppError::UserAlreadyExists(_))
        ));
        assert!(matches!(
            register_user(&db, register_request("alice2", "a@b.co", "secret1"), TEST_COST).await,
            Err(AppError::UserAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_login() {
        let db = memory_db().await;
        let keys = AuthKeys::new(SECRET, 24).unwrap();
        register_user(&db, register_request("alice", "a@b.co", "secret1"), TEST_COST)
            .await
            .unwrap();

        let ok = login_user(
            &db,
            LoginRequest { email: "a@b.co".into(), password: "secret1".into() },
            &keys,
        )
        .await
        .unwrap();
        assert_eq!(keys.verify(&ok.token).unwrap().user_id, ok.user_id);

        assert!(matches!(
            login_user(&db, LoginRequest { email: "a@b.co".into(), password: "wrong!".into() }, &keys).await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            login_user(&db, LoginRequest { email: "x@b.co".into(), password: "secret1".into() }, &keys).await,
            Err(AppError::InvalidCredentials)
        ));
    }
}
