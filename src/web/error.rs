use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::ai::AiError;
use crate::db::services::{ImageServiceError, TagServiceError};
use crate::services::analysis_service::AnalysisError;
use crate::tasks::QueueError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("User already exists: {0}")]
    UserAlreadyExists(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Password hashing failed: {0}")]
    PasswordHashingError(String),
    #[error("JWT creation failed: {0}")]
    TokenCreationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("{message}: {details}")]
    Upstream { message: String, details: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::UserAlreadyExists(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::UserNotFound => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string(), None)
            }
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string(), None)
            }
            AppError::PasswordHashingError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Password hashing error: {msg}"),
                None,
            ),
            AppError::TokenCreationError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Token creation error: {msg}"),
                None,
            ),
            AppError::DatabaseError(msg) => {
                error!(error = %msg, "Database error while handling request.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Database error: {msg}"),
                    None,
                )
            }
            AppError::InternalServerError(msg) => {
                error!(error = %msg, "Internal error while handling request.");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::Upstream { message, details } => {
                error!(%message, %details, "Model request failed.");
                (StatusCode::INTERNAL_SERVER_ERROR, message, Some(details))
            }
        };
        let body = match details {
            Some(details) => serde_json::json!({ "error": error_message, "details": details }),
            None => serde_json::json!({ "error": error_message }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<ImageServiceError> for AppError {
    fn from(err: ImageServiceError) -> Self {
        match err {
            ImageServiceError::DbErr(e) => e.into(),
            ImageServiceError::NotFound(id) => AppError::NotFound(format!("Image {id} not found")),
        }
    }
}

impl From<TagServiceError> for AppError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::DbErr(e) => e.into(),
            TagServiceError::EmptyName => {
                AppError::InvalidInput("Tag name must not be empty.".to_string())
            }
        }
    }
}

impl From<AiError> for AppError {
    fn from(err: AiError) -> Self {
        let message = match &err {
            AiError::NotConfigured => "AI service is not configured",
            AiError::MalformedCondition { .. } => "Could not understand the model's answer",
            AiError::NoTags => "The model did not suggest any tags",
            AiError::ImageTooLarge { .. } | AiError::ReadImage { .. } => {
                "Image could not be sent to the model"
            }
            _ => "AI request failed",
        };
        AppError::Upstream {
            message: message.to_string(),
            details: err.to_string(),
        }
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Ai(e) => e.into(),
            AnalysisError::Tags(e) => e.into(),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (status, body) = body_json(AppError::InvalidInput("bad".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad");

        let (status, _) = body_json(ImageServiceError::NotFound(7).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = body_json(TagServiceError::EmptyName.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = body_json(AppError::UserAlreadyExists("dup".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = body_json(QueueError::Full.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_upstream_errors_carry_details() {
        let err = AiError::Timeout { model: "qwen-vl".into(), timeout_secs: 60 };
        let (status, body) = body_json(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "AI request failed");
        assert!(body["details"].as_str().unwrap().contains("qwen-vl"));
    }
}
