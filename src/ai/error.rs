use serde_json::Value;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI service is not configured (set AI_API_KEY)")]
    NotConfigured,
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
    #[error("Request to model '{model}' timed out after {timeout_secs}s")]
    Timeout { model: String, timeout_secs: u64 },
    #[error("Network error calling model '{model}': {message}")]
    Network { model: String, message: String },
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Model returned an empty response")]
    EmptyResponse,
    #[error("Unexpected response from model: {0}")]
    InvalidResponse(String),
    #[error("Failed to parse query condition: {reason}. Model output: {content}")]
    MalformedCondition { reason: String, content: String },
    #[error("Image is too large: {size} bytes (limit {limit} bytes)")]
    ImageTooLarge { size: usize, limit: usize },
    #[error("Failed to read image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Model returned no usable tags")]
    NoTags,
}

impl AiError {
    /// Transport-level failures that another model might not hit.
    pub fn is_transient(&self) -> bool {
        matches!(self, AiError::Timeout { .. } | AiError::Network { .. })
    }
}

const MAX_BODY_IN_MESSAGE: usize = 500;

/// Pulls a human-readable message out of an API error body.
fn error_body_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let candidates = [
            json.pointer("/error/message"),
            json.pointer("/errors/message"),
            json.pointer("/message"),
        ];
        if let Some(message) = candidates.into_iter().flatten().find_map(Value::as_str) {
            return message.to_string();
        }
    }
    let body = body.trim();
    if body.chars().count() > MAX_BODY_IN_MESSAGE {
        let cut: String = body.chars().take(MAX_BODY_IN_MESSAGE).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    }
}

/// Maps a non-success HTTP status from the model API to an error with guidance.
pub fn api_error(status: u16, body: &str, model: &str) -> AiError {
    let detail = error_body_message(body);
    let message = match status {
        401 => format!(
            "Authentication failed (401): {detail}. Check that the API access token is valid and not expired"
        ),
        403 => format!(
            "Access denied (403): {detail}. The account may lack permission or quota for model '{model}'"
        ),
        400 => format!("Bad request (400): {detail}. Check the request format and model parameters"),
        404 => format!(
            "Model not found (404): '{model}' does not exist or is not available. {detail}"
        ),
        _ => format!("Model API returned status {status}: {detail}"),
    };
    AiError::Api { status, message }
}
