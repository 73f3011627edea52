use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::AiSettings;
use super::error::{AiError, api_error};
use super::types::{ChatMessage, ChatRequest, ChatResponse};

/// A chat completion endpoint. Returns the assistant's text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, AiError>;
}

/// reqwest-backed client for an OpenAI-compatible `/chat/completions` API.
pub struct ModelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl ModelClient {
    pub fn new(settings: &AiSettings) -> Result<Self, AiError> {
        let mut builder = reqwest::Client::builder().timeout(settings.timeout);

        if let Some(proxy_url) = settings.proxy_url.as_deref().filter(|p| !p.trim().is_empty()) {
            match reqwest::Proxy::all(proxy_url) {
                Ok(proxy) => {
                    info!(proxy = %proxy_url, "Using proxy for model API requests.");
                    builder = builder.proxy(proxy);
                }
                Err(e) => warn!(proxy = %proxy_url, error = %e, "Ignoring invalid proxy URL."),
            }
        }

        let http = builder
            .build()
            .map_err(|e| AiError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            timeout: settings.timeout,
        })
    }

    fn transport_error(&self, model: &str, err: reqwest::Error) -> AiError {
        if err.is_timeout() {
            AiError::Timeout {
                model: model.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            AiError::Network {
                model: model.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl ChatBackend for ModelClient {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model,
            messages,
            stream: false,
        };

        debug!(%url, model, "Sending chat completion request.");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(model, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(model, e))?;

        if !status.is_success() {
            let err = api_error(status.as_u16(), &body, model);
            error!(model, status = status.as_u16(), error = %err, "Model API request failed.");
            return Err(err);
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            AiError::InvalidResponse(format!("{e}; body: {}", body.chars().take(500).collect::<String>()))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.joined_text())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(content)
    }
}

/// Calls `primary`, then on a transient failure each fallback model in order
/// (skipping `primary`). Returns the content and the model that produced it.
///
/// When every model fails the primary model's error is returned.
pub async fn complete_with_fallback(
    backend: &dyn ChatBackend,
    primary: &str,
    fallbacks: &[String],
    messages: &[ChatMessage],
) -> Result<(String, String), AiError> {
    let primary_err = match backend.complete(primary, messages).await {
        Ok(content) => return Ok((content, primary.to_string())),
        Err(e) if e.is_transient() => e,
        Err(e) => return Err(e),
    };

    warn!(model = primary, error = %primary_err, "Primary model failed with a transient error, trying fallbacks.");
    for model in fallbacks.iter().filter(|m| m.as_str() != primary) {
        match backend.complete(model, messages).await {
            Ok(content) => {
                info!(model = %model, "Fallback model succeeded.");
                return Ok((content, model.clone()));
            }
            Err(e) => warn!(model = %model, error = %e, "Fallback model failed."),
        }
    }

    error!(model = primary, "All models failed.");
    Err(primary_err)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn fallbacks() -> Vec<String> {
        vec!["primary".into(), "fb-1".into(), "fb-2".into()]
    }

    #[tokio::test]
    async fn test_primary_success_makes_one_call() {
        let backend = ScriptedBackend::new(vec![Ok("hi".into())]);
        let (content, model) = complete_with_fallback(&backend, "primary", &fallbacks(), &[])
            .await
            .unwrap();
        assert_eq!((content.as_str(), model.as_str()), ("hi", "primary"));
        assert_eq!(backend.calls(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_transient_error_walks_fallbacks_skipping_primary() {
        let backend = ScriptedBackend::new(vec![
            Err(AiError::Timeout { model: "primary".into(), timeout_secs: 60 }),
            Err(network_error("fb-1")),
            Ok("from fb-2".into()),
        ]);
        let (content, model) = complete_with_fallback(&backend, "primary", &fallbacks(), &[])
            .await
            .unwrap();
        assert_eq!(content, "from fb-2");
        assert_eq!(model, "fb-2");
        assert_eq!(backend.calls(), vec!["primary", "fb-1", "fb-2"]);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(api_error(401, "", "primary"))]);
        let err = complete_with_fallback(&backend, "primary", &fallbacks(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Api { status: 401, .. }));
        assert_eq!(backend.calls(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_all_failing_returns_primary_error() {
        let backend = ScriptedBackend::new(vec![
            Err(network_error("primary")),
            Err(network_error("fb-1")),
            Err(network_error("fb-2")),
        ]);
        let err = complete_with_fallback(&backend, "primary", &fallbacks(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Network { ref model, .. } if model == "primary"));
    }

    #[test]
    fn test_client_ignores_invalid_proxy() {
        let settings = AiSettings {
            api_key: "key".into(),
            base_url: "http://localhost:9/v1/".into(),
            model: "m".into(),
            fallback_models: vec![],
            timeout: Duration::from_secs(5),
            proxy_url: Some("::not a url::".into()),
        };
        let client = ModelClient::new(&settings).unwrap();
        assert_eq!(client.base_url, "http://localhost:9/v1");
    }
}
