//! Model-backed features: natural-language query translation and image
//! tagging, both over an OpenAI-compatible chat completion API.

pub mod client;
pub mod error;
pub mod image_tagger;
pub mod query_translator;
pub mod types;

use std::time::Duration;

pub use client::{ChatBackend, ModelClient, complete_with_fallback};
pub use error::AiError;
pub use image_tagger::ImageTagger;
pub use query_translator::{QueryCondition, QueryTranslator};
pub use types::{ChatMessage, ContentPart, ImageUrl, MessageContent};

/// Connection settings for the model API.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub fallback_models: Vec<String>,
    pub timeout: Duration,
    pub proxy_url: Option<String>,
}
