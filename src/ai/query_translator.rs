use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::client::{ChatBackend, complete_with_fallback};
use super::error::AiError;
use super::types::{ChatMessage, MessageContent};
use crate::db::services::ImageFilter;

const QUERY_SYSTEM_PROMPT: &str = "You are a helpful assistant. You are Qwen developed by Alibaba.";

/// Structured search produced from a natural-language request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryCondition {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub month: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub camera: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

impl From<&QueryCondition> for ImageFilter {
    fn from(condition: &QueryCondition) -> Self {
        ImageFilter {
            tags: condition.tags.clone(),
            month: condition.month.clone(),
            camera: condition.camera.clone(),
            keywords: condition.keywords.clone(),
        }
    }
}

/// Builds the instruction sent to the model for one search request.
pub fn build_query_prompt(user_query: &str, vocabulary: &[String]) -> String {
    let tag_section = if vocabulary.is_empty() {
        "The user has no tags yet, so \"tags\" must be an empty array.".to_string()
    } else {
        let listed = serde_json::to_string(vocabulary).unwrap_or_default();
        format!("Tags that exist in the user's library (choose only from these): {listed}")
    };

    format!(
        r#"Convert the user's photo search request into a JSON search condition.

User request: "{user_query}"

{tag_section}

Rules:
1. "tags": pick only tags from the list above, copied exactly as written. Never invent tags. Use [] when none fit.
2. "month": if the request mentions a time, give it as "YYYY-MM"; otherwise "".
3. "camera": if the request mentions a camera brand (for example Canon, Nikon, Sony, Apple), give the brand; otherwise "".
4. "keywords": other descriptive words from the request that may match tag names; [] when there are none.
5. "reasoning": one short sentence explaining how you read the request.

Reply with JSON only, without markdown, in exactly this shape:
{{"tags": [], "month": "", "camera": "", "keywords": [], "reasoning": ""}}"#
    )
}

/// Strips markdown fences (with or without a language tag) around a JSON
/// object and cuts away surrounding prose.
pub fn extract_json_block(content: &str) -> String {
    let trimmed = content.trim();
    let mut body = trimmed;

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let inner = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
        body = strip_language_tag(inner);
    }

    let cleaned = body.replace("```", "");
    let cleaned = cleaned.trim();
    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(open), Some(close)) if open < close => cleaned[open..=close].to_string(),
        _ => cleaned.to_string(),
    }
}

fn strip_language_tag(inner: &str) -> &str {
    let first_line_end = inner.find('\n').unwrap_or(inner.len());
    let first_line = inner[..first_line_end].trim();
    let is_tag = !first_line.is_empty()
        && first_line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if is_tag {
        &inner[first_line_end..]
    } else if let Some(rest) = inner.trim_start().strip_prefix("json") {
        rest
    } else {
        inner
    }
}

/// Parses model output into a condition. Unparsable output is a hard error.
pub fn parse_condition(content: &str) -> Result<QueryCondition, AiError> {
    let json = extract_json_block(content);
    serde_json::from_str(&json).map_err(|e| AiError::MalformedCondition {
        reason: e.to_string(),
        content: content.to_string(),
    })
}

/// Restricts `condition.tags` to names present verbatim in `vocabulary`.
///
/// With an empty vocabulary no tag can be valid, so the list is cleared.
pub fn validate_tags(condition: &mut QueryCondition, vocabulary: &[String]) {
    if vocabulary.is_empty() {
        if !condition.tags.is_empty() {
            warn!(tags = ?condition.tags, "Discarding tags: the user has no tag vocabulary.");
        }
        condition.tags.clear();
        return;
    }

    let mut valid: Vec<String> = Vec::new();
    let mut invalid: Vec<String> = Vec::new();
    for tag in condition.tags.drain(..) {
        if vocabulary.contains(&tag) {
            if !valid.contains(&tag) {
                valid.push(tag);
            }
        } else {
            invalid.push(tag);
        }
    }
    if !invalid.is_empty() {
        warn!(invalid = ?invalid, "Model proposed tags outside the user's vocabulary.");
    }
    condition.tags = valid;
}

/// Turns free-text search requests into [`QueryCondition`]s.
pub struct QueryTranslator {
    backend: Arc<dyn ChatBackend>,
    model: String,
    fallback_models: Vec<String>,
}

impl QueryTranslator {
    pub fn new(backend: Arc<dyn ChatBackend>, model: String, fallback_models: Vec<String>) -> Self {
        Self {
            backend,
            model,
            fallback_models,
        }
    }

    pub async fn translate(
        &self,
        user_query: &str,
        vocabulary: &[String],
    ) -> Result<QueryCondition, AiError> {
        let messages = vec![
            ChatMessage::system(QUERY_SYSTEM_PROMPT),
            ChatMessage::user(MessageContent::Text(build_query_prompt(user_query, vocabulary))),
        ];

        let (content, model) = complete_with_fallback(
            self.backend.as_ref(),
            &self.model,
            &self.fallback_models,
            &messages,
        )
        .await?;
        debug!(%model, content = %content, "Query translation response.");

        let mut condition = parse_condition(&content)?;
        validate_tags(&mut condition, vocabulary);
        info!(
            %model,
            tags = ?condition.tags,
            month = ?condition.month,
            camera = ?condition.camera,
            keywords = ?condition.keywords,
            "Translated search request."
        );
        Ok(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::testing::{ScriptedBackend, network_error};
    use crate::ai::error::api_error;

    fn vocab(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_prompt_mentions_vocabulary_or_its_absence() {
        let with = build_query_prompt("sunset photos", &vocab(&["sunset", "beach"]));
        assert!(with.contains("sunset photos"));
        assert!(with.contains(r#"["sunset","beach"]"#));

        let without = build_query_prompt("sunset photos", &[]);
        assert!(without.contains("no tags yet"));
    }

    #[test]
    fn test_fenced_and_plain_json_extract_identically() {
        let plain = r#"{"tags": ["a"], "month": "2025-10"}"#;
        let fenced = format!("```json\n{plain}\n```");
        let bare_fence = format!("```\n{plain}\n```");
        let inline_tag = format!("```json{plain}```");
        let chatty = format!("Sure! Here it is:\n```JSON\n{plain}\n```\nLet me know.");

        assert_eq!(extract_json_block(plain), plain);
        assert_eq!(extract_json_block(&fenced), plain);
        assert_eq!(extract_json_block(&bare_fence), plain);
        assert_eq!(extract_json_block(&inline_tag), plain);
        assert_eq!(extract_json_block(&chatty), plain);
    }

    #[test]
    fn test_parse_condition_normalizes_blank_fields() {
        let condition = parse_condition(
            r#"{"tags": null, "month": "", "camera": " Canon ", "keywords": ["sea"], "reasoning": "x"}"#,
        )
        .unwrap();
        assert!(condition.tags.is_empty());
        assert_eq!(condition.month, None);
        assert_eq!(condition.camera.as_deref(), Some("Canon"));
        assert_eq!(condition.keywords, vec!["sea"]);
    }

    #[test]
    fn test_parse_failure_is_hard_error() {
        let err = parse_condition("I could not understand that.").unwrap_err();
        assert!(matches!(err, AiError::MalformedCondition { .. }));
    }

    #[test]
    fn test_validate_tags_is_intersection() {
        let mut condition = QueryCondition {
            tags: vocab(&["beach", "unicorn", "sunset", "beach"]),
            ..Default::default()
        };
        validate_tags(&mut condition, &vocab(&["sunset", "beach", "city"]));
        assert_eq!(condition.tags, vocab(&["beach", "sunset"]));

        let mut condition = QueryCondition { tags: vocab(&["beach"]), ..Default::default() };
        validate_tags(&mut condition, &[]);
        assert!(condition.tags.is_empty());
    }

    #[tokio::test]
    async fn test_translate_end_to_end() {
        let reply = "```json\n{\"tags\": [\"beach\", \"ghost\"], \"month\": \"2025-07\", \"camera\": \"\", \"keywords\": [\"waves\"], \"reasoning\": \"Beach photos from July.\"}\n```";
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(reply.into())]));
        let translator = QueryTranslator::new(backend.clone(), "primary".into(), vocab(&["fb"]));

        let condition = translator
            .translate("beach in july", &vocab(&["beach", "city"]))
            .await
            .unwrap();
        assert_eq!(condition.tags, vocab(&["beach"]));
        assert_eq!(condition.month.as_deref(), Some("2025-07"));
        assert_eq!(condition.camera, None);
        assert_eq!(condition.reasoning, "Beach photos from July.");

        let sent = backend.last_messages.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].content.joined_text().contains("beach in july"));
    }

    #[tokio::test]
    async fn test_translate_retries_on_network_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(network_error("primary")),
            Ok(r#"{"tags": [], "reasoning": "ok"}"#.into()),
        ]));
        let translator = QueryTranslator::new(
            backend.clone(),
            "primary".into(),
            vocab(&["primary", "fallback"]),
        );
        let condition = translator.translate("anything", &[]).await.unwrap();
        assert_eq!(condition.reasoning, "ok");
        assert_eq!(backend.calls(), vec!["primary", "fallback"]);
    }

    #[tokio::test]
    async fn test_translate_does_not_retry_auth_failure() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(api_error(403, "", "primary"))]));
        let translator =
            QueryTranslator::new(backend.clone(), "primary".into(), vocab(&["fallback"]));
        assert!(translator.translate("anything", &[]).await.is_err());
        assert_eq!(backend.calls(), vec!["primary"]);
    }
}
