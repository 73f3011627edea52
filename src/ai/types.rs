use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

// --- Chat message types for OpenAI-compatible APIs ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(content: MessageContent) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }
}

/// Message content is either a bare string or a list of typed parts.
///
/// Both forms are written as a part array on the wire. Either form is
/// accepted when reading.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// All text carried by this content, parts joined in order.
    pub fn joined_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl Serialize for MessageContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MessageContent::Text(text) => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&ContentPart::Text { text: text.clone() })?;
                seq.end()
            }
            MessageContent::Parts(parts) => serializer.collect_seq(
                parts
                    .iter()
                    .filter(|part| !matches!(part, ContentPart::Unsupported)),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
    /// Part types this client does not understand; dropped when re-sent.
    #[serde(other, rename = "unsupported")]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub content: Option<MessageContent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_serializes_as_part_array() {
        let msg = ChatMessage::system("be brief");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"role": "system", "content": [{"type": "text", "text": "be brief"}]})
        );
    }

    #[test]
    fn test_parts_serialize_in_order() {
        let content = MessageContent::Parts(vec![
            ContentPart::ImageUrl { image_url: ImageUrl { url: "data:image/png;base64,AA==".into() } },
            ContentPart::Text { text: "describe".into() },
        ]);
        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            json!([
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AA=="}},
                {"type": "text", "text": "describe"}
            ])
        );
    }

    #[test]
    fn test_deserializes_string_or_array() {
        let from_string: MessageContent = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(from_string.joined_text(), "hello");

        let from_array: MessageContent = serde_json::from_value(json!([
            {"type": "text", "text": "hel"},
            {"type": "reasoning", "summary": "ignored"},
            {"type": "text", "text": "lo"}
        ]))
        .unwrap();
        assert_eq!(from_array.joined_text(), "hello");
    }

    #[test]
    fn test_response_with_null_content() {
        let response: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"role": "assistant", "content": null}}]}))
                .unwrap();
        assert!(response.choices[0].message.content.is_none());
    }
}
