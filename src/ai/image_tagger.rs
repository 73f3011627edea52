use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::client::ChatBackend;
use super::error::AiError;
use super::types::{ChatMessage, ContentPart, ImageUrl, MessageContent};

/// Upper bound for both the raw file and its base64 encoding.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;
pub const MAX_TAG_CHARS: usize = 50;

const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. You are Qwen developed by Alibaba. You should think step-by-step.";

const ANALYSIS_PROMPT: &str = "Look at this photo and suggest 5 to 10 short tags describing its \
subject, scene, objects, colors and mood. Reply with the tags only, separated by commas, \
for example: beach, sunset, ocean, people, warm colors";

const TAG_SEPARATORS: &[char] = &[',', '，', ';', '；', '\n'];
const TAG_PUNCTUATION: &[char] = &[
    '，', '。', '、', '；', '：', '！', '？', '.', ':', '!', '?', '"', '\'', '“', '”', '*', '-', '#',
];

/// MIME type from magic bytes, defaulting to JPEG.
pub fn detect_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => "image/jpeg",
    }
}

fn strip_enumeration(tag: &str) -> &str {
    let digits = tag.chars().take_while(|c| c.is_ascii_digit()).count();
    if (1..=2).contains(&digits) {
        if let Some(rest) = tag[digits..].strip_prefix(['.', '、', ')']) {
            return rest.trim_start();
        }
    }
    tag
}

/// Splits a free-text model reply into clean, unique tag names.
pub fn parse_tags(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for raw in content.split(TAG_SEPARATORS) {
        let mut tag = strip_enumeration(raw.trim()).trim();
        if let Some(idx) = tag.find(['(', '（']) {
            if idx > 0 {
                tag = &tag[..idx];
            }
        }
        let tag = tag.trim().trim_matches(TAG_PUNCTUATION).trim();
        if tag.is_empty() || tag.chars().count() > MAX_TAG_CHARS {
            continue;
        }
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Suggests tags for stored images using a vision model.
pub struct ImageTagger {
    backend: Arc<dyn ChatBackend>,
    model: String,
}

impl ImageTagger {
    pub fn new(backend: Arc<dyn ChatBackend>, model: String) -> Self {
        Self { backend, model }
    }

    pub fn build_messages(bytes: &[u8]) -> Result<Vec<ChatMessage>, AiError> {
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AiError::ImageTooLarge { size: bytes.len(), limit: MAX_IMAGE_BYTES });
        }
        let encoded = STANDARD.encode(bytes);
        if encoded.len() > MAX_IMAGE_BYTES {
            return Err(AiError::ImageTooLarge { size: encoded.len(), limit: MAX_IMAGE_BYTES });
        }
        let data_uri = format!("data:{};base64,{encoded}", detect_mime(bytes));

        Ok(vec![
            ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
            ChatMessage::user(MessageContent::Parts(vec![
                ContentPart::ImageUrl { image_url: ImageUrl { url: data_uri } },
                ContentPart::Text { text: ANALYSIS_PROMPT.to_string() },
            ])),
        ])
    }

    /// Reads the image at `path` and returns the model's suggested tags.
    pub async fn analyze(&self, path: &Path) -> Result<Vec<String>, AiError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| AiError::ReadImage {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), size = bytes.len(), "Analyzing image.");

        let messages = Self::build_messages(&bytes)?;
        let content = self.backend.complete(&self.model, &messages).await?;
        let tags = parse_tags(&content);
        if tags.is_empty() {
            warn!(path = %path.display(), content = %content, "Model reply contained no tags.");
            return Err(AiError::NoTags);
        }
        info!(path = %path.display(), tags = ?tags, "Image analysis produced tags.");
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::testing::ScriptedBackend;
    use tempfile::tempdir;

    #[test]
    fn test_parse_tags_handles_mixed_separators() {
        assert_eq!(
            parse_tags("海滩，日落; ocean；people, warm colors"),
            vec!["海滩", "日落", "ocean", "people", "warm colors"]
        );
    }

    #[test]
    fn test_parse_tags_strips_numbering_notes_and_punctuation() {
        let reply = "1. beach (sandy)\n2. sunset。\n10. sea（calm）\n\"sky\", beach, ";
        assert_eq!(parse_tags(reply), vec!["beach", "sunset", "sea", "sky"]);
    }

    #[test]
    fn test_parse_tags_drops_overlong_entries() {
        let long = "x".repeat(MAX_TAG_CHARS + 1);
        assert_eq!(parse_tags(&format!("cat, {long}, dog")), vec!["cat", "dog"]);
        assert!(parse_tags(" ,，; ").is_empty());
    }

    #[test]
    fn test_detect_mime() {
        assert_eq!(detect_mime(b"\x89PNG\r\n\x1a\n0000"), "image/png");
        assert_eq!(detect_mime(b"GIF89a......"), "image/gif");
        assert_eq!(detect_mime(b"\xFF\xD8\xFF\xE0"), "image/jpeg");
        assert_eq!(detect_mime(b"unknown"), "image/jpeg");
    }

    #[test]
    fn test_build_messages_embeds_data_uri() {
        let messages = ImageTagger::build_messages(b"\x89PNG\r\n\x1a\nrest").unwrap();
        let user = &messages[1];
        let MessageContent::Parts(parts) = &user.content else {
            panic!("expected parts");
        };
        match &parts[0] {
            ContentPart::ImageUrl { image_url } => {
                assert!(image_url.url.starts_with("data:image/png;base64,"));
            }
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_oversized_image_is_rejected() {
        let bytes = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert!(matches!(
            ImageTagger::build_messages(&bytes),
            Err(AiError::ImageTooLarge { .. })
        ));
        // Base64 grows by a third, so this passes the raw check but not the encoded one.
        let bytes = vec![0u8; MAX_IMAGE_BYTES - 10];
        assert!(matches!(
            ImageTagger::build_messages(&bytes),
            Err(AiError::ImageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_analyze_reads_file_and_parses_reply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nrest").unwrap();

        let backend = Arc::new(ScriptedBackend::new(vec![Ok("cat, sofa, cozy".into())]));
        let tagger = ImageTagger::new(backend.clone(), "vision".into());
        let tags = tagger.analyze(&path).await.unwrap();
        assert_eq!(tags, vec!["cat", "sofa", "cozy"]);
        assert_eq!(backend.calls(), vec!["vision"]);
    }

    #[tokio::test]
    async fn test_analyze_without_tags_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFF").unwrap();

        let backend = Arc::new(ScriptedBackend::new(vec![Ok(" ,, ".into())]));
        let tagger = ImageTagger::new(backend, "vision".into());
        assert!(matches!(tagger.analyze(&path).await, Err(AiError::NoTags)));
        assert!(matches!(
            tagger.analyze(&dir.path().join("missing.jpg")).await,
            Err(AiError::ReadImage { .. })
        ));
    }
}
