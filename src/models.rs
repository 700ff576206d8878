//! Data models for extracted articles and captured page frames.
//!
//! - [`ArticleData`]: the normalized `{title, textContent, imageUrl}` record
//!   returned by every extraction path
//! - [`ImageFrame`]: one JPEG screenshot of a viewport-sized region of a page
//!
//! `ArticleData` serializes with camelCase keys to match the JSON contract
//! the model is prompted to produce and the HTTP API returns.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Title the model uses to signal, in-band, that it could not extract an article.
pub const EXTRACTION_FAILED_TITLE: &str = "Extraction Failed";

/// The core content of a news article.
///
/// Built fresh for every extraction attempt and never mutated once the
/// normalizer has produced it.
///
/// # Sentinel
///
/// When the model cannot read the page it answers with
/// `title == "Extraction Failed"`, a diagnostic in `text_content`, and no
/// image. Check [`ArticleData::is_extraction_failure`] before treating the
/// record as an article.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleData {
    /// The article headline.
    pub title: String,
    /// Body text with whitespace collapsed to single spaces.
    pub text_content: String,
    /// Absolute URL of the representative image, if one was found.
    pub image_url: Option<String>,
}

impl ArticleData {
    /// Build the in-band failure record carrying `diagnostic`.
    pub fn extraction_failed(diagnostic: impl Into<String>) -> Self {
        Self {
            title: EXTRACTION_FAILED_TITLE.to_string(),
            text_content: diagnostic.into(),
            image_url: None,
        }
    }

    /// True when this is the `"Extraction Failed"` sentinel rather than an article.
    pub fn is_extraction_failure(&self) -> bool {
        self.title == EXTRACTION_FAILED_TITLE
    }
}

/// One JPEG-encoded screenshot.
///
/// Frames have no identity beyond their position in a capture sequence,
/// which runs top-to-bottom down the page.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFrame {
    jpeg: Vec<u8>,
}

impl ImageFrame {
    pub const MIME_TYPE: &'static str = "image/jpeg";

    pub fn from_jpeg(jpeg: Vec<u8>) -> Self {
        Self { jpeg }
    }

    /// Decode a base64 payload, as delivered by DevTools screencast frames.
    pub fn from_base64(data: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(data).map(Self::from_jpeg)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }

    /// Standard base64 encoding used for inline model payloads.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }
}

impl std::fmt::Debug for ImageFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFrame")
            .field("bytes", &self.jpeg.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_serializes_camel_case() {
        let article = ArticleData {
            title: "Foo".to_string(),
            text_content: "Bar baz.".to_string(),
            image_url: Some("https://x.com/i.jpg".to_string()),
        };

        let json = serde_json::to_value(&article).unwrap();
        assert_eq!(json["title"], "Foo");
        assert_eq!(json["textContent"], "Bar baz.");
        assert_eq!(json["imageUrl"], "https://x.com/i.jpg");
    }

    #[test]
    fn test_article_without_image_serializes_null() {
        let article = ArticleData {
            title: "Foo".to_string(),
            text_content: "Bar".to_string(),
            image_url: None,
        };

        let json = serde_json::to_string(&article).unwrap();
        assert!(json.contains(r#""imageUrl":null"#));
    }

    #[test]
    fn test_extraction_failed_sentinel() {
        let failed = ArticleData::extraction_failed("Content is behind a paywall.");
        assert!(failed.is_extraction_failure());
        assert_eq!(failed.title, "Extraction Failed");
        assert_eq!(failed.text_content, "Content is behind a paywall.");
        assert_eq!(failed.image_url, None);
    }

    #[test]
    fn test_real_article_is_not_failure() {
        let article = ArticleData {
            title: "Extraction of lithium rises".to_string(),
            text_content: "Mining output grew.".to_string(),
            image_url: None,
        };
        assert!(!article.is_extraction_failure());
    }

    #[test]
    fn test_frame_base64_encoding() {
        let frame = ImageFrame::from_jpeg(vec![0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(frame.to_base64(), "/9j/4A==");
        assert_eq!(frame.len(), 4);

        let decoded = ImageFrame::from_base64("/9j/4A==").unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_frame_from_invalid_base64() {
        assert!(ImageFrame::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_frame_debug_hides_payload() {
        let frame = ImageFrame::from_jpeg(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", frame), "ImageFrame { bytes: 3 }");
    }
}
