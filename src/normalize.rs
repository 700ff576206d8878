//! Parse raw model output into a strict [`ArticleData`].
//!
//! The model is asked for a bare JSON object but frequently wraps it in a
//! markdown fence anyway. Only the fenced interior is parsed when a fence is
//! present. Anything that is not exactly the article shape is rejected;
//! defaults are never substituted for missing fields.

use crate::error::{GrabError, Result};
use crate::models::ArticleData;
use crate::utils::{collapse_whitespace, is_absolute_http_url, looks_truncated, truncate_for_log};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{error, warn};

/// A fence must open and close on its own line, so backticks quoted inside a
/// JSON string never count as one.
static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*```(?:json)?[ \t]*\r?\n([\s\S]*?)\r?\n[ \t]*```[ \t]*$").unwrap()
});

/// Wire shape of the model's answer. Unknown keys are an error.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawArticle {
    title: String,
    text_content: String,
    #[serde(default)]
    image_url: Option<String>,
}

/// Return the interior of the first fenced code block, or the trimmed text.
///
/// A bare JSON object is returned as-is even if its strings mention fences.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    match JSON_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Parse the model's raw text into an [`ArticleData`].
///
/// # Errors
///
/// [`GrabError::MalformedResponse`] when the (unfenced) text is not a JSON
/// object with exactly `title`, `textContent` and optional `imageUrl`, or
/// when the title is blank. The offending text is logged and carried in the
/// error.
pub fn normalize(raw: &str) -> Result<ArticleData> {
    let json = strip_code_fence(raw);

    let parsed: RawArticle = serde_json::from_str(json).map_err(|e| {
        let reason = if looks_truncated(&e) {
            format!("{} (response appears truncated)", e)
        } else {
            e.to_string()
        };
        error!(
            error = %reason,
            response_preview = %truncate_for_log(json, 300),
            "Failed to parse JSON from model response"
        );
        GrabError::MalformedResponse {
            reason,
            raw: raw.to_string(),
        }
    })?;

    let title = collapse_whitespace(&parsed.title);
    if title.is_empty() {
        error!(response_preview = %truncate_for_log(json, 300), "Model returned an empty title");
        return Err(GrabError::MalformedResponse {
            reason: "title is empty".to_string(),
            raw: raw.to_string(),
        });
    }

    let mut article = ArticleData {
        title,
        text_content: collapse_whitespace(&parsed.text_content),
        image_url: parsed
            .image_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty()),
    };

    if article.is_extraction_failure() {
        article.image_url = None;
    } else if let Some(url) = article.image_url.take() {
        if is_absolute_http_url(&url) {
            article.image_url = Some(url);
        } else {
            warn!(image_url = %url, "Dropping image URL that is not absolute");
        }
    }

    Ok(article)
}
