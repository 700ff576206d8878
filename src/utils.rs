//! Utility functions for URL validation, whitespace cleanup, and logging.
//!
//! This module provides helpers used throughout the pipeline:
//! - URL validation for user-submitted article links
//! - Whitespace normalization for extracted text
//! - String truncation for logging raw model output
//! - JSON error classification for truncated model responses

use crate::error::{GrabError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Check that `input` is a non-empty http(s) URL.
///
/// The scheme check runs before parsing so that `"ftp://..."` and bare words
/// are both rejected with a message the user can act on.
///
/// # Errors
///
/// Returns [`GrabError::Validation`] for empty input, a missing or
/// unsupported scheme, or a URL that does not parse.
pub fn validate_article_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(GrabError::Validation("Please enter a valid URL.".to_string()));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(GrabError::Validation(
            "Please enter a full URL starting with http:// or https://".to_string(),
        ));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| GrabError::Validation(format!("Please enter a valid URL ({}).", e)))?;
    if url.host_str().is_none() {
        return Err(GrabError::Validation("Please enter a valid URL.".to_string()));
    }
    Ok(url)
}

/// True when `candidate` parses as an absolute http(s) URL.
pub fn is_absolute_http_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Collapse every run of whitespace to a single space and trim the ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(collapse_whitespace("  a \n\n b\t c "), "a b c");
/// ```
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a char
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// A model response cut off by its token limit fails with an EOF error;
/// the normalizer mentions this in its diagnostic.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty() {
        assert!(matches!(validate_article_url(""), Err(GrabError::Validation(_))));
        assert!(matches!(validate_article_url("   "), Err(GrabError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_missing_scheme() {
        assert!(matches!(
            validate_article_url("not-a-url"),
            Err(GrabError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_ftp() {
        let err = validate_article_url("ftp://example.com").unwrap_err();
        assert!(err.to_string().contains("http:// or https://"));
    }

    #[test]
    fn test_validate_rejects_scheme_without_host() {
        assert!(validate_article_url("https://").is_err());
    }

    #[test]
    fn test_validate_accepts_http_and_https() {
        assert_eq!(
            validate_article_url("http://x.com").unwrap().as_str(),
            "http://x.com/"
        );
        let url = validate_article_url("https://x.com/path?q=1").unwrap();
        assert_eq!(url.path(), "/path");
        assert_eq!(url.query(), Some("q=1"));
    }

    #[test]
    fn test_is_absolute_http_url() {
        assert!(is_absolute_http_url("https://x.com/i.jpg"));
        assert!(!is_absolute_http_url("/images/lead.jpg"));
        assert!(!is_absolute_http_url("data:image/png;base64,AAAA"));
        assert!(!is_absolute_http_url(""));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\n b\t c "), "a b c");
        assert_eq!(collapse_whitespace("already clean"), "already clean");
        assert_eq!(collapse_whitespace("\n\t "), "");
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte_boundary() {
        // 'é' is two bytes; cutting at 3 lands inside the second one
        let result = truncate_for_log("éééé", 3);
        assert_eq!(result, "é…(+6 bytes)");
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"{"title": "value"#;
        let err = serde_json::from_str::<serde_json::Value>(json_eof).unwrap_err();
        assert!(looks_truncated(&err));

        let err = serde_json::from_str::<serde_json::Value>("{oops}").unwrap_err();
        assert!(!looks_truncated(&err));
    }
}
