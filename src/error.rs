//! Error taxonomy for the extraction pipeline.
//!
//! Every failure that is not the in-band `"Extraction Failed"` sentinel is
//! reported through [`GrabError`]. Nothing in the pipeline retries; each error
//! is surfaced once to the orchestrating caller.

use thiserror::Error;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, GrabError>;

/// Failures raised while validating input, talking to the model, or capturing pages.
#[derive(Debug, Error)]
pub enum GrabError {
    /// Malformed or missing input (bad URL, no pending fallback).
    #[error("{0}")]
    Validation(String),

    /// Transport or model invocation failure.
    #[error("Failed to communicate with the AI service: {0}")]
    Gateway(String),

    /// The model answered with text that does not match the article schema.
    #[error("The AI returned a response that was not valid JSON: {reason}")]
    MalformedResponse {
        /// Why parsing failed.
        reason: String,
        /// The offending model output, kept for diagnosis.
        raw: String,
    },

    /// The page could not be loaded in the browser.
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Screen or tab capture was unavailable, denied, or produced nothing.
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Settings file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GrabError {
    /// True when a capture failed because the user declined or cancelled it.
    ///
    /// Browsers report a dismissed share picker as "permission denied" and a
    /// missing source as "not found"; both are benign end states, not errors.
    pub fn is_capture_cancelled(&self) -> bool {
        match self {
            GrabError::Capture(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("permission denied") || msg.contains("not found")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GrabError {
    fn from(e: reqwest::Error) -> Self {
        GrabError::Gateway(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_cancelled_matches_permission_denied() {
        let e = GrabError::Capture("NotAllowedError: Permission denied by user".into());
        assert!(e.is_capture_cancelled());
    }

    #[test]
    fn test_capture_cancelled_matches_not_found() {
        let e = GrabError::Capture("NotFoundError: Requested device not found".into());
        assert!(e.is_capture_cancelled());
    }

    #[test]
    fn test_other_errors_are_not_cancellations() {
        assert!(!GrabError::Capture("screencast stream closed".into()).is_capture_cancelled());
        assert!(!GrabError::Gateway("permission denied".into()).is_capture_cancelled());
        assert!(!GrabError::Navigation("https://x.com: 404 not found".into()).is_capture_cancelled());
        assert!(!GrabError::Validation("not found".into()).is_capture_cancelled());
    }

    #[test]
    fn test_malformed_response_message() {
        let e = GrabError::MalformedResponse {
            reason: "expected value at line 1 column 1".into(),
            raw: "nope".into(),
        };
        assert_eq!(
            e.to_string(),
            "The AI returned a response that was not valid JSON: expected value at line 1 column 1"
        );
    }
}
