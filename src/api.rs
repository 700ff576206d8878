//! Generative model gateway.
//!
//! This module is the only place that talks to the AI service. It knows how to
//! ship a prompt plus optional inline images and return the raw text answer;
//! it knows nothing about articles.
//!
//! # Architecture
//!
//! - [`Gateway`]: capability trait the extractors are generic over
//! - [`GenerateRequest`] / [`Part`]: provider-neutral request shape
//! - [`GeminiGateway`]: implementation against the Gemini `generateContent`
//!   REST endpoint
//!
//! The gateway is built once at startup from [`GatewayConfig`] and injected
//! wherever it is needed. Failures are reported once and never retried.

use crate::error::{GrabError, Result};
use crate::models::ImageFrame;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// One piece of model input.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// An inline JPEG screenshot.
    Image(ImageFrame),
}

/// Provider-neutral generation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub parts: Vec<Part>,
    /// Let the model ground its answer with a live web search.
    pub web_search: bool,
}

impl GenerateRequest {
    /// A plain prompt with no images.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Text(prompt.into())],
            web_search: false,
        }
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, Part::Image(_)))
            .count()
    }
}

/// Raw model answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateResponse {
    pub text: String,
}

/// Capability for invoking a text- and vision-capable generative model.
pub trait Gateway: Send + Sync {
    /// Send `request` to the model and return its raw text.
    ///
    /// # Errors
    ///
    /// [`GrabError::Gateway`] on transport failure, a non-success status, or
    /// an answer without text.
    fn generate(
        &self,
        request: GenerateRequest,
    ) -> impl Future<Output = Result<GenerateResponse>> + Send;
}

/// Connection settings for [`GeminiGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Gemini REST client implementing [`Gateway`].
#[derive(Clone)]
pub struct GeminiGateway {
    http_client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGateway")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiGateway {
    /// Build the client.
    ///
    /// # Errors
    ///
    /// [`GrabError::Config`] if the HTTP client cannot be constructed.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GrabError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            api_key: config.api_key,
            model: config.model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

// --- Gemini wire format ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum GeminiPart {
    Text(String),
    InlineData(GeminiBlob),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_search: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

impl From<&GenerateRequest> for GeminiRequest {
    fn from(req: &GenerateRequest) -> Self {
        let parts = req
            .parts
            .iter()
            .map(|p| match p {
                Part::Text(t) => GeminiPart::Text(t.clone()),
                Part::Image(frame) => GeminiPart::InlineData(GeminiBlob {
                    mime_type: ImageFrame::MIME_TYPE,
                    data: frame.to_base64(),
                }),
            })
            .collect();
        let tools = if req.web_search {
            vec![GeminiTool {
                google_search: serde_json::Map::new(),
            }]
        } else {
            Vec::new()
        };
        GeminiRequest {
            contents: vec![GeminiContent { role: "user", parts }],
            tools,
        }
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(resp: GeminiResponse) -> Option<String> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

impl Gateway for GeminiGateway {
    #[instrument(level = "info", skip_all, fields(model = %self.model, images = request.image_count(), web_search = request.web_search))]
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let t0 = Instant::now();
        let body = GeminiRequest::from(&request);

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Model request failed");
                GrabError::Gateway(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(%status, body = %truncate_for_log(&detail, 300), "Model returned an error status");
            return Err(GrabError::Gateway(format!(
                "model returned {}: {}",
                status,
                truncate_for_log(&detail, 300)
            )));
        }

        let parsed: GeminiResponse = response.json().await?;
        let text = response_text(parsed)
            .ok_or_else(|| GrabError::Gateway("model response contained no text".to_string()))?;

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = text.len(),
            "Model responded"
        );
        debug!(preview = %truncate_for_log(&text, 300), "Model response text");
        Ok(GenerateResponse { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_request_wire_format() {
        let req = GenerateRequest::text("hello").with_web_search(true);
        let wire = serde_json::to_value(GeminiRequest::from(&req)).unwrap();
        assert_eq!(
            wire,
            json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }],
                "tools": [{ "googleSearch": {} }]
            })
        );
    }

    #[test]
    fn test_image_request_wire_format() {
        let req = GenerateRequest {
            parts: vec![
                Part::Text("read this".to_string()),
                Part::Image(ImageFrame::from_jpeg(vec![0xFF, 0xD8, 0xFF, 0xE0])),
            ],
            web_search: false,
        };
        assert_eq!(req.image_count(), 1);

        let wire = serde_json::to_value(GeminiRequest::from(&req)).unwrap();
        assert!(wire.get("tools").is_none());
        assert_eq!(
            wire["contents"][0]["parts"][1],
            json!({ "inlineData": { "mimeType": "image/jpeg", "data": "/9j/4A==" } })
        );
    }

    #[test]
    fn test_response_text_joins_parts() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"title\":" }, { "text": " \"Foo\"}" }] }
            }]
        }))
        .unwrap();
        assert_eq!(response_text(resp).as_deref(), Some("{\"title\": \"Foo\"}"));
    }

    #[test]
    fn test_response_without_text() {
        let empty: GeminiResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert_eq!(response_text(empty), None);

        let blocked: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        assert_eq!(response_text(blocked), None);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let gateway = GeminiGateway::new(GatewayConfig {
            api_key: "k".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(
            gateway.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert!(!format!("{:?}", gateway).contains("\"k\""));
    }
}
