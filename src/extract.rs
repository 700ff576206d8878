//! The two extraction paths: straight from a URL, and from screenshots.
//!
//! Both are stateless: build the prompt, call the injected [`Gateway`],
//! normalize the answer. Neither decides what happens on failure; that is
//! the orchestrator's job.

use crate::api::{Gateway, GenerateRequest, Part};
use crate::error::{GrabError, Result};
use crate::models::{ArticleData, ImageFrame};
use crate::normalize::normalize;
use crate::prompts::{PromptInput, build_prompt};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Most screenshots sent in one request. Frames run top-down, so the dropped
/// ones are the bottom of very tall pages.
pub const MAX_FRAMES: usize = 40;

/// Budget for base64-encoded image data. Gemini rejects inline requests over
/// 20 MB; the rest is left for the prompt and JSON framing.
pub const MAX_INLINE_BYTES: usize = 18 * 1024 * 1024;

/// Keep the leading frames that fit within [`MAX_FRAMES`] and [`MAX_INLINE_BYTES`].
fn fit_inline_budget(frames: Vec<ImageFrame>) -> Vec<ImageFrame> {
    let captured = frames.len();
    let mut budget = MAX_INLINE_BYTES;
    let kept: Vec<ImageFrame> = frames
        .into_iter()
        .take(MAX_FRAMES)
        .take_while(|frame| {
            let encoded = frame.len().div_ceil(3) * 4;
            if encoded > budget {
                return false;
            }
            budget -= encoded;
            true
        })
        .collect();
    if kept.len() < captured {
        warn!(
            captured,
            sent = kept.len(),
            "Dropping bottom frames to stay within the inline request limit"
        );
    }
    kept
}

/// Ask the model to fetch and parse `url` itself.
///
/// A returned record may be the `"Extraction Failed"` sentinel; callers must
/// check [`ArticleData::is_extraction_failure`].
///
/// # Errors
///
/// [`GrabError::Gateway`] from the model call, [`GrabError::MalformedResponse`]
/// from the normalizer, both unchanged.
#[instrument(level = "info", skip_all, fields(%url, web_search = web_search))]
pub async fn extract_from_url<G: Gateway>(
    gateway: &G,
    url: &str,
    web_search: bool,
) -> Result<ArticleData> {
    let t0 = Instant::now();
    let request =
        GenerateRequest::text(build_prompt(PromptInput::Url(url))).with_web_search(web_search);
    let response = gateway.generate(request).await?;
    let article = normalize(&response.text)?;

    if article.is_extraction_failure() {
        warn!(diagnostic = %article.text_content, "Model reported extraction failure");
    } else {
        info!(
            title = %article.title,
            chars = article.text_content.len(),
            has_image = article.image_url.is_some(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Extracted article from URL"
        );
    }
    Ok(article)
}

/// Ask the model to read an article out of top-to-bottom screenshots.
///
/// Takes ownership of the frames; they are consumed by this one call. At
/// most [`MAX_FRAMES`] frames, and no more than [`MAX_INLINE_BYTES`] of
/// encoded image data, are sent; later frames are dropped with a warning.
/// The returned record never carries an image URL.
///
/// # Errors
///
/// [`GrabError::Capture`] for an empty frame sequence, or a first frame too
/// large to send (no model call is made), otherwise the same errors as
/// [`extract_from_url`].
#[instrument(level = "info", skip_all, fields(frames = frames.len()))]
pub async fn extract_from_images<G: Gateway>(
    gateway: &G,
    frames: Vec<ImageFrame>,
) -> Result<ArticleData> {
    if frames.is_empty() {
        return Err(GrabError::Capture("no frames were captured".to_string()));
    }
    let frames = fit_inline_budget(frames);
    if frames.is_empty() {
        return Err(GrabError::Capture(
            "screenshot exceeds the inline request limit".to_string(),
        ));
    }
    let t0 = Instant::now();

    let mut parts = Vec::with_capacity(frames.len() + 1);
    parts.push(Part::Text(build_prompt(PromptInput::for_frames(frames.len()))));
    parts.extend(frames.into_iter().map(Part::Image));
    let request = GenerateRequest {
        parts,
        web_search: false,
    };

    let response = gateway.generate(request).await?;
    let mut article = normalize(&response.text)?;
    article.image_url = None;

    info!(
        title = %article.title,
        chars = article.text_content.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Extracted article from screenshots"
    );
    Ok(article)
}
