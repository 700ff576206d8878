//! Page capture strategies for the screenshot fallback.
//!
//! Every strategy implements [`PageCapture`] and yields JPEG frames in
//! top-to-bottom order. The image extractor relies on that order to
//! deduplicate text that overlaps between adjacent frames.
//!
//! # Strategies
//!
//! | Strategy | Module | Frames | Browser |
//! |----------|--------|--------|---------|
//! | Headless rendering | [`headless`] | `ceil(H / V)` | launched per capture, always closed |
//! | Tab capture | [`tab`] | exactly 1 | the user's running browser, stream always stopped |
//!
//! Both wait a fixed settle delay before grabbing pixels. That delay is a
//! wait-for-paint heuristic; nothing guarantees lazy content has rendered.

pub mod headless;
pub mod tab;

use crate::error::{GrabError, Result};
use crate::models::ImageFrame;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub use headless::{HeadlessCapture, HeadlessOptions};
pub use tab::{CdpDisplaySource, DisplaySource, TabCapture, TabStream};

/// Produce the ordered screenshot sequence for a page.
pub trait PageCapture: Send + Sync {
    /// Capture `url` as JPEG frames, top of the page first.
    ///
    /// # Errors
    ///
    /// [`GrabError::Navigation`] if the page cannot be loaded,
    /// [`GrabError::Capture`] if capture is unavailable or denied.
    fn capture_full_page(&self, url: &str)
    -> impl Future<Output = Result<Vec<ImageFrame>>> + Send;
}

/// A rendered page that can be scrolled and photographed one viewport at a time.
pub trait ScrollSurface: Send + Sync {
    /// Total scrollable height in CSS pixels.
    fn page_height(&self) -> impl Future<Output = Result<u64>> + Send;
    /// Visible viewport height in CSS pixels.
    fn viewport_height(&self) -> impl Future<Output = Result<u64>> + Send;
    /// Scroll so that `offset` is the top of the viewport.
    fn scroll_to(&self, offset: u64) -> impl Future<Output = Result<()>> + Send;
    /// JPEG of what is currently visible.
    fn capture_viewport(&self) -> impl Future<Output = Result<ImageFrame>> + Send;
}

/// Vertical offsets to visit for a page of `page_height` seen through `viewport_height`.
///
/// Always at least one offset, so a page no taller than the viewport (or
/// reporting zero height) still yields a frame.
pub fn scroll_offsets(page_height: u64, viewport_height: u64) -> Vec<u64> {
    debug_assert!(viewport_height > 0);
    let mut offsets = vec![0];
    let mut next = viewport_height;
    while next < page_height {
        offsets.push(next);
        next += viewport_height;
    }
    offsets
}

/// Walk `surface` from the top in viewport-height steps, capturing each stop.
///
/// Steps run strictly in sequence: scroll, wait `settle`, capture. Parallel
/// scrolling would race the page's own rendering.
#[instrument(level = "info", skip_all, fields(settle_ms = settle.as_millis() as u64))]
pub async fn capture_scrolling<S: ScrollSurface>(
    surface: &S,
    settle: Duration,
) -> Result<Vec<ImageFrame>> {
    let page_height = surface.page_height().await?;
    let viewport_height = surface.viewport_height().await?;
    if viewport_height == 0 {
        return Err(GrabError::Capture("viewport height is zero".to_string()));
    }

    let offsets = scroll_offsets(page_height, viewport_height);
    info!(
        page_height,
        viewport_height,
        frames = offsets.len(),
        "Capturing page in viewport-sized frames"
    );

    let mut frames = Vec::with_capacity(offsets.len());
    for offset in offsets {
        surface.scroll_to(offset).await?;
        tokio::time::sleep(settle).await;
        let frame = surface.capture_viewport().await?;
        debug!(offset, bytes = frame.len(), "Captured frame");
        frames.push(frame);
    }
    Ok(frames)
}

/// Capture strategy chosen at startup.
#[derive(Debug)]
pub enum AnyCapture {
    Headless(HeadlessCapture),
    Tab(TabCapture<CdpDisplaySource>),
}

impl PageCapture for AnyCapture {
    async fn capture_full_page(&self, url: &str) -> Result<Vec<ImageFrame>> {
        match self {
            AnyCapture::Headless(c) => c.capture_full_page(url).await,
            AnyCapture::Tab(c) => c.capture_full_page(url).await,
        }
    }
}
