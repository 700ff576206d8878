//! Capture of the user's current browser tab.
//!
//! The capture stream is a scoped resource: it is stopped as soon as one
//! frame has been grabbed, or as soon as grabbing fails, so the browser's
//! "tab is being captured" indicator never lingers.
//!
//! [`CdpDisplaySource`] realizes the stream over the DevTools protocol by
//! attaching to a browser the user started with `--remote-debugging-port`
//! and reading the tab's screencast. Only a tab already showing the
//! requested URL is used; with none, the source is reported as not found.

use super::PageCapture;
use crate::error::{GrabError, Result};
use crate::models::ImageFrame;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::{
    EventScreencastFrame, ScreencastFrameAckParams, StartScreencastFormat, StartScreencastParams,
    StopScreencastParams,
};
use chromiumoxide::listeners::EventStream;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Source of live video streams of a browser tab.
pub trait DisplaySource: Send + Sync {
    type Stream: TabStream;

    /// Start a video-only stream of the tab showing `url`.
    ///
    /// A user refusing the request surfaces as a [`GrabError::Capture`] whose
    /// message contains "permission denied" or "not found".
    fn request_tab_stream(&self, url: &str) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// A running tab stream.
pub trait TabStream: Send {
    /// Grab one still frame as JPEG.
    fn grab_frame(&mut self) -> impl Future<Output = Result<ImageFrame>> + Send;
    /// Stop the stream and release the capture.
    fn stop(self) -> impl Future<Output = ()> + Send;
}

/// Single-frame capture from a [`DisplaySource`].
#[derive(Debug)]
pub struct TabCapture<S> {
    source: S,
    settle: Duration,
}

impl<S> TabCapture<S> {
    /// `settle` is waited between starting the stream and grabbing the frame.
    pub fn new(source: S, settle: Duration) -> Self {
        Self { source, settle }
    }
}

impl<S: DisplaySource> PageCapture for TabCapture<S> {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn capture_full_page(&self, url: &str) -> Result<Vec<ImageFrame>> {
        let mut stream = self.source.request_tab_stream(url).await?;

        tokio::time::sleep(self.settle).await;
        let frame = stream.grab_frame().await;
        stream.stop().await;

        let frame = frame?;
        info!(bytes = frame.len(), "Captured tab frame");
        Ok(vec![frame])
    }
}

/// Tab streams from a browser reachable over the DevTools protocol.
#[derive(Debug, Clone)]
pub struct CdpDisplaySource {
    /// WebSocket or HTTP DevTools endpoint, e.g. `http://127.0.0.1:9222`.
    pub debugger_url: String,
    pub jpeg_quality: u8,
    /// Longest wait for the first screencast frame.
    pub frame_timeout: Duration,
}

impl CdpDisplaySource {
    pub fn new(debugger_url: impl Into<String>) -> Self {
        Self {
            debugger_url: debugger_url.into(),
            jpeg_quality: 80,
            frame_timeout: Duration::from_secs(5),
        }
    }
}

/// Compare page URLs ignoring a trailing slash and any fragment.
fn same_page(a: &str, b: &str) -> bool {
    fn key(u: &str) -> &str {
        u.split('#').next().unwrap_or(u).trim_end_matches('/')
    }
    key(a) == key(b)
}

/// Index of the tab showing `url`. Unrelated tabs are never chosen.
fn select_tab(tab_urls: &[String], url: &str) -> Option<usize> {
    tab_urls.iter().position(|current| same_page(current, url))
}

/// Pick the tab showing `url`.
async fn pick_tab(pages: Vec<Page>, url: &str) -> Option<Page> {
    let mut tab_urls = Vec::with_capacity(pages.len());
    for page in &pages {
        tab_urls.push(page.url().await.ok().flatten().unwrap_or_default());
    }
    match select_tab(&tab_urls, url) {
        Some(index) => pages.into_iter().nth(index),
        None => {
            debug!(open_tabs = tab_urls.len(), "No tab shows the requested URL");
            None
        }
    }
}

impl DisplaySource for CdpDisplaySource {
    type Stream = CdpTabStream;

    #[instrument(level = "info", skip_all, fields(debugger_url = %self.debugger_url))]
    async fn request_tab_stream(&self, url: &str) -> Result<CdpTabStream> {
        let (mut browser, mut handler) = Browser::connect(&self.debugger_url)
            .await
            .map_err(|e| GrabError::Capture(format!("cannot attach to browser: {}", e)))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let attached = async {
            browser
                .fetch_targets()
                .await
                .map_err(|e| GrabError::Capture(format!("cannot list tabs: {}", e)))?;
            let pages = browser
                .pages()
                .await
                .map_err(|e| GrabError::Capture(format!("cannot list tabs: {}", e)))?;
            let page = pick_tab(pages, url)
                .await
                .ok_or_else(|| GrabError::Capture("capture source not found".to_string()))?;

            let frames = page
                .event_listener::<EventScreencastFrame>()
                .await
                .map_err(|e| GrabError::Capture(format!("cannot listen for frames: {}", e)))?;
            let params = StartScreencastParams::builder()
                .format(StartScreencastFormat::Jpeg)
                .quality(i64::from(self.jpeg_quality))
                .build();
            page.execute(params)
                .await
                .map_err(|e| GrabError::Capture(format!("cannot start tab stream: {}", e)))?;
            Ok::<_, GrabError>((page, frames))
        }
        .await;

        match attached {
            Ok((page, frames)) => {
                debug!("Tab stream started");
                Ok(CdpTabStream {
                    _browser: browser,
                    handler_task,
                    page,
                    frames,
                    frame_timeout: self.frame_timeout,
                })
            }
            Err(e) => {
                handler_task.abort();
                Err(e)
            }
        }
    }
}

/// Screencast of one tab. Dropping the connection leaves the user's browser running.
pub struct CdpTabStream {
    _browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    frames: EventStream<EventScreencastFrame>,
    frame_timeout: Duration,
}

impl TabStream for CdpTabStream {
    async fn grab_frame(&mut self) -> Result<ImageFrame> {
        let event = tokio::time::timeout(self.frame_timeout, self.frames.next())
            .await
            .map_err(|_| GrabError::Capture("timed out waiting for a tab frame".to_string()))?
            .ok_or_else(|| GrabError::Capture("tab stream ended before a frame arrived".to_string()))?;

        if let Err(e) = self
            .page
            .execute(ScreencastFrameAckParams::new(event.session_id))
            .await
        {
            debug!(error = %e, "Frame ack failed");
        }

        let data: &str = event.data.as_ref();
        ImageFrame::from_base64(data)
            .map_err(|e| GrabError::Capture(format!("tab frame is not valid base64: {}", e)))
    }

    async fn stop(self) {
        if let Err(e) = self.page.execute(StopScreencastParams::default()).await {
            warn!(error = %e, "Failed to stop tab stream");
        }
        self.handler_task.abort();
        debug!("Tab stream stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        requested: AtomicUsize,
        stopped: AtomicBool,
    }

    struct FakeSource {
        calls: Arc<Calls>,
        deny: Option<&'static str>,
        fail_grab: bool,
    }

    struct FakeStream {
        calls: Arc<Calls>,
        fail_grab: bool,
    }

    impl DisplaySource for FakeSource {
        type Stream = FakeStream;

        async fn request_tab_stream(&self, _url: &str) -> Result<FakeStream> {
            self.calls.requested.fetch_add(1, Ordering::SeqCst);
            if let Some(msg) = self.deny {
                return Err(GrabError::Capture(msg.to_string()));
            }
            Ok(FakeStream {
                calls: Arc::clone(&self.calls),
                fail_grab: self.fail_grab,
            })
        }
    }

    impl TabStream for FakeStream {
        async fn grab_frame(&mut self) -> Result<ImageFrame> {
            if self.fail_grab {
                Err(GrabError::Capture("frame grab failed".to_string()))
            } else {
                Ok(ImageFrame::from_jpeg(vec![0xFF, 0xD8]))
            }
        }

        async fn stop(self) {
            self.calls.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn capture(deny: Option<&'static str>, fail_grab: bool) -> (TabCapture<FakeSource>, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let source = FakeSource {
            calls: Arc::clone(&calls),
            deny,
            fail_grab,
        };
        (TabCapture::new(source, Duration::from_millis(300)), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_capture_yields_one_frame_and_stops() {
        let (capture, calls) = capture(None, false);
        let start = tokio::time::Instant::now();
        let frames = capture.capture_full_page("https://x.com").await.unwrap();

        assert_eq!(frames.len(), 1);
        assert!(calls.stopped.load(Ordering::SeqCst));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_stopped_when_grab_fails() {
        let (capture, calls) = capture(None, true);
        let err = capture.capture_full_page("https://x.com").await.unwrap_err();

        assert!(matches!(err, GrabError::Capture(_)));
        assert!(calls.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_request_is_cancellation() {
        let (capture, calls) = capture(Some("Permission denied by user"), false);
        let err = capture.capture_full_page("https://x.com").await.unwrap_err();

        assert!(err.is_capture_cancelled());
        assert_eq!(calls.requested.load(Ordering::SeqCst), 1);
        assert!(!calls.stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_select_tab_matches_requested_page() {
        let tabs = vec![
            "https://mail.example.com/inbox".to_string(),
            "https://x.com/story/".to_string(),
        ];
        assert_eq!(select_tab(&tabs, "https://x.com/story"), Some(1));
        assert_eq!(select_tab(&tabs, "https://x.com/story#comments"), Some(1));
    }

    #[test]
    fn test_select_tab_never_falls_back_to_unrelated_tab() {
        let tabs = vec![
            "https://mail.example.com/inbox".to_string(),
            "https://news.example.org/other-story".to_string(),
        ];
        assert_eq!(select_tab(&tabs, "https://x.com/story"), None);
        assert_eq!(select_tab(&[], "https://x.com/story"), None);
    }

    #[test]
    fn test_cdp_source_defaults() {
        let source = CdpDisplaySource::new("http://127.0.0.1:9222");
        assert_eq!(source.debugger_url, "http://127.0.0.1:9222");
        assert_eq!(source.frame_timeout, Duration::from_secs(5));
    }
}
