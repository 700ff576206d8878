//! Server-side capture in a freshly launched headless Chromium.
//!
//! One browser session per capture. The session is closed on every exit
//! path, including navigation and screenshot failures, so no Chromium
//! processes outlive the request.
//!
//! After navigation the page is given a bounded wait for its network to go
//! idle, so client-rendered and lazy-loaded articles have content before the
//! page height is measured. Like the scroll settle delay this is a
//! heuristic: a page that never goes quiet is captured once the wait expires.

use super::{PageCapture, ScrollSurface, capture_scrolling};
use crate::error::{GrabError, Result};
use crate::models::ImageFrame;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Lifecycle event name Chromium emits after 500 ms without network connections.
const NETWORK_IDLE: &str = "networkIdle";
const NAVIGATION_INIT: &str = "init";

/// Browser and timing settings for [`HeadlessCapture`].
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Wait after each scroll before the screenshot.
    pub scroll_settle: Duration,
    /// Longest wait for the network to go idle after navigation.
    pub network_idle_timeout: Duration,
    /// JPEG quality, 0-100.
    pub jpeg_quality: u8,
    /// Chromium binary; auto-detected when unset.
    pub chrome_executable: Option<PathBuf>,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 800,
            scroll_settle: Duration::from_millis(500),
            network_idle_timeout: Duration::from_secs(5),
            jpeg_quality: 80,
            chrome_executable: None,
        }
    }
}

/// Starts browser sessions.
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    fn launch(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// A running browser that must be closed after use.
pub trait BrowserSession: Send + Sync {
    type Surface: ScrollSurface;

    /// Load `url` in a new page, ready to be measured.
    ///
    /// # Errors
    ///
    /// [`GrabError::Navigation`] if the page cannot be loaded.
    fn open(&self, url: &str) -> impl Future<Output = Result<Self::Surface>> + Send;

    /// Shut the browser down. Failures are logged, not returned.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Scrolling full-page capture in a launched browser.
#[derive(Debug)]
pub struct HeadlessCapture<L = ChromiumLauncher> {
    launcher: L,
    scroll_settle: Duration,
}

impl HeadlessCapture {
    pub fn new(options: HeadlessOptions) -> Self {
        Self {
            scroll_settle: options.scroll_settle,
            launcher: ChromiumLauncher::new(options),
        }
    }
}

impl<L> HeadlessCapture<L> {
    pub fn with_launcher(launcher: L, scroll_settle: Duration) -> Self {
        Self {
            launcher,
            scroll_settle,
        }
    }
}

impl<L: BrowserLauncher> PageCapture for HeadlessCapture<L> {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn capture_full_page(&self, url: &str) -> Result<Vec<ImageFrame>> {
        let t0 = Instant::now();
        let session = self.launcher.launch().await?;

        let result = async {
            let surface = session.open(url).await?;
            capture_scrolling(&surface, self.scroll_settle).await
        }
        .await;

        session.close().await;

        match &result {
            Ok(frames) => info!(
                frames = frames.len(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Headless capture finished"
            ),
            Err(e) => warn!(error = %e, "Headless capture failed"),
        }
        result
    }
}

/// Launches headless Chromium through chromiumoxide.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    options: HeadlessOptions,
}

impl ChromiumLauncher {
    pub fn new(options: HeadlessOptions) -> Self {
        Self { options }
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let o = &self.options;
        let mut builder = BrowserConfig::builder()
            .window_size(o.viewport_width, o.viewport_height)
            .viewport(Some(Viewport {
                width: o.viewport_width,
                height: o.viewport_height,
                device_scale_factor: Some(1.0),
                ..Default::default()
            }))
            .args(["--disable-gpu", "--disable-dev-shm-usage", "--no-first-run"]);
        if let Some(path) = &o.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| GrabError::Capture(format!("invalid browser config: {}", e)))
    }
}

impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| GrabError::Capture(format!("failed to launch browser: {}", e)))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });
        debug!("Browser launched");

        Ok(ChromiumSession {
            browser,
            handler_task,
            jpeg_quality: self.options.jpeg_quality,
            network_idle_timeout: self.options.network_idle_timeout,
        })
    }
}

/// A launched Chromium process and its event handler task.
pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    jpeg_quality: u8,
    network_idle_timeout: Duration,
}

impl BrowserSession for ChromiumSession {
    type Surface = CdpSurface;

    async fn open(&self, url: &str) -> Result<CdpSurface> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| GrabError::Capture(format!("failed to open page: {}", e)))?;

        if let Err(e) = page.execute(SetLifecycleEventsEnabledParams::new(true)).await {
            debug!(error = %e, "Could not enable lifecycle events");
        }
        let events = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| GrabError::Capture(format!("cannot listen for page lifecycle: {}", e)))?;

        page.goto(url)
            .await
            .map_err(|e| GrabError::Navigation(format!("{}: {}", url, e)))?;

        let main_frame = page.mainframe().await.ok().flatten().map(|id| id.inner().clone());
        let signals = events.map(|event| LifecycleSignal {
            frame_id: event.frame_id.inner().clone(),
            loader_id: event.loader_id.inner().clone(),
            name: event.name.clone(),
        });
        if wait_for_network_idle(signals, main_frame.as_deref(), self.network_idle_timeout).await {
            debug!("Network idle");
        } else {
            warn!(
                timeout_ms = self.network_idle_timeout.as_millis() as u64,
                "Network did not go idle; capturing anyway"
            );
        }

        Ok(CdpSurface {
            page,
            jpeg_quality: self.jpeg_quality,
        })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Failed to close browser");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Failed to reap browser process");
        }
        self.handler_task.abort();
        debug!("Browser closed");
    }
}

/// The parts of a page lifecycle event the idle wait looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LifecycleSignal {
    frame_id: String,
    loader_id: String,
    name: String,
}

/// Wait until the main frame's current document reports `networkIdle`.
///
/// Only events after the navigation's `init` count, so lifecycle state
/// replayed for the blank starting page is ignored. Returns `false` when
/// `timeout` expires or the stream ends first.
async fn wait_for_network_idle<S>(events: S, main_frame: Option<&str>, timeout: Duration) -> bool
where
    S: Stream<Item = LifecycleSignal>,
{
    let mut events = std::pin::pin!(events);
    let wait = async {
        let mut loader: Option<String> = None;
        while let Some(signal) = events.next().await {
            if main_frame.is_some_and(|f| f != signal.frame_id) {
                continue;
            }
            if signal.name == NAVIGATION_INIT {
                loader = Some(signal.loader_id);
            } else if signal.name == NETWORK_IDLE && loader.as_deref() == Some(signal.loader_id.as_str()) {
                return true;
            }
        }
        false
    };
    tokio::time::timeout(timeout, wait).await.unwrap_or(false)
}

/// A DevTools page seen as a [`ScrollSurface`].
pub struct CdpSurface {
    page: Page,
    jpeg_quality: u8,
}

impl CdpSurface {
    async fn eval_height(&self, expression: &str) -> Result<u64> {
        let value: f64 = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| GrabError::Capture(format!("{} failed: {}", expression, e)))?
            .into_value()
            .map_err(|e| GrabError::Capture(format!("{} returned no number: {}", expression, e)))?;
        Ok(value.max(0.0).ceil() as u64)
    }
}

impl ScrollSurface for CdpSurface {
    async fn page_height(&self) -> Result<u64> {
        self.eval_height("document.body.scrollHeight").await
    }

    async fn viewport_height(&self) -> Result<u64> {
        self.eval_height("window.innerHeight").await
    }

    async fn scroll_to(&self, offset: u64) -> Result<()> {
        self.page
            .evaluate(format!("window.scrollTo(0, {})", offset))
            .await
            .map_err(|e| GrabError::Capture(format!("scroll to {} failed: {}", offset, e)))?;
        Ok(())
    }

    async fn capture_viewport(&self) -> Result<ImageFrame> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(i64::from(self.jpeg_quality))
            .build();
        let jpeg = self
            .page
            .screenshot(params)
            .await
            .map_err(|e| GrabError::Capture(format!("screenshot failed: {}", e)))?;
        Ok(ImageFrame::from_jpeg(jpeg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        launched: AtomicUsize,
        closed: AtomicUsize,
    }

    #[derive(Clone, Copy)]
    enum Script {
        Ok,
        NavigationFails,
        ScreenshotFailsAt(u64),
        LaunchFails,
    }

    struct FakeLauncher {
        calls: Arc<Calls>,
        script: Script,
    }

    struct FakeSession {
        calls: Arc<Calls>,
        script: Script,
    }

    /// Two viewports tall; the frame payload is the scroll offset's low byte.
    struct FakeSurface {
        script: Script,
        position: std::sync::Mutex<u64>,
    }

    impl BrowserLauncher for FakeLauncher {
        type Session = FakeSession;

        async fn launch(&self) -> Result<FakeSession> {
            if matches!(self.script, Script::LaunchFails) {
                return Err(GrabError::Capture("failed to launch browser: no chromium".into()));
            }
            self.calls.launched.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession {
                calls: Arc::clone(&self.calls),
                script: self.script,
            })
        }
    }

    impl BrowserSession for FakeSession {
        type Surface = FakeSurface;

        async fn open(&self, url: &str) -> Result<FakeSurface> {
            if matches!(self.script, Script::NavigationFails) {
                return Err(GrabError::Navigation(format!("{}: net::ERR_NAME_NOT_RESOLVED", url)));
            }
            Ok(FakeSurface {
                script: self.script,
                position: std::sync::Mutex::new(0),
            })
        }

        async fn close(self) {
            self.calls.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ScrollSurface for FakeSurface {
        async fn page_height(&self) -> Result<u64> {
            Ok(1600)
        }

        async fn viewport_height(&self) -> Result<u64> {
            Ok(800)
        }

        async fn scroll_to(&self, offset: u64) -> Result<()> {
            *self.position.lock().unwrap() = offset;
            Ok(())
        }

        async fn capture_viewport(&self) -> Result<ImageFrame> {
            let offset = *self.position.lock().unwrap();
            match self.script {
                Script::ScreenshotFailsAt(at) if at == offset => {
                    Err(GrabError::Capture("screenshot failed: target closed".into()))
                }
                _ => Ok(ImageFrame::from_jpeg(vec![(offset / 100) as u8])),
            }
        }
    }

    fn capture(script: Script) -> (HeadlessCapture<FakeLauncher>, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let launcher = FakeLauncher {
            calls: Arc::clone(&calls),
            script,
        };
        (HeadlessCapture::with_launcher(launcher, Duration::from_millis(500)), calls)
    }

    fn signal(frame: &str, loader: &str, name: &str) -> LifecycleSignal {
        LifecycleSignal {
            frame_id: frame.to_string(),
            loader_id: loader.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_default_options() {
        let options = HeadlessOptions::default();
        assert_eq!(options.scroll_settle, Duration::from_millis(500));
        assert_eq!(options.network_idle_timeout, Duration::from_secs(5));
        assert_eq!(options.viewport_height, 800);
        assert!(options.chrome_executable.is_none());
    }

    #[test]
    fn test_browser_config_builds() {
        let launcher = ChromiumLauncher::new(HeadlessOptions {
            chrome_executable: Some(PathBuf::from("/usr/bin/chromium")),
            ..HeadlessOptions::default()
        });
        assert!(launcher.browser_config().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_closes_session_on_success() {
        let (capture, calls) = capture(Script::Ok);
        let frames = capture.capture_full_page("https://x.com/a").await.unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].as_bytes(), &[8]);
        assert_eq!(calls.launched.load(Ordering::SeqCst), 1);
        assert_eq!(calls.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_failure_still_closes_session() {
        let (capture, calls) = capture(Script::NavigationFails);
        let err = capture.capture_full_page("https://nope.invalid").await.unwrap_err();

        assert!(matches!(err, GrabError::Navigation(_)));
        assert_eq!(calls.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_screenshot_failure_mid_scroll_still_closes_session() {
        let (capture, calls) = capture(Script::ScreenshotFailsAt(800));
        let err = capture.capture_full_page("https://x.com/a").await.unwrap_err();

        assert!(matches!(err, GrabError::Capture(_)));
        assert_eq!(calls.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_has_nothing_to_close() {
        let (capture, calls) = capture(Script::LaunchFails);
        let err = capture.capture_full_page("https://x.com/a").await.unwrap_err();

        assert!(matches!(err, GrabError::Capture(_)));
        assert_eq!(calls.launched.load(Ordering::SeqCst), 0);
        assert_eq!(calls.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_idle_after_navigation_init() {
        let events = futures::stream::iter(vec![
            signal("main", "blank", "networkIdle"),
            signal("main", "doc", "init"),
            signal("ad-frame", "ad", "networkIdle"),
            signal("main", "doc", "load"),
            signal("main", "doc", "networkIdle"),
        ]);
        assert!(wait_for_network_idle(events, Some("main"), Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_replayed_idle_of_blank_page_is_ignored() {
        let events = futures::stream::iter(vec![
            signal("main", "blank", "load"),
            signal("main", "blank", "networkIdle"),
            signal("main", "doc", "init"),
            signal("main", "doc", "load"),
        ]);
        assert!(!wait_for_network_idle(events, Some("main"), Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_idle_wait_is_bounded() {
        let events = futures::stream::iter(vec![signal("main", "doc", "init")])
            .chain(futures::stream::pending());
        let start = tokio::time::Instant::now();

        assert!(!wait_for_network_idle(events, Some("main"), Duration::from_secs(5)).await);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
