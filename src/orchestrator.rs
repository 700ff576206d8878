//! The extraction workflow for one user session.
//!
//! The orchestrator is the only component that knows the fallback policy:
//!
//! ```text
//! Idle ──grab──▶ DirectAttempt ──▶ Done
//!                      │
//!                      ├──▶ Failed
//!                      │
//!                      └──▶ AwaitingFallbackChoice ──confirm──▶ CaptureAttempt ──▶ Done
//!                                   │                                 │
//!                                   └──decline──▶ Idle ◀──cancelled───┼──▶ Failed
//! ```
//!
//! # Attempt tokens
//!
//! Every `grab` starts a new attempt and bumps a counter. Work for an
//! attempt settles only if its token is still current, so a slow model call
//! from an abandoned attempt can never overwrite a newer result. In-flight
//! calls are not cancelled; their results are dropped.

use crate::api::Gateway;
use crate::capture::PageCapture;
use crate::error::{GrabError, Result};
use crate::extract::{extract_from_images, extract_from_url};
use crate::models::ArticleData;
use crate::utils::validate_article_url;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Shown when the screenshot path yields nothing usable.
pub const SCREENSHOT_FAILED_MESSAGE: &str = "AI failed to extract from screenshot";

/// Diagnostics that mean the model could not reach the page at all, which
/// makes a screenshot retry worthwhile.
const DIRECT_ACCESS_PHRASES: &[&str] = &[
    "unable to directly access",
    "cannot directly access",
    "can't directly access",
    "not able to directly access",
];

/// Where the current attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    DirectAttempt,
    /// Direct access failed in a way a screenshot might get around.
    AwaitingFallbackChoice {
        diagnostic: String,
    },
    CaptureAttempt,
    Done(ArticleData),
    Failed(String),
}

/// Identifies one user-initiated attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptToken(u64);

#[derive(Debug)]
struct SessionState {
    attempt: u64,
    phase: Phase,
    url: Option<String>,
}

/// True when a sentinel diagnostic says the page could not be reached directly.
pub fn offers_fallback(diagnostic: &str) -> bool {
    let lower = diagnostic.to_lowercase();
    DIRECT_ACCESS_PHRASES.iter().any(|p| lower.contains(p))
}

/// Runs direct extraction and, on request, the screenshot fallback.
pub struct Orchestrator<G, C> {
    gateway: Arc<G>,
    capture: C,
    web_search: bool,
    state: Mutex<SessionState>,
}

impl<G: Gateway, C: PageCapture> Orchestrator<G, C> {
    pub fn new(gateway: Arc<G>, capture: C, web_search: bool) -> Self {
        Self {
            gateway,
            capture,
            web_search,
            state: Mutex::new(SessionState {
                attempt: 0,
                phase: Phase::Idle,
                url: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase.clone()
    }

    pub fn current_attempt(&self) -> AttemptToken {
        AttemptToken(self.lock().attempt)
    }

    /// Start a new attempt, discarding the previous article, error and fallback offer.
    fn begin(&self, url: Option<String>) -> AttemptToken {
        let mut state = self.lock();
        state.attempt += 1;
        state.phase = Phase::DirectAttempt;
        state.url = url;
        AttemptToken(state.attempt)
    }

    /// Record `next` if `token` is still current; otherwise keep the newer state.
    fn settle(&self, token: AttemptToken, next: Phase) -> Phase {
        let mut state = self.lock();
        if state.attempt != token.0 {
            debug!(
                stale = token.0,
                current = state.attempt,
                "Dropping result of superseded attempt"
            );
            return state.phase.clone();
        }
        state.phase = next;
        state.phase.clone()
    }

    /// Validate `url` and try direct extraction.
    ///
    /// # Errors
    ///
    /// Only [`GrabError::Validation`], raised before any model call. Every
    /// other outcome is reported through the returned [`Phase`].
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn grab(&self, url: &str) -> Result<Phase> {
        let url = url.trim();
        let validated = validate_article_url(url);
        let token = self.begin(validated.is_ok().then(|| url.to_string()));
        if let Err(e) = validated {
            warn!(error = %e, "Rejected URL");
            self.settle(token, Phase::Failed(e.to_string()));
            return Err(e);
        }

        let next = match extract_from_url(&*self.gateway, url, self.web_search).await {
            Ok(article) if article.is_extraction_failure() => {
                if offers_fallback(&article.text_content) {
                    info!("Direct access failed; offering screenshot fallback");
                    Phase::AwaitingFallbackChoice {
                        diagnostic: article.text_content,
                    }
                } else {
                    Phase::Failed(article.text_content)
                }
            }
            Ok(article) => Phase::Done(article),
            Err(e) => Phase::Failed(e.to_string()),
        };
        Ok(self.settle(token, next))
    }

    /// Accept the screenshot fallback: capture the page, then read the frames.
    ///
    /// # Errors
    ///
    /// [`GrabError::Validation`] when no fallback is pending; the phase is
    /// left unchanged.
    #[instrument(level = "info", skip_all)]
    pub async fn confirm_fallback(&self) -> Result<Phase> {
        let (token, url) = {
            let mut state = self.lock();
            let pending = matches!(state.phase, Phase::AwaitingFallbackChoice { .. });
            match state.url.clone() {
                Some(url) if pending => {
                    state.phase = Phase::CaptureAttempt;
                    (AttemptToken(state.attempt), url)
                }
                _ => {
                    return Err(GrabError::Validation(
                        "No screenshot fallback is pending.".to_string(),
                    ));
                }
            }
        };

        let outcome = async {
            let frames = self.capture.capture_full_page(&url).await?;
            extract_from_images(&*self.gateway, frames).await
        }
        .await;

        let next = match outcome {
            Ok(article) if article.is_extraction_failure() || article.text_content.is_empty() => {
                warn!("Screenshot extraction produced no usable article");
                Phase::Failed(SCREENSHOT_FAILED_MESSAGE.to_string())
            }
            Ok(article) => Phase::Done(article),
            Err(e) if e.is_capture_cancelled() => {
                info!(reason = %e, "Capture cancelled by user");
                Phase::Idle
            }
            Err(e) => Phase::Failed(e.to_string()),
        };
        Ok(self.settle(token, next))
    }

    /// Turn down the screenshot fallback.
    pub fn decline_fallback(&self) -> Phase {
        let mut state = self.lock();
        if matches!(state.phase, Phase::AwaitingFallbackChoice { .. }) {
            state.phase = Phase::Idle;
        }
        state.phase.clone()
    }
}
