//! Optional YAML settings file.
//!
//! Every key has a default, so the file is only needed to change the model,
//! browser geometry, or timing. Unknown keys are rejected to catch typos.
//!
//! ```yaml
//! model: gemini-2.5-flash
//! viewport_height: 1080
//! scroll_settle_ms: 750
//! ```

use crate::api::GatewayConfig;
use crate::capture::HeadlessOptions;
use crate::error::{GrabError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

/// Tunables read from the settings file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Model name passed to `generateContent`.
    pub model: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Enable the search tool for direct URL extraction.
    pub web_search: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Wait after each scroll before a headless screenshot.
    pub scroll_settle_ms: u64,
    /// Longest wait for a headless page's network to go idle.
    pub network_idle_timeout_ms: u64,
    /// Wait after starting a tab stream before grabbing its frame.
    pub tab_settle_ms: u64,
    pub jpeg_quality: u8,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            request_timeout_secs: 120,
            web_search: true,
            viewport_width: 1280,
            viewport_height: 800,
            scroll_settle_ms: 500,
            network_idle_timeout_ms: 5000,
            tab_settle_ms: 300,
            jpeg_quality: 80,
            chrome_executable: None,
        }
    }
}

impl Settings {
    /// Parse and sanity-check YAML settings.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let settings: Settings = if text.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| GrabError::Config(e.to_string()))?
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(GrabError::Config(format!(
                "jpeg_quality must be 0-100, got {}",
                self.jpeg_quality
            )));
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(GrabError::Config("viewport dimensions must be non-zero".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(GrabError::Config("request_timeout_secs must be non-zero".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(GrabError::Config("model must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn gateway_config(&self, api_key: String) -> GatewayConfig {
        GatewayConfig {
            api_key,
            model: self.model.clone(),
            base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn headless_options(&self) -> HeadlessOptions {
        HeadlessOptions {
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            scroll_settle: Duration::from_millis(self.scroll_settle_ms),
            network_idle_timeout: Duration::from_millis(self.network_idle_timeout_ms),
            jpeg_quality: self.jpeg_quality,
            chrome_executable: self.chrome_executable.clone(),
        }
    }

    pub fn tab_settle(&self) -> Duration {
        Duration::from_millis(self.tab_settle_ms)
    }
}

/// Load settings from `path`, or defaults when no path is given.
///
/// # Errors
///
/// [`GrabError::Config`] if the file cannot be read or is invalid.
#[instrument(level = "info")]
pub async fn load_settings(path: Option<&str>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| GrabError::Config(format!("cannot read {}: {}", path, e)))?;
    let settings = Settings::from_yaml(&text)?;
    info!(model = %settings.model, "Loaded settings");
    Ok(settings)
}
