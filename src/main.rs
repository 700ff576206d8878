//! # Article Grabber
//!
//! Pulls the title, body text, and lead image out of a news article page
//! using a multimodal model.
//!
//! ## Features
//!
//! - Asks the model to read the article straight from its URL (with web search)
//! - When the model cannot reach the page, offers a screenshot fallback:
//!   capture the page in headless Chromium (or grab the open tab of a running
//!   browser) and let the model read the article from the pixels
//! - Normalizes every answer into one `{title, textContent, imageUrl}` record
//! - Serves the screenshot pipeline over HTTP for other frontends
//!
//! ## Usage
//!
//! ```sh
//! export GEMINI_API_KEY=...
//! article_grabber grab https://example.com/news/story
//! article_grabber serve --listen 127.0.0.1:3001
//! ```
//!
//! ## Architecture
//!
//! 1. **Validation**: reject anything that is not an http(s) URL
//! 2. **Direct extraction**: one model call with the URL in the prompt
//! 3. **Fallback decision**: an "unable to directly access" answer offers screenshots
//! 4. **Capture**: scroll-and-screenshot, or a single tab frame
//! 5. **Image extraction**: one model call with every frame attached
//! 6. **Output**: JSON on stdout, optionally written to a file

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod capture;
mod cli;
mod config;
mod error;
mod extract;
mod models;
mod normalize;
mod orchestrator;
mod outputs;
mod prompts;
mod server;
mod utils;

use api::GeminiGateway;
use capture::{AnyCapture, CdpDisplaySource, HeadlessCapture, TabCapture};
use cli::{CaptureMode, Cli, Command, GrabArgs};
use config::Settings;
use orchestrator::{Orchestrator, Phase};
use outputs::json;
use server::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(config = ?args.config, "Parsed CLI arguments");

    let settings = config::load_settings(args.config.as_deref()).await?;
    let gateway = Arc::new(GeminiGateway::new(
        settings.gateway_config(args.api_key.clone()),
    )?);
    info!(model = %settings.model, "article_grabber starting up");

    match args.command {
        Command::Serve(serve) => {
            let state = AppState {
                gateway,
                capture: HeadlessCapture::new(settings.headless_options()),
            };
            server::serve(serve.listen, state).await?;
        }
        Command::Grab(grab) => {
            run_grab(grab, gateway, &settings).await?;
            let elapsed = start_time.elapsed();
            info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
        }
    }

    Ok(())
}

fn build_capture(args: &GrabArgs, settings: &Settings) -> AnyCapture {
    match args.capture {
        CaptureMode::Headless => AnyCapture::Headless(HeadlessCapture::new(settings.headless_options())),
        CaptureMode::Tab => {
            let mut source = CdpDisplaySource::new(args.debugger_url.clone());
            source.jpeg_quality = settings.jpeg_quality;
            AnyCapture::Tab(TabCapture::new(source, settings.tab_settle()))
        }
    }
}

/// Run one interactive extraction and print the result.
#[instrument(level = "info", skip_all, fields(url = %args.url))]
async fn run_grab(
    args: GrabArgs,
    gateway: Arc<GeminiGateway>,
    settings: &Settings,
) -> Result<(), Box<dyn Error>> {
    let capture = build_capture(&args, settings);
    let web_search = settings.web_search && !args.no_web_search;
    let orchestrator = Orchestrator::new(gateway, capture, web_search);

    let mut phase = orchestrator.grab(&args.url).await?;

    if let Phase::AwaitingFallbackChoice { diagnostic } = &phase {
        eprintln!("Direct extraction failed: {}", diagnostic);
        let accepted = args.yes || ask_yes_no("Capture screenshots of the page and try again? [y/N] ").await?;
        phase = if accepted {
            orchestrator.confirm_fallback().await?
        } else {
            orchestrator.decline_fallback()
        };
    }

    match phase {
        Phase::Done(article) => {
            println!("{}", serde_json::to_string_pretty(&article)?);
            if let Some(path) = args.json_output.as_deref() {
                json::write_article(&article, path).await?;
            }
            Ok(())
        }
        Phase::Failed(message) => Err(message.into()),
        Phase::Idle => {
            warn!("No article extracted");
            eprintln!("Cancelled.");
            Ok(())
        }
        other => Err(format!("extraction ended in unexpected state {:?}", other).into()),
    }
}

/// Prompt on stderr and read one answer from stdin.
async fn ask_yes_no(prompt: &str) -> std::io::Result<bool> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(prompt.as_bytes()).await?;
    stderr.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}
