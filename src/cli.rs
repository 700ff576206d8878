//! Command-line interface definitions.
//!
//! Two subcommands: `grab` runs the interactive extraction workflow for one
//! URL, `serve` exposes the screenshot pipeline over HTTP. The API key and
//! most options can also come from environment variables (or a `.env` file).

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;

/// Command-line arguments for the article grabber.
///
/// # Examples
///
/// ```sh
/// # Extract one article, prompting before any screenshot fallback
/// article_grabber grab https://example.com/news/story
///
/// # Accept the fallback automatically and save the result
/// article_grabber grab https://example.com/news/story --yes -j story.json
///
/// # Capture the tab of an already running Chrome instead of a headless one
/// article_grabber grab https://example.com/news/story --capture tab
///
/// # HTTP API on port 3001
/// article_grabber serve
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Optional path to a settings YAML file
    #[arg(short, long, env = "ARTICLE_GRABBER_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract one article, offering a screenshot fallback if direct access fails
    Grab(GrabArgs),
    /// Serve the HTTP API
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct GrabArgs {
    /// Article URL (http or https)
    pub url: String,

    /// How to capture the page for the screenshot fallback
    #[arg(long, value_enum, default_value_t = CaptureMode::Headless)]
    pub capture: CaptureMode,

    /// DevTools endpoint of the browser to capture with `--capture tab`
    #[arg(long, default_value = "http://127.0.0.1:9222")]
    pub debugger_url: String,

    /// Accept the screenshot fallback without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Also write the extracted article to this JSON file
    #[arg(short, long)]
    pub json_output: Option<String>,

    /// Do not let the model use web search during direct extraction
    #[arg(long)]
    pub no_web_search: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, env = "ARTICLE_GRABBER_LISTEN", default_value = "127.0.0.1:3001")]
    pub listen: SocketAddr,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureMode {
    /// Launch headless Chromium and scroll through the page
    Headless,
    /// Grab one frame of the matching tab in a running browser
    Tab,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grab_defaults() {
        let cli = Cli::parse_from(["article_grabber", "--api-key", "k", "grab", "https://x.com/a"]);

        assert_eq!(cli.api_key, "k");
        match cli.command {
            Command::Grab(args) => {
                assert_eq!(args.url, "https://x.com/a");
                assert_eq!(args.capture, CaptureMode::Headless);
                assert_eq!(args.debugger_url, "http://127.0.0.1:9222");
                assert!(!args.yes);
                assert!(!args.no_web_search);
                assert!(args.json_output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_grab_short_flags() {
        let cli = Cli::parse_from([
            "article_grabber",
            "--api-key",
            "k",
            "-c",
            "settings.yaml",
            "grab",
            "https://x.com/a",
            "-y",
            "-j",
            "/tmp/out.json",
            "--capture",
            "tab",
        ]);

        assert_eq!(cli.config.as_deref(), Some("settings.yaml"));
        match cli.command {
            Command::Grab(args) => {
                assert!(args.yes);
                assert_eq!(args.json_output.as_deref(), Some("/tmp/out.json"));
                assert_eq!(args.capture, CaptureMode::Tab);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_serve_listen() {
        let cli = Cli::parse_from([
            "article_grabber",
            "--api-key",
            "k",
            "serve",
            "--listen",
            "0.0.0.0:8080",
        ]);
        match cli.command {
            Command::Serve(args) => assert_eq!(args.listen.port(), 8080),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_invalid_capture_mode_rejected() {
        let result = Cli::try_parse_from([
            "article_grabber",
            "--api-key",
            "k",
            "grab",
            "https://x.com",
            "--capture",
            "webcam",
        ]);
        assert!(result.is_err());
    }
}
