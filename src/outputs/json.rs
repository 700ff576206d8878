//! JSON output for extracted articles.
//!
//! The file holds exactly the record printed to stdout, with the same
//! camelCase field names the HTTP API returns.

use crate::models::ArticleData;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write an [`ArticleData`] record as pretty-printed JSON.
///
/// Missing parent directories are created first.
///
/// # Arguments
///
/// * `article` - The extracted article
/// * `path` - Destination file, overwritten if it exists
///
/// # Returns
///
/// `Ok(())` on success, or an error if directory creation or file writing fails.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn write_article(article: &ArticleData, path: &str) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(article)?;

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        info!(dir = %parent.display(), "Ensuring JSON directory exists");
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!(title = %article.title, "Wrote article JSON");

    Ok(())
}
