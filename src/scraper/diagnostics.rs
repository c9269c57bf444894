//! Screenshot-on-failure wrapper.

use anyhow::{Context, Result};
use chrono::Local;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::browser::BrowserPage;

/// Write a PNG of the current page into `dir` as `error-<timestamp>.png`.
pub async fn capture_screenshot(page: &dyn BrowserPage, dir: &Path) -> Result<PathBuf> {
    let png = page.screenshot().await.context("Failed to take screenshot")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create screenshot dir {}", dir.display()))?;
    let path = dir.join(format!("error-{}.png", Local::now().format("%Y%m%d-%H%M%S%.3f")));
    std::fs::write(&path, png)
        .with_context(|| format!("Failed to write screenshot {}", path.display()))?;
    Ok(path)
}

/// Await `work`; if it fails, capture the page (while it is still open)
/// and return the original error unchanged. Capture problems are only
/// logged.
pub async fn capture_on_error<T, Fut>(
    page: &dyn BrowserPage,
    dir: Option<&Path>,
    work: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let err = match work.await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };
    error!(error = %format!("{err:#}"), "Scrape failed");

    if let Some(dir) = dir {
        match capture_screenshot(page, dir).await {
            Ok(path) => info!(path = %path.display(), "Diagnostic screenshot saved"),
            Err(e) => warn!(error = %e, "Diagnostic screenshot not captured"),
        }
    }
    Err(err)
}
