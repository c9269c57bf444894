//! Result hand-off.
//!
//! Writes the finished `ScrapeResult` to a JSON file for whatever consumes
//! it downstream. The write goes through a sibling temp file and a rename
//! so readers never see a half-written result.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::types::ScrapeResult;

/// Save a scrape result as pretty JSON, creating parent directories.
pub fn save_result(result: &ScrapeResult, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(result).context("Failed to serialise scrape result")?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)
        .with_context(|| format!("Failed to write result to {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move result into {}", path.display()))?;

    info!(
        path = %path.display(),
        run_id = %result.run_id,
        groups = result.group_data_list.len(),
        bytes = json.len(),
        "Result saved"
    );
    Ok(())
}

/// Load a previously saved result. `None` if the file doesn't exist.
pub fn load_result(path: &Path) -> Result<Option<ScrapeResult>> {
    if !path.exists() {
        debug!(path = %path.display(), "No saved result");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read result from {}", path.display()))?;
    let result: ScrapeResult = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse result from {}", path.display()))?;

    debug!(
        path = %path.display(),
        run_id = %result.run_id,
        scraped_at = %result.scraped_at,
        "Result loaded"
    );
    Ok(Some(result))
}

/// Delete a saved result; a missing file is fine.
pub fn delete_result(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete result file {}", path.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
