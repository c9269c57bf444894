//! Top-level run: groups at start, Phase 1, Phase 2, result assembly.
//!
//! Everything runs sequentially against one page. The run is wrapped in a
//! span carrying its `run_id`.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::extract::read_groups;
use super::global::scrape_global;
use super::group::scrape_all_groups;
use super::ScraperSettings;
use crate::browser::BrowserPage;
use crate::parser::TextNormalizer;
use crate::types::ScrapeResult;

/// Scrape everything once and assemble the result.
///
/// Fails fast on Phase 1 errors and on group scope-switch errors; refresh
/// stragglers and unparsable cells only show up in the returned data.
pub async fn run_scrape(
    page: &dyn BrowserPage,
    settings: &ScraperSettings,
    run_id: Uuid,
) -> Result<ScrapeResult> {
    let span = info_span!("scrape", run_id = %run_id);
    async move {
        info!(base_url = %settings.base_url, "Scrape started");
        let mut normalizer = TextNormalizer::new();
        let pages = settings.pages();

        let listing = read_groups(page, &pages)
            .await
            .context("Failed to read group selector")?;

        let global_data = scrape_global(page, settings, &mut normalizer).await?;

        let group_data_list = scrape_all_groups(page, settings, &listing, &mut normalizer).await?;

        let result = ScrapeResult {
            run_id,
            scraped_at: Utc::now(),
            global_data,
            group_data_list,
            default_group: listing.default_group,
            degraded_parses: normalizer.degraded(),
        };

        let warnings = result.check_consistency();
        for warning in &warnings {
            warn!(warning = %warning, "Consistency check failed");
        }

        info!(
            groups = result.group_data_list.len(),
            accounts = result.global_data.accounts.len(),
            refresh_issues = result.global_data.refresh_issues.len(),
            degraded_parses = result.degraded_parses,
            warnings = warnings.len(),
            "Scrape complete"
        );
        Ok(result)
    }
    .instrument(span)
    .await
}
