//! Phase 2: per-group scraping behind a revertible scope switch.
//!
//! Switching the group changes what every view shows for the whole
//! session, so each switch is paired with a revert that runs on every exit
//! path of the scoped work (success, error and panic).

use anyhow::{Context, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::extract::{
    scrape_accounts, scrape_asset_history, scrape_monthly_summary, scrape_portfolio, GroupListing,
};
use super::pages::{selectors as sel, Pages};
use super::ScraperSettings;
use crate::browser::{BrowserPage, WaitUntil};
use crate::parser::TextNormalizer;
use crate::types::{Group, GroupData, ScrapeError};

const SWITCH_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Reads and changes the session's current group.
pub struct GroupScope<'a> {
    page: &'a dyn BrowserPage,
    pages: &'a Pages,
    timeout: Duration,
}

impl<'a> GroupScope<'a> {
    pub fn new(page: &'a dyn BrowserPage, pages: &'a Pages, timeout: Duration) -> Self {
        Self {
            page,
            pages,
            timeout,
        }
    }

    /// Value of the selected option, if any.
    pub async fn current(&self) -> Result<Option<String>> {
        self.page.attribute(sel::GROUP_SELECTED, "value").await
    }

    /// Select `group_id` and wait until the view reflects it.
    pub async fn switch_to(&self, group_id: &str) -> Result<()> {
        let scope_err = |message: String| ScrapeError::ScopeSwitch {
            group_id: group_id.to_string(),
            message,
        };

        self.page
            .goto(&self.pages.accounts(), WaitUntil::DomContentLoaded)
            .await?;
        self.page
            .select_option(sel::GROUP_SELECT, group_id)
            .await
            .map_err(|e| scope_err(e.to_string()))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let current = self.current().await?;
            if current.as_deref() == Some(group_id) {
                debug!(group_id, "Group scope switched");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(scope_err(format!(
                    "view still shows {:?} after {}ms",
                    current,
                    self.timeout.as_millis()
                ))
                .into());
            }
            tokio::time::sleep(SWITCH_POLL_INTERVAL).await;
        }
    }

    async fn revert_logged(&self, original: &str) {
        if let Err(e) = self.switch_to(original).await {
            warn!(group_id = original, error = %e, "Failed to restore group scope");
        }
    }

    /// Run `body` with `target` as the current group, then restore
    /// `original` whatever the outcome.
    ///
    /// A failed switch is returned after a best-effort revert. A failed
    /// revert is logged when `body` already failed (the body's error wins)
    /// and returned when `body` succeeded.
    pub async fn with_scope<T, F, Fut>(&self, original: &str, target: &str, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if target == original {
            return body().await;
        }

        if let Err(e) = self.switch_to(target).await {
            self.revert_logged(original).await;
            return Err(e);
        }

        let outcome = AssertUnwindSafe(body()).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => {
                self.switch_to(original)
                    .await
                    .with_context(|| format!("Failed to restore group scope {original}"))?;
                Ok(value)
            }
            Ok(Err(e)) => {
                self.revert_logged(original).await;
                Err(e)
            }
            Err(panic) => {
                self.revert_logged(original).await;
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Per-scope entities for the currently selected group.
pub async fn scrape_group(
    page: &dyn BrowserPage,
    pages: &Pages,
    settings: &ScraperSettings,
    group: &Group,
    n: &mut TextNormalizer,
) -> Result<GroupData> {
    let accounts = scrape_accounts(page, pages, settings.reference_date, n).await?;
    let asset_history = scrape_asset_history(page, pages, settings.reference_date, n).await?;
    let monthly_summary = scrape_monthly_summary(page, pages, n).await?;
    let portfolio = scrape_portfolio(page, pages, n).await?;

    info!(
        group = %group,
        accounts = accounts.len(),
        history_points = asset_history.len(),
        months = monthly_summary.len(),
        "Group scraped"
    );

    Ok(GroupData {
        group: group.clone(),
        accounts,
        asset_history,
        monthly_summary,
        portfolio,
    })
}

/// Scrape every listed group, the pseudo-group included, restoring the
/// original scope after each one.
pub async fn scrape_all_groups(
    page: &dyn BrowserPage,
    settings: &ScraperSettings,
    listing: &GroupListing,
    n: &mut TextNormalizer,
) -> Result<Vec<GroupData>> {
    let pages = settings.pages();
    let scope = GroupScope::new(page, &pages, settings.group_switch_timeout);
    let original = listing.current_id().to_string();

    let mut results = Vec::with_capacity(listing.groups.len());
    for group in &listing.groups {
        let pages = &pages;
        let n: &mut TextNormalizer = &mut *n;
        let data = scope
            .with_scope(&original, &group.id, move || {
                scrape_group(page, pages, settings, group, n)
            })
            .await
            .with_context(|| format!("Failed to scrape group {group}"))?;
        results.push(data);
    }
    Ok(results)
}
