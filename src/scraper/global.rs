//! Phase 1: everything read under the default scope.
//!
//! No sub-scrape is caught here. Global data underpins every group-scoped
//! number, so the first failure aborts the run.

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::extract::{scrape_accounts, scrape_cash_flow, scrape_liabilities, scrape_portfolio};
use super::refresh::RefreshPoller;
use super::ScraperSettings;
use crate::browser::BrowserPage;
use crate::parser::TextNormalizer;
use crate::types::GlobalData;

pub async fn scrape_global(
    page: &dyn BrowserPage,
    settings: &ScraperSettings,
    n: &mut TextNormalizer,
) -> Result<GlobalData> {
    let pages = settings.pages();

    let refresh_issues = if settings.skip_refresh {
        info!("Account refresh skipped");
        Vec::new()
    } else {
        let poller = RefreshPoller::new(
            settings.refresh_poll_interval,
            settings.refresh_timeout,
            settings.reference_date,
        );
        poller
            .trigger(page, &pages)
            .await
            .context("Failed to request account refresh")?;
        poller.settle(page, &pages).await?.issues
    };

    let accounts = scrape_accounts(page, &pages, settings.reference_date, n)
        .await
        .context("Failed to scrape accounts")?;
    let portfolio = scrape_portfolio(page, &pages, n)
        .await
        .context("Failed to scrape portfolio")?;
    let liabilities = scrape_liabilities(page, &pages, n)
        .await
        .context("Failed to scrape liabilities")?;
    let cash_flow = scrape_cash_flow(page, &pages, settings.reference_date, n)
        .await
        .context("Failed to scrape cash flow")?;

    for (category, total) in portfolio.totals_by_category() {
        debug!(category = %category, total, "Portfolio category total");
    }

    info!(
        accounts = accounts.len(),
        holdings = portfolio.items.len(),
        total_assets = portfolio.total,
        liabilities = liabilities.total,
        transactions = cash_flow.items.len(),
        refresh_issues = refresh_issues.len(),
        "Global phase complete"
    );

    Ok(GlobalData {
        accounts,
        portfolio,
        liabilities,
        cash_flow,
        refresh_issues,
    })
}
