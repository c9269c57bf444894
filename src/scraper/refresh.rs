//! Refresh-status poller.
//!
//! After a refresh is requested the host re-fetches every linked account in
//! the background; the registry marks those still in flight `更新中`. The
//! poller waits (`Pending`) until none are left (`Settled`) or its deadline
//! passes, in which case the stragglers are reported instead of failing.

use anyhow::Result;
use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::extract::{account_from_row, count_updating, status_cells};
use super::pages::{selectors as sel, Pages};
use crate::browser::{BrowserPage, WaitUntil};
use crate::parser::TextNormalizer;
use crate::types::AccountIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Pending { updating: usize },
    Settled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    /// Status re-reads after the initial one.
    pub polls: u32,
    pub timed_out: bool,
    /// Non-normal accounts at the deadline; empty unless `timed_out`.
    pub issues: Vec<AccountIssue>,
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshPoller {
    interval: Duration,
    timeout: Duration,
    /// Date the registry's short sync dates are read against.
    reference: NaiveDate,
}

impl RefreshPoller {
    pub fn new(interval: Duration, timeout: Duration, reference: NaiveDate) -> Self {
        Self {
            interval,
            timeout,
            reference,
        }
    }

    /// Issues for every non-normal account on the last registry read.
    /// Parse fallbacks here are not counted; Phase 1 re-reads the registry.
    fn issues(&self, rows: &[Vec<String>]) -> Vec<AccountIssue> {
        let mut scratch = TextNormalizer::new();
        rows.iter()
            .filter_map(|r| account_from_row(r, self.reference, &mut scratch))
            .filter_map(|account| account.issue())
            .collect()
    }

    /// Click the refresh-all control on the registry view, if it is there.
    pub async fn trigger(&self, page: &dyn BrowserPage, pages: &Pages) -> Result<bool> {
        page.goto(&pages.accounts(), WaitUntil::Load).await?;
        if page.texts(sel::REFRESH_ALL).await?.is_empty() {
            debug!("No refresh-all control on the account registry");
            return Ok(false);
        }
        page.click(sel::REFRESH_ALL).await?;
        info!("Account refresh requested");
        Ok(true)
    }

    /// Re-read the registry and count accounts whose status is exactly
    /// `更新中`.
    async fn read(&self, page: &dyn BrowserPage, pages: &Pages) -> Result<(RefreshState, Vec<Vec<String>>)> {
        page.goto(&pages.accounts(), WaitUntil::Load).await?;
        let rows = page.query_rows(sel::ACCOUNT_ROWS, sel::ACCOUNT_CELLS).await?;
        let updating = count_updating(&status_cells(&rows));
        let state = if updating == 0 {
            RefreshState::Settled
        } else {
            RefreshState::Pending { updating }
        };
        Ok((state, rows))
    }

    /// Wait for the background refresh to finish.
    pub async fn settle(&self, page: &dyn BrowserPage, pages: &Pages) -> Result<RefreshOutcome> {
        let deadline = Instant::now() + self.timeout;
        let mut polls = 0u32;

        let (mut state, mut rows) = self.read(page, pages).await?;
        while let RefreshState::Pending { updating } = state {
            if Instant::now() >= deadline {
                let issues = self.issues(&rows);
                warn!(
                    updating,
                    issues = issues.len(),
                    timeout_secs = self.timeout.as_secs(),
                    "Account refresh did not settle before the deadline"
                );
                return Ok(RefreshOutcome {
                    polls,
                    timed_out: true,
                    issues,
                });
            }
            debug!(updating, poll = polls, "Waiting for account refresh");
            tokio::time::sleep(self.interval).await;
            (state, rows) = self.read(page, pages).await?;
            polls += 1;
        }

        info!(polls, "Account refresh settled");
        Ok(RefreshOutcome {
            polls,
            timed_out: false,
            issues: Vec::new(),
        })
    }
}
