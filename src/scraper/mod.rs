//! Scraping engine.
//!
//! Phase 1 (`global`) reads the default scope; Phase 2 (`group`) re-reads
//! the per-scope entities once per group behind a scope guard. The
//! `orchestrator` sequences both against a single page.

pub mod diagnostics;
pub mod extract;
pub mod global;
pub mod group;
pub mod mutation;
pub mod orchestrator;
pub mod pages;
pub mod refresh;

pub use diagnostics::capture_on_error;
pub use orchestrator::run_scrape;
pub use pages::Pages;

use chrono::{Local, NaiveDate};
use std::time::Duration;

use crate::config::ScraperConfig;

/// Runtime settings for one scrape.
#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub base_url: String,
    pub skip_refresh: bool,
    pub refresh_poll_interval: Duration,
    pub refresh_timeout: Duration,
    pub group_switch_timeout: Duration,
    /// "Today" for short-date year inference.
    pub reference_date: NaiveDate,
}

impl ScraperSettings {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            skip_refresh: config.skip_refresh,
            refresh_poll_interval: config.refresh_poll_interval(),
            refresh_timeout: config.refresh_timeout(),
            group_switch_timeout: config.group_switch_timeout(),
            reference_date: Local::now().date_naive(),
        }
    }

    pub fn pages(&self) -> Pages {
        Pages::new(&self.base_url)
    }
}
