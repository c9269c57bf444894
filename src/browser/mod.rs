//! Browser automation capability.
//!
//! Defines the `BrowserPage` and `BrowserDriver` traits the scrapers are
//! written against, the W3C WebDriver implementation, and the session /
//! page-context manager that hands out ready-to-use pages.

pub mod session;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod fake;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    DomContentLoaded,
    #[default]
    Load,
}

/// Text snapshot of one table-bearing container (a page section).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Text of the container's heading element, if any.
    pub heading: Option<String>,
    /// `thead` cell texts.
    pub header: Vec<String>,
    /// `tbody` rows, each as its cell texts.
    pub rows: Vec<Vec<String>>,
}

impl TableSnapshot {
    /// Index of the first header cell containing any of `needles`.
    pub fn column(&self, needles: &[&str]) -> Option<usize> {
        needles
            .iter()
            .find_map(|n| self.header.iter().position(|h| h.contains(n)))
    }
}

/// Fixed context parameters every page is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Origin the session artifact is restored against.
    pub base_url: String,
    pub browser_name: String,
    pub headless: bool,
    pub locale: String,
    pub timezone: String,
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub action_timeout: Duration,
    pub navigation_timeout: Duration,
}

impl ContextOptions {
    pub fn from_config(browser: &crate::config::BrowserConfig, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            browser_name: browser.browser_name.clone(),
            headless: browser.headless,
            locale: browser.locale.clone(),
            timezone: browser.timezone.clone(),
            user_agent: browser.user_agent.clone(),
            viewport: (browser.viewport_width, browser.viewport_height),
            action_timeout: browser.action_timeout(),
            navigation_timeout: browser.navigation_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted session artifact
// ---------------------------------------------------------------------------

/// Serialized authenticated session: cookie jar plus per-origin storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Seconds since epoch; `-1` for session cookies.
    #[serde(default = "default_expires")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_expires() -> f64 {
    -1.0
}

impl Cookie {
    /// Whether the cookie applies to `host` (domain-match, leading dot ok).
    pub fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A single automation-capable page bound to one browser context.
///
/// All element queries honour the default action timeout; navigations
/// honour the navigation timeout.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for `wait`.
    async fn goto(&self, url: &str, wait: WaitUntil) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Trimmed text of the first element matching `selector`.
    async fn text(&self, selector: &str) -> Result<Option<String>>;

    /// Trimmed text of every element matching `selector`.
    async fn texts(&self, selector: &str) -> Result<Vec<String>>;

    /// Attribute of the first element matching `selector`.
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Attribute of every element matching `selector` (`None` where absent).
    async fn attributes(&self, selector: &str, name: &str) -> Result<Vec<Option<String>>>;

    /// For every `row_selector` match, the texts of its `cell_selector`
    /// descendants.
    async fn query_rows(&self, row_selector: &str, cell_selector: &str) -> Result<Vec<Vec<String>>>;

    /// For every `container_selector` match, its heading and table text.
    async fn query_tables(
        &self,
        container_selector: &str,
        heading_selector: &str,
    ) -> Result<Vec<TableSnapshot>>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Select an `<option>` by value and fire `change`.
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    /// Wait until `selector` matches at least one element.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Evaluate a function body in the page; `arguments[i]` are `args`.
    /// A returned promise is awaited.
    async fn evaluate(&self, script: &str, args: Vec<serde_json::Value>) -> Result<serde_json::Value>;

    async fn set_content(&self, html: &str) -> Result<()>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Export the current cookies and storage of the page's origin.
    async fn storage_state(&self) -> Result<StorageState>;

    async fn set_default_timeout(&self, timeout: Duration) -> Result<()>;

    async fn set_navigation_timeout(&self, timeout: Duration) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Something that can open a fresh browser context + page.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_page(
        &self,
        options: &ContextOptions,
        state: Option<&StorageState>,
    ) -> Result<Box<dyn BrowserPage>>;
}
