//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Credentials are never stored here; `[credentials].secret_path` names the
//! entry the credential provider resolves at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::ScrapeError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub session: SessionConfig,
    pub scraper: ScraperConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    #[serde(default = "default_browser_name")]
    pub browser_name: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Reuse the last persisted session if one exists.
    #[serde(default = "default_true")]
    pub reuse_last: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScraperConfig {
    pub base_url: String,
    #[serde(default)]
    pub skip_refresh: bool,
    #[serde(default = "default_poll_interval")]
    pub refresh_poll_interval_secs: u64,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    #[serde(default = "default_group_switch_timeout")]
    pub group_switch_timeout_secs: u64,
    pub screenshot_dir: Option<PathBuf>,
    pub output_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    pub secret_path: String,
}

fn default_browser_name() -> String {
    "chrome".to_string()
}
fn default_true() -> bool {
    true
}
fn default_locale() -> String {
    "ja-JP".to_string()
}
fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36".to_string()
}
fn default_viewport_width() -> u32 {
    1280
}
fn default_viewport_height() -> u32 {
    800
}
fn default_action_timeout() -> u64 {
    30
}
fn default_navigation_timeout() -> u64 {
    60
}
fn default_state_file() -> String {
    "storage_state.json".to_string()
}
fn default_poll_interval() -> u64 {
    5
}
fn default_refresh_timeout() -> u64 {
    300
}
fn default_group_switch_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ScrapeError::Config(format!("Failed to read config file {path}: {e}"))
        })?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).map_err(|e| ScrapeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scraper.base_url.trim().is_empty() {
            return Err(ScrapeError::Config("scraper.base_url is empty".into()).into());
        }
        if self.browser.webdriver_url.trim().is_empty() {
            return Err(ScrapeError::Config("browser.webdriver_url is empty".into()).into());
        }
        if self.scraper.refresh_poll_interval_secs == 0 {
            return Err(
                ScrapeError::Config("scraper.refresh_poll_interval_secs must be > 0".into()).into(),
            );
        }
        if self.credentials.secret_path.trim().is_empty() {
            return Err(ScrapeError::Config("credentials.secret_path is empty".into()).into());
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name).map_err(|_| {
            ScrapeError::Config(format!("Environment variable not set: {env_name}")).into()
        })
    }

    /// Default location of the persisted session artifact.
    pub fn session_state_path(&self) -> PathBuf {
        self.session.data_dir.join(&self.session.state_file)
    }
}

impl BrowserConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

impl ScraperConfig {
    pub fn refresh_poll_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_poll_interval_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn group_switch_timeout(&self) -> Duration {
        Duration::from_secs(self.group_switch_timeout_secs)
    }
}
