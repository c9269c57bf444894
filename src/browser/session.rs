//! Session & page-context manager.
//!
//! Hands out pages bound to the fixed context parameters, optionally
//! pre-loaded with a persisted authenticated session. Nothing here creates
//! session state: the artifact is only read (the login flow writes it).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{BrowserDriver, BrowserPage, ContextOptions, StorageState};
use crate::types::ScrapeError;

/// Which persisted session, if any, to load into the new page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRequest {
    /// Explicit artifact path. Must exist.
    pub state_path: Option<PathBuf>,
    /// Reuse the default artifact when it exists.
    pub reuse_last: bool,
}

impl SessionRequest {
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: Some(path.into()),
            reuse_last: false,
        }
    }

    pub fn reuse_last() -> Self {
        Self {
            state_path: None,
            reuse_last: true,
        }
    }

    /// No persisted session: an unauthenticated page.
    pub fn fresh() -> Self {
        Self::default()
    }
}

/// An opened page plus where its session came from.
pub struct Session {
    pub page: Box<dyn BrowserPage>,
    /// Artifact the page was restored from; `None` for a fresh page.
    pub restored_from: Option<PathBuf>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.restored_from.is_some()
    }
}

pub struct SessionManager {
    driver: Box<dyn BrowserDriver>,
    options: ContextOptions,
    default_state_path: PathBuf,
}

impl SessionManager {
    pub fn new(
        driver: Box<dyn BrowserDriver>,
        options: ContextOptions,
        default_state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            driver,
            options,
            default_state_path: default_state_path.into(),
        }
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn default_state_path(&self) -> &Path {
        &self.default_state_path
    }

    /// Resolve the artifact to load: explicit path, then the default one if
    /// reuse was requested and it exists, else none.
    pub fn resolve_state_path(&self, request: &SessionRequest) -> Result<Option<PathBuf>> {
        if let Some(path) = &request.state_path {
            if !path.exists() {
                return Err(ScrapeError::SessionState {
                    path: path.display().to_string(),
                    message: "session state file does not exist".into(),
                }
                .into());
            }
            return Ok(Some(path.clone()));
        }

        if request.reuse_last && self.default_state_path.exists() {
            return Ok(Some(self.default_state_path.clone()));
        }

        Ok(None)
    }

    /// Open a ready page with default action and navigation timeouts set.
    pub async fn open(&self, request: &SessionRequest) -> Result<Session> {
        let state_path = self.resolve_state_path(request)?;
        let state = match &state_path {
            Some(path) => Some(load_state(path)?),
            None => None,
        };

        let page = self
            .driver
            .new_page(&self.options, state.as_ref())
            .await
            .context("Failed to open browser page")?;

        page.set_default_timeout(self.options.action_timeout).await?;
        page.set_navigation_timeout(self.options.navigation_timeout)
            .await?;

        match &state_path {
            Some(path) => info!(path = %path.display(), "Page opened with persisted session"),
            None => info!("Page opened without a persisted session"),
        }

        Ok(Session {
            page,
            restored_from: state_path,
        })
    }
}

/// Read a session artifact.
pub fn load_state(path: &Path) -> Result<StorageState> {
    let json = std::fs::read_to_string(path).map_err(|e| ScrapeError::SessionState {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let state: StorageState = serde_json::from_str(&json).map_err(|e| ScrapeError::SessionState {
        path: path.display().to_string(),
        message: format!("invalid session state: {e}"),
    })?;
    debug!(
        path = %path.display(),
        cookies = state.cookies.len(),
        origins = state.origins.len(),
        "Session state loaded"
    );
    Ok(state)
}

/// Write a session artifact, creating the data directory if needed.
pub fn save_state(path: &Path, state: &StorageState) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(state).context("Failed to serialise session state")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write session state to {}", path.display()))?;
    info!(path = %path.display(), cookies = state.cookies.len(), "Session state saved");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
