//! Interactive sign-in producing the persisted session artifact.
//!
//! Only the binary calls this, and only when there is no session to reuse.
//! The scrapers themselves never sign in.

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::session::save_state;
use crate::browser::{BrowserPage, StorageState, WaitUntil};
use crate::credentials::Credentials;
use crate::scraper::pages::selectors as sel;
use crate::types::ScrapeError;

/// How long to wait for the signed-in view after the last submit.
const SIGNED_IN_TIMEOUT: Duration = Duration::from_secs(60);

async fn otp_prompted(page: &dyn BrowserPage) -> Result<bool> {
    let inputs = page.attributes(sel::OTP_INPUT, "name").await?;
    Ok(!inputs.is_empty())
}

/// Sign in on `sign_in_url` and return the resulting session state.
///
/// A one-time-code prompt without a code in `credentials` is a
/// configuration error.
pub async fn sign_in(
    page: &dyn BrowserPage,
    credentials: &Credentials,
    sign_in_url: &str,
) -> Result<StorageState> {
    info!(url = sign_in_url, user = %credentials.username, "Signing in");
    page.goto(sign_in_url, WaitUntil::Load).await?;

    page.fill(sel::SIGN_IN_EMAIL, &credentials.username).await?;
    page.fill(sel::SIGN_IN_PASSWORD, credentials.password.expose_secret())
        .await?;
    page.click(sel::SIGN_IN_SUBMIT)
        .await
        .context("Failed to submit sign-in form")?;
    page.wait_for(sel::SIGN_IN_NEXT, SIGNED_IN_TIMEOUT)
        .await
        .context("Neither a one-time-code prompt nor the signed-in view appeared")?;

    if otp_prompted(page).await? {
        let code = credentials.one_time_code.as_deref().ok_or_else(|| {
            ScrapeError::Config("Sign-in asked for a one-time code but no TOTP secret is set".into())
        })?;
        page.fill(sel::OTP_INPUT, code).await?;
        page.click(sel::OTP_SUBMIT)
            .await
            .context("Failed to submit one-time code")?;
    }

    page.wait_for(sel::SIGNED_IN_MARKER, SIGNED_IN_TIMEOUT)
        .await
        .context("Signed-in view did not appear")?;

    let state = page.storage_state().await?;
    if state.cookies.is_empty() {
        warn!("Signed in but the session carries no cookies");
    }
    info!(cookies = state.cookies.len(), "Signed in");
    Ok(state)
}

/// Sign in and persist the session to `state_path`.
pub async fn refresh_session(
    page: &dyn BrowserPage,
    credentials: &Credentials,
    sign_in_url: &str,
    state_path: &Path,
) -> Result<StorageState> {
    let state = sign_in(page, credentials, sign_in_url).await?;
    save_state(state_path, &state)?;
    Ok(state)
}
