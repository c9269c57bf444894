//! Credential resolution and the per-run context.
//!
//! The scraper never owns secrets: it asks a `CredentialProvider` to
//! resolve the configured secret path. The default provider reads the
//! environment (populated from `.env`) and derives the one-time code from a
//! base32 TOTP seed.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::types::ScrapeError;

/// Resolved login material.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
    /// Current time-based one-time code, when the account uses one.
    pub one_time_code: Option<String>,
}

/// Resolves login material by secret path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Missing required values are a fatal `ScrapeError::Config`.
    async fn resolve(&self, path: &str) -> Result<Credentials>;
}

// ---------------------------------------------------------------------------
// Environment provider
// ---------------------------------------------------------------------------

/// Reads `<PATH>_USERNAME`, `<PATH>_PASSWORD` and optionally
/// `<PATH>_TOTP_SECRET`, where `<PATH>` is the secret path upper-cased with
/// non-alphanumerics replaced by `_` (`moneyforward/main` → `MONEYFORWARD_MAIN`).
#[derive(Debug, Default)]
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self
    }

    fn env_prefix(path: &str) -> String {
        path.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn required(name: &str) -> Result<String> {
        match std::env::var(name) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ScrapeError::Config(format!("Environment variable not set: {name}")).into()),
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(&self, path: &str) -> Result<Credentials> {
        let prefix = Self::env_prefix(path);
        let username = Self::required(&format!("{prefix}_USERNAME"))?;
        let password = Self::required(&format!("{prefix}_PASSWORD"))?;

        let one_time_code = match std::env::var(format!("{prefix}_TOTP_SECRET")) {
            Ok(seed) if !seed.trim().is_empty() => Some(current_code(&seed)?),
            _ => None,
        };

        debug!(path, has_otp = one_time_code.is_some(), "Credentials resolved");

        Ok(Credentials {
            username,
            password: SecretString::new(password),
            one_time_code,
        })
    }
}

fn totp(seed: &str) -> Result<TOTP> {
    let bytes = Secret::Encoded(seed.trim().replace(' ', "").to_uppercase())
        .to_bytes()
        .map_err(|e| ScrapeError::Config(format!("Invalid TOTP secret: {e:?}")))?;
    if bytes.is_empty() {
        return Err(ScrapeError::Config("TOTP secret is empty".into()).into());
    }
    // Issuers commonly hand out 80-bit seeds; the length is not enforced.
    Ok(TOTP::new_unchecked(Algorithm::SHA1, 6, 1, 30, bytes))
}

/// 6-digit / 30 s code for `seed` (base32) at `unix_time`.
pub fn code_at(seed: &str, unix_time: u64) -> Result<String> {
    Ok(totp(seed)?.generate(unix_time))
}

fn current_code(seed: &str) -> Result<String> {
    let totp = totp(seed)?;
    totp.generate_current()
        .map_err(|e| ScrapeError::Config(format!("System clock error: {e}")).into())
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Everything one orchestration run shares: configuration, the credential
/// provider and the run id. Built once per run and passed down.
pub struct RunContext {
    pub config: AppConfig,
    pub credentials: Box<dyn CredentialProvider>,
    pub run_id: Uuid,
}

impl RunContext {
    pub fn new(config: AppConfig, credentials: Box<dyn CredentialProvider>) -> Self {
        Self {
            config,
            credentials,
            run_id: Uuid::new_v4(),
        }
    }

    /// Resolve the credentials configured under `[credentials]`.
    pub async fn resolve_credentials(&self) -> Result<Credentials> {
        self.credentials
            .resolve(&self.config.credentials.secret_path)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
