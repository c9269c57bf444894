//! HARVESTER — group-aware household-finance scraper
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! a browser page (reusing the persisted session or signing in), runs one
//! scrape and hands the result off as JSON.

use anyhow::Result;
use tracing::{error, info, warn};

use harvester::browser::session::{SessionManager, SessionRequest};
use harvester::browser::webdriver::WebDriverClient;
use harvester::browser::{BrowserPage, ContextOptions};
use harvester::config;
use harvester::credentials::{EnvCredentialProvider, RunContext};
use harvester::login;
use harvester::scraper::{capture_on_error, run_scrape, ScraperSettings};
use harvester::storage;
use harvester::types::ScrapeError;

const BANNER: &str = r#"
 _   _    _    ____  __     _______ ____ _____ _____ ____
| | | |  / \  |  _ \ \ \   / / ____/ ___|_   _| ____|  _ \
| |_| | / _ \ | |_) | \ \ / /|  _| \___ \ | | |  _| | |_) |
|  _  |/ ___ \|  _ <   \ V / | |___ ___) || | | |___|  _ <
|_| |_/_/   \_\_| \_\   \_/  |_____|____/ |_| |_____|_| \_\

  Group-aware household-finance scraper
  v0.1.0
"#;

/// Exit status for configuration problems.
const EXIT_CONFIG: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("HARVESTER_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = match config::AppConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e:#}");
            if matches!(e.downcast_ref::<ScrapeError>(), Some(ScrapeError::Config(_))) {
                std::process::exit(EXIT_CONFIG);
            }
            return Err(e);
        }
    };

    init_logging();

    println!("{BANNER}");
    info!(
        base_url = %cfg.scraper.base_url,
        webdriver = %cfg.browser.webdriver_url,
        skip_refresh = cfg.scraper.skip_refresh,
        "HARVESTER starting up"
    );

    let ctx = RunContext::new(cfg, Box::new(EnvCredentialProvider::new()));
    let settings = ScraperSettings::from_config(&ctx.config.scraper);

    // -- Open the page -----------------------------------------------------

    let driver = WebDriverClient::new(&ctx.config.browser.webdriver_url)?;
    let options = ContextOptions::from_config(&ctx.config.browser, &settings.base_url);
    let manager = SessionManager::new(Box::new(driver), options, ctx.config.session_state_path());

    let request = if ctx.config.session.reuse_last {
        SessionRequest::reuse_last()
    } else {
        SessionRequest::fresh()
    };
    let session = manager.open(&request).await?;
    let page: &dyn BrowserPage = session.page.as_ref();

    // The run is never cancelled from outside; group scopes must revert.
    let outcome = run(&ctx, &settings, &manager, page, session.is_authenticated()).await;

    if let Err(e) = page.close().await {
        warn!(error = %e, "Failed to close browser session");
    }

    match outcome {
        Ok(()) => {
            info!(run_id = %ctx.run_id, "HARVESTER finished cleanly.");
            Ok(())
        }
        Err(e) => {
            error!(run_id = %ctx.run_id, error = %format!("{e:#}"), "HARVESTER run failed");
            if matches!(e.downcast_ref::<ScrapeError>(), Some(ScrapeError::Config(_))) {
                std::process::exit(EXIT_CONFIG);
            }
            Err(e)
        }
    }
}

/// Sign in if needed, scrape, and write the result.
async fn run(
    ctx: &RunContext,
    settings: &ScraperSettings,
    manager: &SessionManager,
    page: &dyn BrowserPage,
    authenticated: bool,
) -> Result<()> {
    if !authenticated {
        info!("No reusable session, signing in");
        let credentials = ctx.resolve_credentials().await?;
        login::refresh_session(
            page,
            &credentials,
            &settings.pages().sign_in(),
            manager.default_state_path(),
        )
        .await?;
    }

    let screenshot_dir = ctx.config.scraper.screenshot_dir.as_deref();
    let result = capture_on_error(page, screenshot_dir, run_scrape(page, settings, ctx.run_id)).await?;

    storage::save_result(&result, &ctx.config.scraper.output_path)?;

    info!(
        accounts = result.global_data.accounts.len(),
        groups = result.group_data_list.len(),
        refresh_issues = result.global_data.refresh_issues.len(),
        income = result.global_data.cash_flow.income,
        expense = result.global_data.cash_flow.expense,
        degraded_parses = result.degraded_parses,
        "Run complete"
    );
    for issue in &result.global_data.refresh_issues {
        warn!(issue = %issue, "Account did not finish refreshing");
    }
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("harvester=info"));

    let json_logging = std::env::var("HARVESTER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
