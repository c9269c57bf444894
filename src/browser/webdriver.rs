//! W3C WebDriver implementation of the browser capability.
//!
//! Talks JSON over HTTP to chromedriver / geckodriver (or a Selenium grid).
//! Element reads are done in one `execute/sync` round-trip per query rather
//! than one request per element.
//!
//! Protocol: https://www.w3.org/TR/webdriver2/
//! Chromium-only extras go through `/goog/cdp/execute` and are best effort.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    BrowserDriver, BrowserPage, ContextOptions, Cookie, OriginState, StorageEntry, StorageState,
    TableSnapshot, WaitUntil,
};
use crate::types::ScrapeError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4a4b8c9d0e6f";

/// How often element/readiness waits re-check.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on a single HTTP exchange with the driver; page-level
/// timeouts are enforced by the driver itself.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

const TEXT_SCRIPT: &str = "const el = document.querySelector(arguments[0]); \
     return el ? el.innerText.trim() : null;";

const TEXTS_SCRIPT: &str =
    "return Array.from(document.querySelectorAll(arguments[0]), el => el.innerText.trim());";

const ATTRIBUTE_SCRIPT: &str = "const el = document.querySelector(arguments[0]); \
     return el ? el.getAttribute(arguments[1]) : null;";

const ATTRIBUTES_SCRIPT: &str =
    "return Array.from(document.querySelectorAll(arguments[0]), el => el.getAttribute(arguments[1]));";

const ROWS_SCRIPT: &str = "return Array.from(document.querySelectorAll(arguments[0]), \
     row => Array.from(row.querySelectorAll(arguments[1]), c => c.innerText.trim()));";

const TABLES_SCRIPT: &str = r#"
const text = el => el.innerText.trim();
return Array.from(document.querySelectorAll(arguments[0]), box => {
  const heading = box.querySelector(arguments[1]);
  return {
    heading: heading ? text(heading) : null,
    header: Array.from(box.querySelectorAll('thead th, thead td'), text),
    rows: Array.from(box.querySelectorAll('tbody tr'),
      tr => Array.from(tr.querySelectorAll('th, td'), text)),
  };
});
"#;

const SELECT_SCRIPT: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) return 'missing';
el.value = arguments[1];
if (el.value !== arguments[1]) return 'no-option';
el.dispatchEvent(new Event('change', { bubbles: true }));
return 'ok';
"#;

const EXISTS_SCRIPT: &str = "return document.querySelector(arguments[0]) !== null;";

const READY_STATE_SCRIPT: &str = "return document.readyState;";

const SET_CONTENT_SCRIPT: &str =
    "document.open(); document.write(arguments[0]); document.close(); return null;";

const EXPORT_STORAGE_SCRIPT: &str = r#"
return {
  origin: location.origin,
  localStorage: Object.keys(localStorage).map(k => ({ name: k, value: localStorage.getItem(k) })),
};
"#;

const IMPORT_STORAGE_SCRIPT: &str =
    "for (const e of arguments[0]) { localStorage.setItem(e.name, e.value); } return null;";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Cookie as the WebDriver `/cookie` endpoint returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    expiry: Option<u64>,
    #[serde(default)]
    http_only: bool,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    same_site: Option<String>,
}

impl From<WireCookie> for Cookie {
    fn from(c: WireCookie) -> Self {
        Cookie {
            name: c.name,
            value: c.value,
            domain: c.domain.unwrap_or_default(),
            path: c.path.unwrap_or_else(|| "/".to_string()),
            expires: c.expiry.map(|e| e as f64).unwrap_or(-1.0),
            http_only: c.http_only,
            secure: c.secure,
            same_site: c.same_site,
        }
    }
}

fn cookie_to_wire(cookie: &Cookie) -> Value {
    let mut wire = json!({
        "name": cookie.name,
        "value": cookie.value,
        "path": cookie.path,
        "domain": cookie.domain,
        "secure": cookie.secure,
        "httpOnly": cookie.http_only,
    });
    if cookie.expires > 0.0 {
        wire["expiry"] = json!(cookie.expires as u64);
    }
    if let Some(same_site) = &cookie.same_site {
        wire["sameSite"] = json!(same_site);
    }
    wire
}

/// Unwrap a WebDriver response body, mapping protocol errors onto
/// `ScrapeError`.
fn unwrap_wire(status: u16, body: &str) -> Result<Value> {
    let parsed: Value = serde_json::from_str(body).map_err(|_| ScrapeError::WebDriver {
        status,
        message: body.chars().take(200).collect(),
    })?;
    let value = parsed.get("value").cloned().unwrap_or(Value::Null);

    if (200..300).contains(&status) {
        return Ok(value);
    }

    let err: WireErrorBody = serde_json::from_value(value).unwrap_or(WireErrorBody {
        error: String::new(),
        message: body.chars().take(200).collect(),
    });
    let mapped = match err.error.as_str() {
        "no such element" => ScrapeError::ElementNotFound(err.message),
        "timeout" | "script timeout" => ScrapeError::Timeout {
            what: err.message,
            timeout_ms: 0,
        },
        _ => ScrapeError::WebDriver {
            status,
            message: format!("{}: {}", err.error, err.message),
        },
    };
    Err(mapped.into())
}

async fn send(http: &Client, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
    let mut req = http.request(method.clone(), url);
    if let Some(body) = body {
        req = req.json(body);
    }
    let resp = req
        .send()
        .await
        .with_context(|| format!("WebDriver {method} {url} request failed"))?;
    let status = resp.status().as_u16();
    let text = resp
        .text()
        .await
        .with_context(|| format!("Failed to read WebDriver {method} {url} response"))?;
    unwrap_wire(status, &text)
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Opens WebDriver sessions against a driver endpoint.
pub struct WebDriverClient {
    http: Client,
    endpoint: String,
}

impl WebDriverClient {
    /// `endpoint` is the driver's base URL, e.g. `http://localhost:9515`.
    pub fn new(endpoint: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for WebDriver")?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// `alwaysMatch` capabilities for the fixed context parameters.
    fn capabilities(options: &ContextOptions) -> Value {
        let (width, height) = options.viewport;
        let mut caps = json!({
            "browserName": options.browser_name,
            "pageLoadStrategy": "normal",
            "timeouts": {
                "implicit": 0,
                "pageLoad": millis(options.navigation_timeout),
                "script": millis(options.action_timeout),
            },
        });

        if options.browser_name == "firefox" {
            let mut args = vec![format!("--width={width}"), format!("--height={height}")];
            if options.headless {
                args.push("-headless".to_string());
            }
            caps["moz:firefoxOptions"] = json!({
                "args": args,
                "prefs": {
                    "intl.accept_languages": options.locale,
                    "general.useragent.override": options.user_agent,
                },
            });
        } else {
            let mut args = vec![
                format!("--lang={}", options.locale),
                format!("--window-size={width},{height}"),
                format!("--user-agent={}", options.user_agent),
            ];
            if options.headless {
                args.push("--headless=new".to_string());
            }
            caps["goog:chromeOptions"] = json!({
                "args": args,
                "prefs": { "intl.accept_languages": options.locale },
            });
        }
        caps
    }

    async fn setup(
        page: &WebDriverPage,
        options: &ContextOptions,
        state: Option<&StorageState>,
    ) -> Result<()> {
        page.set_default_timeout(options.action_timeout).await?;
        page.set_navigation_timeout(options.navigation_timeout).await?;
        if options.browser_name != "firefox" {
            page.apply_emulation(options).await;
        }
        if let Some(state) = state {
            page.restore_state(&options.base_url, state).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    async fn new_page(
        &self,
        options: &ContextOptions,
        state: Option<&StorageState>,
    ) -> Result<Box<dyn BrowserPage>> {
        let body = json!({ "capabilities": { "alwaysMatch": Self::capabilities(options) } });
        let url = format!("{}/session", self.endpoint);
        let value = send(&self.http, Method::POST, &url, Some(&body))
            .await
            .context("Failed to create WebDriver session")?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .context("WebDriver new-session response had no sessionId")?
            .to_string();

        info!(
            session_id = %session_id,
            browser = %options.browser_name,
            locale = %options.locale,
            timezone = %options.timezone,
            "Browser session opened"
        );

        let page = WebDriverPage {
            http: self.http.clone(),
            session_url: format!("{}/session/{session_id}", self.endpoint),
            action_timeout: RwLock::new(options.action_timeout),
            navigation_timeout: RwLock::new(options.navigation_timeout),
        };

        if let Err(e) = Self::setup(&page, options, state).await {
            if let Err(close_err) = page.close().await {
                warn!(error = %close_err, "Failed to close half-initialised session");
            }
            return Err(e);
        }

        Ok(Box::new(page))
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// One WebDriver session, used as a single page.
pub struct WebDriverPage {
    http: Client,
    session_url: String,
    action_timeout: RwLock<Duration>,
    navigation_timeout: RwLock<Duration>,
}

impl WebDriverPage {
    fn action_timeout(&self) -> Duration {
        *self.action_timeout.read().unwrap_or_else(|e| e.into_inner())
    }

    fn navigation_timeout(&self) -> Duration {
        *self.navigation_timeout.read().unwrap_or_else(|e| e.into_inner())
    }

    async fn cmd(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{path}", self.session_url);
        send(&self.http, method, &url, body.as_ref()).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.cmd(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn execute_as<T: serde::de::DeserializeOwned>(&self, script: &str, args: Vec<Value>) -> Result<T> {
        let value = self.execute(script, args).await?;
        serde_json::from_value(value).context("Unexpected script result shape")
    }

    /// Poll for an element until the action timeout elapses.
    async fn find_element(&self, selector: &str) -> Result<String> {
        let timeout = self.action_timeout();
        let deadline = Instant::now() + timeout;
        let body = json!({ "using": "css selector", "value": selector });

        loop {
            match self.cmd(Method::POST, "/element", Some(body.clone())).await {
                Ok(value) => {
                    return value
                        .get(ELEMENT_KEY)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .context("WebDriver element reference missing");
                }
                Err(e) => {
                    let not_found = matches!(
                        e.downcast_ref::<ScrapeError>(),
                        Some(ScrapeError::ElementNotFound(_))
                    );
                    if !not_found {
                        return Err(e);
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::ElementNotFound(selector.to_string()).into());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_ready(&self, url: &str, wait: WaitUntil) -> Result<()> {
        let timeout = self.navigation_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            let state: String = self.execute_as(READY_STATE_SCRIPT, vec![]).await?;
            let ready = match wait {
                WaitUntil::Load => state == "complete",
                WaitUntil::DomContentLoaded => state == "interactive" || state == "complete",
            };
            if ready {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::Timeout {
                    what: format!("{url} to reach {wait:?}"),
                    timeout_ms: millis(timeout),
                }
                .into());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Timezone / locale overrides through the chromedriver CDP bridge.
    async fn apply_emulation(&self, options: &ContextOptions) {
        let overrides = [
            ("Emulation.setTimezoneOverride", json!({ "timezoneId": options.timezone })),
            ("Emulation.setLocaleOverride", json!({ "locale": options.locale })),
        ];
        for (cmd, params) in overrides {
            let body = json!({ "cmd": cmd, "params": params });
            if let Err(e) = self.cmd(Method::POST, "/goog/cdp/execute", Some(body)).await {
                warn!(cmd, error = %e, "CDP emulation override not applied");
            }
        }
    }

    /// Load cookies and localStorage for `base_url` from a session artifact.
    async fn restore_state(&self, base_url: &str, state: &StorageState) -> Result<()> {
        let base = Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
        let host = base.host_str().unwrap_or_default().to_string();
        let origin = base.origin().ascii_serialization();

        // Cookies can only be set for the document's current domain.
        self.goto(base_url, WaitUntil::DomContentLoaded).await?;

        let mut restored = 0usize;
        let mut skipped = 0usize;
        for cookie in &state.cookies {
            if !cookie.matches_host(&host) {
                skipped += 1;
                continue;
            }
            let body = json!({ "cookie": cookie_to_wire(cookie) });
            match self.cmd(Method::POST, "/cookie", Some(body)).await {
                Ok(_) => restored += 1,
                Err(e) => {
                    skipped += 1;
                    warn!(cookie = %cookie.name, error = %e, "Cookie not restored");
                }
            }
        }

        let entries: Vec<&StorageEntry> = state
            .origins
            .iter()
            .filter(|o| o.origin.trim_end_matches('/') == origin)
            .flat_map(|o| o.local_storage.iter())
            .collect();
        if !entries.is_empty() {
            self.execute(IMPORT_STORAGE_SCRIPT, vec![serde_json::to_value(&entries)?])
                .await
                .context("Failed to restore localStorage")?;
        }

        debug!(
            host = %host,
            cookies = restored,
            skipped,
            local_storage = entries.len(),
            "Session state restored"
        );
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn goto(&self, url: &str, wait: WaitUntil) -> Result<()> {
        debug!(url, "Navigating");
        self.cmd(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map_err(|e| ScrapeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        self.wait_ready(url, wait).await
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.cmd(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .context("WebDriver returned a non-string URL")
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        self.execute_as(TEXT_SCRIPT, vec![json!(selector)]).await
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        self.execute_as(TEXTS_SCRIPT, vec![json!(selector)]).await
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        self.execute_as(ATTRIBUTE_SCRIPT, vec![json!(selector), json!(name)])
            .await
    }

    async fn attributes(&self, selector: &str, name: &str) -> Result<Vec<Option<String>>> {
        self.execute_as(ATTRIBUTES_SCRIPT, vec![json!(selector), json!(name)])
            .await
    }

    async fn query_rows(&self, row_selector: &str, cell_selector: &str) -> Result<Vec<Vec<String>>> {
        self.execute_as(ROWS_SCRIPT, vec![json!(row_selector), json!(cell_selector)])
            .await
    }

    async fn query_tables(
        &self,
        container_selector: &str,
        heading_selector: &str,
    ) -> Result<Vec<TableSnapshot>> {
        self.execute_as(
            TABLES_SCRIPT,
            vec![json!(container_selector), json!(heading_selector)],
        )
        .await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let id = self.find_element(selector).await?;
        self.cmd(Method::POST, &format!("/element/{id}/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let id = self.find_element(selector).await?;
        self.cmd(Method::POST, &format!("/element/{id}/clear"), Some(json!({})))
            .await?;
        self.cmd(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": value })),
        )
        .await?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let outcome: String = self
            .execute_as(SELECT_SCRIPT, vec![json!(selector), json!(value)])
            .await?;
        match outcome.as_str() {
            "ok" => Ok(()),
            "no-option" => {
                Err(ScrapeError::ElementNotFound(format!("{selector} option {value:?}")).into())
            }
            _ => Err(ScrapeError::ElementNotFound(selector.to_string()).into()),
        }
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let found: bool = self.execute_as(EXISTS_SCRIPT, vec![json!(selector)]).await?;
            if found {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::Timeout {
                    what: selector.to_string(),
                    timeout_ms: millis(timeout),
                }
                .into());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.execute(script, args).await
    }

    async fn set_content(&self, html: &str) -> Result<()> {
        self.execute(SET_CONTENT_SCRIPT, vec![json!(html)]).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let value = self.cmd(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .context("WebDriver screenshot was not a string")?;
        BASE64
            .decode(encoded)
            .context("WebDriver screenshot was not valid base64")
    }

    async fn storage_state(&self) -> Result<StorageState> {
        let cookies: Vec<WireCookie> = serde_json::from_value(
            self.cmd(Method::GET, "/cookie", None).await?,
        )
        .context("Unexpected cookie list shape")?;
        let origin: OriginState = self.execute_as(EXPORT_STORAGE_SCRIPT, vec![]).await?;

        Ok(StorageState {
            cookies: cookies.into_iter().map(Cookie::from).collect(),
            origins: vec![origin],
        })
    }

    async fn set_default_timeout(&self, timeout: Duration) -> Result<()> {
        self.cmd(
            Method::POST,
            "/timeouts",
            Some(json!({ "script": millis(timeout) })),
        )
        .await?;
        *self.action_timeout.write().unwrap_or_else(|e| e.into_inner()) = timeout;
        Ok(())
    }

    async fn set_navigation_timeout(&self, timeout: Duration) -> Result<()> {
        self.cmd(
            Method::POST,
            "/timeouts",
            Some(json!({ "pageLoad": millis(timeout) })),
        )
        .await?;
        *self.navigation_timeout.write().unwrap_or_else(|e| e.into_inner()) = timeout;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.cmd(Method::DELETE, "", None).await?;
        info!("Browser session closed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
