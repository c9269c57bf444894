//! Transaction category update.
//!
//! The request is issued from inside the page (`fetch` with same-origin
//! credentials) so the session cookies and the CSRF token stay bound to
//! the signed-in document. One attempt, raw outcome returned.

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use super::pages::{selectors as sel, Pages};
use crate::browser::BrowserPage;
use crate::types::{CategoryUpdate, MutationResult, ScrapeError};

const UPDATE_SCRIPT: &str = r#"
const [url, token, body] = arguments;
return fetch(url, {
  method: 'PUT',
  credentials: 'same-origin',
  headers: {
    'X-CSRF-Token': token,
    'X-Requested-With': 'XMLHttpRequest',
    'Content-Type': 'application/x-www-form-urlencoded; charset=UTF-8',
  },
  body,
}).then(r => ({ ok: r.ok, status: r.status }));
"#;

/// CSRF token from the page's meta tag.
pub async fn read_csrf_token(page: &dyn BrowserPage) -> Result<String> {
    page.attribute(sel::CSRF_META, "content")
        .await?
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ScrapeError::ElementNotFound(sel::CSRF_META.to_string()).into())
}

/// Form body with the fixed field set.
pub fn update_form_body(update: &CategoryUpdate) -> String {
    let flag = |b: bool| if b { "1" } else { "0" };
    let fields = [
        ("user_asset_act[id]", update.transaction_id.clone()),
        ("user_asset_act[large_category_id]", update.large_category_id.to_string()),
        ("user_asset_act[middle_category_id]", update.middle_category_id.to_string()),
        ("user_asset_act[is_income]", flag(update.is_income).to_string()),
        ("user_asset_act[is_target]", flag(update.is_target).to_string()),
    ];
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Update one transaction's category. The page must be on a signed-in view
/// carrying the CSRF meta tag.
pub async fn update_category(
    page: &dyn BrowserPage,
    pages: &Pages,
    update: &CategoryUpdate,
) -> Result<MutationResult> {
    let token = read_csrf_token(page).await?;
    let body = update_form_body(update);

    let value = page
        .evaluate(
            UPDATE_SCRIPT,
            vec![json!(pages.cash_flow_update()), json!(token), json!(body)],
        )
        .await
        .context("Category update request failed")?;
    let result: MutationResult =
        serde_json::from_value(value).context("Unexpected category update response")?;

    if result.ok {
        info!(
            transaction_id = %update.transaction_id,
            large = update.large_category_id,
            middle = update.middle_category_id,
            "Category updated"
        );
    } else {
        warn!(
            transaction_id = %update.transaction_id,
            status = result.status,
            "Category update rejected"
        );
    }
    Ok(result)
}
