//! Entity extraction: table text → domain types.
//!
//! The row mappers are pure so they can be tested without a page; the
//! `scrape_*` functions navigate, pull the raw text, and hand it to them.
//! Every numeric/date cell goes through the run's `TextNormalizer`.

use anyhow::Result;
use chrono::{Datelike, NaiveDate, NaiveTime};
use tracing::{debug, warn};

use super::pages::{selectors as sel, Pages};
use crate::browser::{BrowserPage, TableSnapshot, WaitUntil};
use crate::parser::{first_full_date, normalize_date_to_iso, normalize_month_key, TextNormalizer};
use crate::types::{
    Account, AccountStatus, AssetCategory, AssetHistoryPoint, AssetItem,
    CashFlowItem, CashFlowSummary, CategoryAmount, Group, Liabilities, LiabilityItem,
    MonthlySummaryItem, Portfolio, TransactionKind, NO_GROUP_ID,
};

/// Status cell text of an account still refreshing. Matched exactly.
pub const UPDATING_LABEL: &str = "更新中";
pub const NORMAL_LABEL: &str = "正常";

/// Large category the host files transfers under.
const TRANSFER_CATEGORY: &str = "振替";
/// Row class the host puts on transactions excluded from totals.
const EXCLUDED_ROW_CLASS: &str = "mf-grayout";
const TRANSFER_ROW_CLASS: &str = "transfer";

/// The summary view shows at most this many months.
pub const MAX_SUMMARY_MONTHS: usize = 6;

// ----- Account table columns -----
const ACCOUNT_NAME: usize = 0;
const ACCOUNT_BALANCE: usize = 1;
const ACCOUNT_SYNCED: usize = 2;
const ACCOUNT_STATUS: usize = 3;

// ----- Cash-flow table columns -----
const CF_DATE: usize = 1;
const CF_DESCRIPTION: usize = 2;
const CF_AMOUNT: usize = 3;
const CF_INSTITUTION: usize = 4;
const CF_LARGE: usize = 5;
const CF_MIDDLE: usize = 6;

// ----- Header candidates, most specific first -----
const NAME_HEADERS: &[&str] = &["種類・名称", "銘柄名", "名称", "保険名", "種類"];
const BALANCE_HEADERS: &[&str] = &["残高", "評価額", "現在価値", "換算価値"];
const INSTITUTION_HEADERS: &[&str] = &["保有金融機関"];
const GAIN_HEADER: &str = "評価損益";
const GAIN_PCT_HEADER: &str = "評価損益率";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cell(cells: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| cells.get(i)).map(String::as_str).unwrap_or("")
}

/// First non-blank line; cells often carry a sub-caption on a second line.
fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string()
}

fn optional_text(text: &str) -> Option<String> {
    let line = first_line(text);
    (!line.is_empty() && line != "-").then_some(line)
}

fn is_blank_row(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// `正常` (or blank) → normal, exactly `更新中` → updating, anything else
/// is an error whose text becomes the message.
pub fn parse_account_status(text: &str) -> (AccountStatus, Option<String>) {
    let t = text.trim();
    if t.is_empty() || t == NORMAL_LABEL {
        (AccountStatus::Normal, None)
    } else if t == UPDATING_LABEL {
        (AccountStatus::Updating, None)
    } else {
        (AccountStatus::Error, Some(t.to_string()))
    }
}

/// Exact match only: `更新中 → 一時停止中` is a terminal state, not a
/// refresh in progress.
pub fn is_updating(status_text: &str) -> bool {
    status_text.trim() == UPDATING_LABEL
}

pub fn count_updating<S: AsRef<str>>(statuses: &[S]) -> usize {
    statuses.iter().filter(|s| is_updating(s.as_ref())).count()
}

/// Status cell of each account row.
pub fn status_cells(rows: &[Vec<String>]) -> Vec<&str> {
    rows.iter()
        .filter(|r| r.len() > ACCOUNT_STATUS)
        .map(|r| r[ACCOUNT_STATUS].as_str())
        .collect()
}

/// `10/19 08:15` → `2026-10-19 08:15`. Sync times lie in the past, so a
/// date after `reference` belongs to the previous year.
pub fn last_synced_at(text: &str, reference: NaiveDate, n: &mut TextNormalizer) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return None;
    }
    let mut parts = text.split_whitespace();
    let date_part = parts.next()?;

    let mut iso = normalize_date_to_iso(date_part, reference.year());
    if let Ok(date) = NaiveDate::parse_from_str(&iso, "%Y-%m-%d") {
        if date > reference {
            iso = normalize_date_to_iso(date_part, reference.year() - 1);
        }
    }
    if iso.is_empty() {
        n.record_degraded(text, "sync date");
        return None;
    }

    match parts
        .next()
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
    {
        Some(time) => Some(format!("{iso} {}", time.format("%H:%M"))),
        None => Some(iso),
    }
}

pub fn account_from_row(
    cells: &[String],
    reference: NaiveDate,
    n: &mut TextNormalizer,
) -> Option<Account> {
    if cells.len() <= ACCOUNT_STATUS {
        return None;
    }
    let institution = first_line(&cells[ACCOUNT_NAME]);
    if institution.is_empty() {
        return None;
    }
    let (status, error_message) = parse_account_status(&cells[ACCOUNT_STATUS]);
    Some(Account {
        institution,
        balance: n.integer(&cells[ACCOUNT_BALANCE]),
        last_synced_at: last_synced_at(&cells[ACCOUNT_SYNCED], reference, n),
        status,
        error_message,
    })
}

// ---------------------------------------------------------------------------
// Portfolio and liabilities
// ---------------------------------------------------------------------------

fn gain_column(table: &TableSnapshot) -> Option<usize> {
    table
        .header
        .iter()
        .position(|h| h.contains(GAIN_HEADER) && !h.contains(GAIN_PCT_HEADER))
}

/// Holdings of one portfolio section. Columns are located by header text;
/// a section without a recognisable balance column is skipped.
pub fn assets_from_table(table: &TableSnapshot, n: &mut TextNormalizer) -> Vec<AssetItem> {
    let heading = table.heading.as_deref().unwrap_or("");
    let category = AssetCategory::from_title(heading);
    let Some(balance_col) = table.column(BALANCE_HEADERS) else {
        warn!(heading, "Portfolio section without a balance column skipped");
        return Vec::new();
    };
    let name_col = table.column(NAME_HEADERS).or(Some(0));
    let institution_col = table.column(INSTITUTION_HEADERS);
    let gain_col = gain_column(table);
    let pct_col = table.column(&[GAIN_PCT_HEADER]);

    let mut items = Vec::new();
    for row in table.rows.iter().filter(|r| !is_blank_row(r)) {
        items.push(AssetItem {
            category,
            name: first_line(cell(row, name_col)),
            institution: optional_text(cell(row, institution_col)),
            balance: n.integer(cell(row, Some(balance_col))),
            unrealized_gain: gain_col.and_then(|c| n.optional_integer(cell(row, Some(c)))),
            unrealized_gain_pct: pct_col.and_then(|c| n.percentage(cell(row, Some(c)))),
        });
    }
    items
}

pub fn liabilities_from_table(table: &TableSnapshot, n: &mut TextNormalizer) -> Vec<LiabilityItem> {
    let heading = first_line(table.heading.as_deref().unwrap_or(""));
    let Some(balance_col) = table.column(&["残高"]) else {
        warn!(heading = %heading, "Liability section without a balance column skipped");
        return Vec::new();
    };
    let kind_col = table.column(&["種類"]);
    let name_col = table.column(&["名称"]);
    let institution_col = table.column(INSTITUTION_HEADERS);

    let mut items = Vec::new();
    for row in table.rows.iter().filter(|r| !is_blank_row(r)) {
        let kind = optional_text(cell(row, kind_col)).unwrap_or_else(|| heading.clone());
        items.push(LiabilityItem {
            name: optional_text(cell(row, name_col)).unwrap_or_else(|| kind.clone()),
            kind,
            institution: optional_text(cell(row, institution_col)),
            balance: n.integer(cell(row, Some(balance_col))).abs(),
        });
    }
    items
}

// ---------------------------------------------------------------------------
// Cash flow
// ---------------------------------------------------------------------------

/// Start of the displayed period, from a header like
/// `2026/10/01 - 2026/10/31`; the first of the reference month otherwise.
pub fn cash_flow_range_start(header: Option<&str>, reference: NaiveDate) -> NaiveDate {
    header
        .and_then(first_full_date)
        .or_else(|| reference.with_day(1))
        .unwrap_or(reference)
}

/// `(income, expense)` from the labelled totals rows, or `None` when the
/// totals table carried neither.
pub fn cash_flow_totals(rows: &[Vec<String>], n: &mut TextNormalizer) -> Option<(i64, i64)> {
    let mut income = None;
    let mut expense = None;
    for row in rows.iter().filter(|r| r.len() >= 2) {
        let label = &row[0];
        let value = &row[row.len() - 1];
        if label.contains("収入") {
            income = Some(n.integer(value));
        } else if label.contains("支出") {
            expense = Some(n.integer(value).abs());
        }
    }
    if income.is_none() && expense.is_none() {
        return None;
    }
    Some((income.unwrap_or(0), expense.unwrap_or(0)))
}

pub fn cash_flow_item(
    cells: &[String],
    id: Option<&str>,
    row_class: Option<&str>,
    range_start: NaiveDate,
    n: &mut TextNormalizer,
) -> Option<CashFlowItem> {
    if cells.len() <= CF_AMOUNT || is_blank_row(cells) {
        return None;
    }
    let class = row_class.unwrap_or("");
    let amount = n.integer(&cells[CF_AMOUNT]);
    let large_category = optional_text(cell(cells, Some(CF_LARGE)));

    let transfer = class.split_whitespace().any(|c| c.contains(TRANSFER_ROW_CLASS))
        || large_category.as_deref() == Some(TRANSFER_CATEGORY);
    let kind = if transfer {
        TransactionKind::Transfer
    } else if amount > 0 {
        TransactionKind::Income
    } else {
        TransactionKind::Expense
    };

    let description = first_line(&cells[CF_DESCRIPTION]);
    let id = match id.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => id.to_string(),
        None => {
            n.record_degraded(&description, "transaction id");
            String::new()
        }
    };

    Some(CashFlowItem {
        id,
        date: n.date(&cells[CF_DATE], range_start),
        description,
        amount,
        kind,
        institution: optional_text(cell(cells, Some(CF_INSTITUTION))),
        large_category,
        middle_category: optional_text(cell(cells, Some(CF_MIDDLE))),
        is_target: !class.split_whitespace().any(|c| c == EXCLUDED_ROW_CLASS),
    })
}

/// Totals over target, non-transfer items.
pub fn totals_from_items(items: &[CashFlowItem]) -> (i64, i64) {
    items
        .iter()
        .filter(|i| i.is_target && i.kind != TransactionKind::Transfer)
        .fold((0, 0), |(inc, exp), i| {
            if i.amount >= 0 {
                (inc + i.amount, exp)
            } else {
                (inc, exp - i.amount)
            }
        })
}

/// Month columns of the summary table with their income/expense rows.
pub fn monthly_summary_from_rows(
    rows: &[Vec<String>],
    n: &mut TextNormalizer,
) -> Vec<MonthlySummaryItem> {
    let header = rows.iter().enumerate().find_map(|(i, row)| {
        let months: Vec<(usize, String)> = row
            .iter()
            .enumerate()
            .filter_map(|(col, text)| normalize_month_key(text).map(|key| (col, key)))
            .collect();
        (!months.is_empty()).then_some((i, months))
    });
    let Some((header_idx, months)) = header else {
        return Vec::new();
    };

    let body = &rows[header_idx + 1..];
    let labelled = |needle: &str| {
        body.iter()
            .find(|r| r.first().is_some_and(|label| label.contains(needle)))
    };
    let income_row = labelled("収入");
    let expense_row = labelled("支出");

    let mut items = Vec::new();
    for (col, month) in months.into_iter().take(MAX_SUMMARY_MONTHS) {
        let income = income_row.map(|r| n.integer(cell(r, Some(col)))).unwrap_or(0);
        let expense = expense_row
            .map(|r| n.integer(cell(r, Some(col))).abs())
            .unwrap_or(0);
        items.push(MonthlySummaryItem {
            month,
            income,
            expense,
        });
    }
    items
}

// ---------------------------------------------------------------------------
// Asset history
// ---------------------------------------------------------------------------

/// Header `[日付, 合計, <category titles>…]`, one row per date.
pub fn asset_history_from_rows(
    rows: &[Vec<String>],
    year_hint: i32,
    n: &mut TextNormalizer,
) -> Vec<AssetHistoryPoint> {
    let Some((header, body)) = rows.split_first() else {
        return Vec::new();
    };
    let total_col = header.iter().position(|h| h.contains("合計")).unwrap_or(1);
    let categories: Vec<(usize, AssetCategory)> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 0 && *i != total_col)
        .map(|(i, title)| (i, AssetCategory::from_title(title)))
        .collect();

    let mut points = Vec::new();
    for row in body.iter().filter(|r| !is_blank_row(r)) {
        let date = normalize_date_to_iso(cell(row, Some(0)), year_hint);
        if date.is_empty() {
            n.record_degraded(cell(row, Some(0)), "history date");
            continue;
        }
        let breakdown = categories
            .iter()
            .map(|(col, category)| CategoryAmount {
                category: *category,
                amount: n.integer(cell(row, Some(*col))),
            })
            .collect();
        points.push(AssetHistoryPoint {
            date,
            total: n.integer(cell(row, Some(total_col))),
            breakdown,
        });
    }
    points
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Groups offered by the scope selector, pseudo-group included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupListing {
    /// Exactly one entry has `is_current` set.
    pub groups: Vec<Group>,
    /// The selected group at read time; `None` when nothing was selected.
    pub default_group: Option<Group>,
}

impl GroupListing {
    /// Id of the current scope (the pseudo-group when undeterminable).
    pub fn current_id(&self) -> &str {
        self.groups
            .iter()
            .find(|g| g.is_current)
            .map(|g| g.id.as_str())
            .unwrap_or(NO_GROUP_ID)
    }
}

/// Build the listing from the selector's option texts, values and the
/// selected value. When no option is selected the pseudo-group stands in as
/// current so that exactly one group is current.
pub fn groups_from_options(
    names: &[String],
    ids: &[Option<String>],
    selected: Option<&str>,
) -> GroupListing {
    let selected = selected.map(str::trim).filter(|s| !s.is_empty());
    let mut groups: Vec<Group> = Vec::new();

    for (name, id) in names.iter().zip(ids) {
        let Some(id) = id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        if groups.iter().any(|g| g.id == id) {
            continue;
        }
        let is_current = selected == Some(id);
        if id == NO_GROUP_ID {
            groups.push(Group::no_group(is_current));
        } else {
            groups.push(Group {
                id: id.to_string(),
                name: first_line(name),
                is_current,
            });
        }
    }

    if !groups.iter().any(Group::is_no_group) {
        groups.push(Group::no_group(false));
    }

    let default_group = groups.iter().find(|g| g.is_current).cloned();
    if default_group.is_none() {
        if let Some(pseudo) = groups.iter_mut().find(|g| g.is_no_group()) {
            pseudo.is_current = true;
        }
    }

    GroupListing {
        groups,
        default_group,
    }
}

// ---------------------------------------------------------------------------
// Page scrapers
// ---------------------------------------------------------------------------

pub async fn scrape_accounts(
    page: &dyn BrowserPage,
    pages: &Pages,
    reference: NaiveDate,
    n: &mut TextNormalizer,
) -> Result<Vec<Account>> {
    page.goto(&pages.accounts(), WaitUntil::Load).await?;
    let rows = page.query_rows(sel::ACCOUNT_ROWS, sel::ACCOUNT_CELLS).await?;
    let accounts: Vec<Account> = rows
        .iter()
        .filter_map(|r| account_from_row(r, reference, n))
        .collect();
    debug!(count = accounts.len(), "Accounts scraped");
    Ok(accounts)
}

async fn total_or_sum(
    page: &dyn BrowserPage,
    selector: &str,
    sum: i64,
    n: &mut TextNormalizer,
) -> Result<i64> {
    Ok(match page.text(selector).await? {
        Some(text) if !text.trim().is_empty() => n.integer(&text),
        _ => sum,
    })
}

pub async fn scrape_portfolio(
    page: &dyn BrowserPage,
    pages: &Pages,
    n: &mut TextNormalizer,
) -> Result<Portfolio> {
    page.goto(&pages.portfolio(), WaitUntil::Load).await?;
    let tables = page.query_tables(sel::BS_SECTIONS, sel::BS_HEADING).await?;
    let items: Vec<AssetItem> = tables
        .iter()
        .flat_map(|t| assets_from_table(t, n))
        .collect();
    let sum = items.iter().map(|i| i.balance).sum();
    let total = total_or_sum(page, sel::PORTFOLIO_TOTAL, sum, n).await?;
    debug!(sections = tables.len(), items = items.len(), total, "Portfolio scraped");
    Ok(Portfolio { total, items })
}

pub async fn scrape_liabilities(
    page: &dyn BrowserPage,
    pages: &Pages,
    n: &mut TextNormalizer,
) -> Result<Liabilities> {
    page.goto(&pages.liabilities(), WaitUntil::Load).await?;
    let tables = page.query_tables(sel::BS_SECTIONS, sel::BS_HEADING).await?;
    let items: Vec<LiabilityItem> = tables
        .iter()
        .flat_map(|t| liabilities_from_table(t, n))
        .collect();
    let sum = items.iter().map(|i| i.balance).sum();
    let total = total_or_sum(page, sel::LIABILITY_TOTAL, sum, n).await?.abs();
    debug!(items = items.len(), total, "Liabilities scraped");
    Ok(Liabilities { total, items })
}

pub async fn scrape_cash_flow(
    page: &dyn BrowserPage,
    pages: &Pages,
    reference: NaiveDate,
    n: &mut TextNormalizer,
) -> Result<CashFlowSummary> {
    page.goto(&pages.cash_flow(), WaitUntil::Load).await?;

    let header = page.text(sel::CF_RANGE).await?;
    let range_start = cash_flow_range_start(header.as_deref(), reference);

    let total_rows = page.query_rows(sel::CF_TOTAL_ROWS, sel::LABELLED_CELLS).await?;
    let rows = page.query_rows(sel::CF_ROWS, "td").await?;
    let ids = page.attributes(sel::CF_ROWS, sel::CF_ROW_ID_ATTR).await?;
    let classes = page.attributes(sel::CF_ROWS, "class").await?;

    let mut items = Vec::new();
    for (i, cells) in rows.iter().enumerate() {
        let id = ids.get(i).and_then(|v| v.as_deref());
        let class = classes.get(i).and_then(|v| v.as_deref());
        if let Some(item) = cash_flow_item(cells, id, class, range_start, n) {
            items.push(item);
        }
    }

    let (income, expense) =
        cash_flow_totals(&total_rows, n).unwrap_or_else(|| totals_from_items(&items));
    let month = range_start.format("%Y-%m").to_string();
    debug!(month = %month, items = items.len(), income, expense, "Cash flow scraped");

    Ok(CashFlowSummary {
        month,
        income,
        expense,
        items,
    })
}

pub async fn scrape_monthly_summary(
    page: &dyn BrowserPage,
    pages: &Pages,
    n: &mut TextNormalizer,
) -> Result<Vec<MonthlySummaryItem>> {
    page.goto(&pages.monthly_summary(), WaitUntil::Load).await?;
    let rows = page
        .query_rows(sel::CF_SUMMARY_ROWS, sel::LABELLED_CELLS)
        .await?;
    let items = monthly_summary_from_rows(&rows, n);
    debug!(months = items.len(), "Monthly summary scraped");
    Ok(items)
}

pub async fn scrape_asset_history(
    page: &dyn BrowserPage,
    pages: &Pages,
    reference: NaiveDate,
    n: &mut TextNormalizer,
) -> Result<Vec<AssetHistoryPoint>> {
    page.goto(&pages.asset_history(), WaitUntil::Load).await?;
    let rows = page
        .query_rows(sel::HISTORY_ROWS, sel::LABELLED_CELLS)
        .await?;
    let points = asset_history_from_rows(&rows, reference.year(), n);
    debug!(points = points.len(), "Asset history scraped");
    Ok(points)
}

/// Read the scope selector from the account registry view.
pub async fn read_groups(page: &dyn BrowserPage, pages: &Pages) -> Result<GroupListing> {
    page.goto(&pages.accounts(), WaitUntil::Load).await?;
    let names = page.texts(sel::GROUP_OPTIONS).await?;
    let ids = page.attributes(sel::GROUP_OPTIONS, "value").await?;
    let selected = page.attribute(sel::GROUP_SELECTED, "value").await?;

    let listing = groups_from_options(&names, &ids, selected.as_deref());
    match &listing.default_group {
        Some(g) => debug!(groups = listing.groups.len(), current = %g, "Groups read"),
        None => warn!(
            groups = listing.groups.len(),
            "Current group undeterminable; treating the no-group view as current"
        ),
    }
    Ok(listing)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
