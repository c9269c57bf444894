//! Shared types for the HARVESTER scraper.
//!
//! These types form the data model used across all modules.
//! Everything here is created fresh per orchestration run and handed
//! back to the caller as an immutable `ScrapeResult`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Backend refresh state of a linked account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Normal,
    Updating,
    Error,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Normal => write!(f, "normal"),
            AccountStatus::Updating => write!(f, "updating"),
            AccountStatus::Error => write!(f, "error"),
        }
    }
}

/// A linked financial institution as listed on the account registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub institution: String,
    /// Balance in yen.
    pub balance: i64,
    /// `YYYY-MM-DD HH:MM`, or `None` when the host never synced.
    pub last_synced_at: Option<String>,
    pub status: AccountStatus,
    pub error_message: Option<String>,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | ¥{} | {} | synced {}",
            self.institution,
            self.balance,
            self.status,
            self.last_synced_at.as_deref().unwrap_or("never"),
        )
    }
}

impl Account {
    /// The issue to surface for this account, if it is not `Normal`.
    pub fn issue(&self) -> Option<AccountIssue> {
        if self.status == AccountStatus::Normal {
            return None;
        }
        Some(AccountIssue {
            name: self.institution.clone(),
            status: self.status,
            message: self.error_message.clone(),
        })
    }
}

/// An account that did not finish its backend-side refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountIssue {
    pub name: String,
    /// Always `Updating` or `Error`.
    pub status: AccountStatus,
    pub message: Option<String>,
}

impl fmt::Display for AccountIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{} ({}): {m}", self.name, self.status),
            None => write!(f, "{} ({})", self.name, self.status),
        }
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Reserved identifier of the "no group" pseudo-group. The host uses it as
/// the option value for the unpartitioned view; real groups never use it.
pub const NO_GROUP_ID: &str = "0";

/// Display name the host shows for the pseudo-group.
pub const NO_GROUP_NAME: &str = "グループ選択なし";

/// A user-defined account partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub is_current: bool,
}

impl Group {
    /// The "all accounts, ungrouped" pseudo-group.
    pub fn no_group(is_current: bool) -> Self {
        Self {
            id: NO_GROUP_ID.to_string(),
            name: NO_GROUP_NAME.to_string(),
            is_current,
        }
    }

    pub fn is_no_group(&self) -> bool {
        self.id == NO_GROUP_ID
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_current { " *" } else { "" };
        write!(f, "{} [{}]{marker}", self.name, self.id)
    }
}

// ---------------------------------------------------------------------------
// Assets and liabilities
// ---------------------------------------------------------------------------

/// Asset classification, resolved from the portfolio table title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Cash,
    Stock,
    MarginStock,
    Fund,
    Bond,
    Pension,
    Point,
    Insurance,
    Derivative,
    Fx,
    RealEstate,
    Other,
    /// Title matched none of the known tables.
    Unknown,
}

impl AssetCategory {
    /// Known table titles, checked in order. Longer titles that share a
    /// prefix with another entry must come first.
    pub const KNOWN_TITLES: &'static [(&'static str, AssetCategory)] = &[
        ("預金・現金・暗号資産", AssetCategory::Cash),
        ("預金・現金・仮想通貨", AssetCategory::Cash),
        ("株式（現物）", AssetCategory::Stock),
        ("株式(現物)", AssetCategory::Stock),
        ("株式（信用）", AssetCategory::MarginStock),
        ("株式(信用)", AssetCategory::MarginStock),
        ("投資信託", AssetCategory::Fund),
        ("債券", AssetCategory::Bond),
        ("年金", AssetCategory::Pension),
        ("ポイント・マイル", AssetCategory::Point),
        ("保険", AssetCategory::Insurance),
        ("先物・オプション", AssetCategory::Derivative),
        ("FX", AssetCategory::Fx),
        ("不動産", AssetCategory::RealEstate),
        ("その他の資産", AssetCategory::Other),
    ];

    /// Resolve a table title. Never fails: unrecognised titles map to
    /// `Unknown`.
    pub fn from_title(title: &str) -> Self {
        let title = title.trim();
        Self::KNOWN_TITLES
            .iter()
            .find(|(known, _)| title.starts_with(known))
            .map(|(_, cat)| *cat)
            .unwrap_or(AssetCategory::Unknown)
    }

    /// Stable label used in output.
    pub fn label(&self) -> &'static str {
        match self {
            AssetCategory::Cash => "cash",
            AssetCategory::Stock => "stock",
            AssetCategory::MarginStock => "margin_stock",
            AssetCategory::Fund => "fund",
            AssetCategory::Bond => "bond",
            AssetCategory::Pension => "pension",
            AssetCategory::Point => "point",
            AssetCategory::Insurance => "insurance",
            AssetCategory::Derivative => "derivative",
            AssetCategory::Fx => "fx",
            AssetCategory::RealEstate => "real_estate",
            AssetCategory::Other => "other",
            AssetCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single holding from the portfolio view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetItem {
    pub category: AssetCategory,
    pub name: String,
    pub institution: Option<String>,
    pub balance: i64,
    pub unrealized_gain: Option<i64>,
    pub unrealized_gain_pct: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub total: i64,
    pub items: Vec<AssetItem>,
}

impl Portfolio {
    /// Sum of item balances per category, in first-seen order.
    pub fn totals_by_category(&self) -> Vec<(AssetCategory, i64)> {
        let mut totals: Vec<(AssetCategory, i64)> = Vec::new();
        for item in &self.items {
            match totals.iter_mut().find(|(c, _)| *c == item.category) {
                Some((_, sum)) => *sum += item.balance,
                None => totals.push((item.category, item.balance)),
            }
        }
        totals
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiabilityItem {
    pub kind: String,
    pub name: String,
    pub institution: Option<String>,
    pub balance: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Liabilities {
    pub total: i64,
    pub items: Vec<LiabilityItem>,
}

/// One row of the asset-history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetHistoryPoint {
    /// ISO date.
    pub date: String,
    pub total: i64,
    pub breakdown: Vec<CategoryAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAmount {
    pub category: AssetCategory,
    pub amount: i64,
}

// ---------------------------------------------------------------------------
// Cash flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Income => write!(f, "income"),
            TransactionKind::Expense => write!(f, "expense"),
            TransactionKind::Transfer => write!(f, "transfer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowItem {
    /// The host's transaction id (stable across scrapes).
    pub id: String,
    /// ISO date.
    pub date: String,
    pub description: String,
    /// Signed: income positive, expense negative.
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub institution: Option<String>,
    pub large_category: Option<String>,
    pub middle_category: Option<String>,
    pub is_target: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowSummary {
    /// `YYYY-MM`.
    pub month: String,
    pub income: i64,
    /// Magnitude of spending (non-negative).
    pub expense: i64,
    pub items: Vec<CashFlowItem>,
}

impl CashFlowSummary {
    pub fn balance(&self) -> i64 {
        self.income - self.expense
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummaryItem {
    /// `YYYY-MM`.
    pub month: String,
    pub income: i64,
    pub expense: i64,
}

impl fmt::Display for MonthlySummaryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: income ¥{} / expense ¥{} / net ¥{}",
            self.month,
            self.income,
            self.expense,
            self.income - self.expense,
        )
    }
}

// ---------------------------------------------------------------------------
// Scrape result
// ---------------------------------------------------------------------------

/// Phase 1 output, scraped under the default scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalData {
    pub accounts: Vec<Account>,
    pub portfolio: Portfolio,
    pub liabilities: Liabilities,
    pub cash_flow: CashFlowSummary,
    pub refresh_issues: Vec<AccountIssue>,
}

/// Phase 2 output for one group (or the pseudo-group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupData {
    pub group: Group,
    pub accounts: Vec<Account>,
    pub asset_history: Vec<AssetHistoryPoint>,
    pub monthly_summary: Vec<MonthlySummaryItem>,
    pub portfolio: Portfolio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub run_id: Uuid,
    pub scraped_at: DateTime<Utc>,
    pub global_data: GlobalData,
    pub group_data_list: Vec<GroupData>,
    pub default_group: Option<Group>,
    /// Non-empty cells that fell back to zero/absent during parsing.
    pub degraded_parses: u32,
}

/// A structural problem found after a run completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyWarning {
    /// Invariant (a): expected exactly one current group.
    CurrentGroupCount(usize),
    /// Invariant (b): a real group lists more accounts than the pseudo-group.
    PseudoGroupNotMaximal { group_id: String, accounts: usize, pseudo_accounts: usize },
    /// The pseudo-group is missing from the group list.
    MissingPseudoGroup,
    DegradedParses(u32),
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyWarning::CurrentGroupCount(n) => {
                write!(f, "expected exactly one current group, found {n}")
            }
            ConsistencyWarning::PseudoGroupNotMaximal { group_id, accounts, pseudo_accounts } => write!(
                f,
                "group {group_id} lists {accounts} accounts, more than the no-group view ({pseudo_accounts})"
            ),
            ConsistencyWarning::MissingPseudoGroup => write!(f, "no-group entry missing"),
            ConsistencyWarning::DegradedParses(n) => {
                write!(f, "{n} cells could not be parsed and were recorded as zero/absent")
            }
        }
    }
}

impl ScrapeResult {
    /// Check the group invariants and surface silent parse degradation.
    pub fn check_consistency(&self) -> Vec<ConsistencyWarning> {
        let mut warnings = Vec::new();

        let current = self
            .group_data_list
            .iter()
            .filter(|g| g.group.is_current)
            .count();
        if current != 1 {
            warnings.push(ConsistencyWarning::CurrentGroupCount(current));
        }

        match self.group_data_list.iter().find(|g| g.group.is_no_group()) {
            Some(pseudo) => {
                let pseudo_accounts = pseudo.accounts.len();
                for g in self.group_data_list.iter().filter(|g| !g.group.is_no_group()) {
                    if g.accounts.len() > pseudo_accounts {
                        warnings.push(ConsistencyWarning::PseudoGroupNotMaximal {
                            group_id: g.group.id.clone(),
                            accounts: g.accounts.len(),
                            pseudo_accounts,
                        });
                    }
                }
            }
            None => warnings.push(ConsistencyWarning::MissingPseudoGroup),
        }

        if self.degraded_parses > 0 {
            warnings.push(ConsistencyWarning::DegradedParses(self.degraded_parses));
        }

        warnings
    }

    /// Entry for the pseudo-group, if present.
    pub fn no_group_data(&self) -> Option<&GroupData> {
        self.group_data_list.iter().find(|g| g.group.is_no_group())
    }
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// Category selection for a single transaction update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub transaction_id: String,
    pub large_category_id: u32,
    pub middle_category_id: u32,
    pub is_income: bool,
    pub is_target: bool,
}

/// Raw outcome of a state-changing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    pub ok: bool,
    pub status: u16,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for HARVESTER.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Scope switch to group {group_id} failed: {message}")]
    ScopeSwitch { group_id: String, message: String },

    #[error("Session state error ({path}): {message}")]
    SessionState { path: String, message: String },

    #[error("WebDriver error ({status}): {message}")]
    WebDriver { status: u16, message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
