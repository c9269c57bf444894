//! Mock household-finance site for integration testing.
//!
//! Provides a deterministic, group-aware `BrowserPage`: the group selector
//! really changes which accounts every view shows, the account registry
//! plays out a background refresh, and one group can be made to break
//! mid-scrape. All state is in-memory.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use harvester::browser::{BrowserPage, StorageState, TableSnapshot, WaitUntil};
use harvester::scraper::pages::selectors as sel;
use harvester::types::{ScrapeError, NO_GROUP_ID, NO_GROUP_NAME};

pub const BASE: &str = "https://mf.test";

pub const UPDATING: &str = "更新中";
pub const NORMAL: &str = "正常";

/// One linked account and the groups it belongs to.
#[derive(Debug, Clone)]
pub struct SiteAccount {
    pub name: String,
    pub balance: i64,
    pub groups: Vec<String>,
    /// Status shown on the registry; `更新中` accounts settle once the
    /// refresh finishes.
    pub status: String,
}

impl SiteAccount {
    pub fn new(name: &str, balance: i64, groups: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            balance,
            groups: groups.iter().map(|g| g.to_string()).collect(),
            status: NORMAL.to_string(),
        }
    }

    pub fn updating(mut self) -> Self {
        self.status = UPDATING.to_string();
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }
}

#[derive(Default)]
struct SiteState {
    url: String,
    /// `(id, name)` of the real groups; the pseudo-group is always offered.
    groups: Vec<(String, String)>,
    selected: Option<String>,
    accounts: Vec<SiteAccount>,
    refresh_clicked: bool,
    /// Registry reads after the refresh click before `更新中` clears;
    /// `None` never clears.
    settle_after: Option<usize>,
    registry_reads: usize,
    broken_group: Option<String>,
    selects: Vec<String>,
}

impl SiteState {
    fn path(&self) -> &str {
        self.url.strip_prefix(BASE).unwrap_or(&self.url)
    }

    fn in_scope(&self, account: &SiteAccount) -> bool {
        match self.selected.as_deref() {
            None | Some(NO_GROUP_ID) => true,
            Some(id) => account.groups.iter().any(|g| g == id),
        }
    }

    fn visible(&self) -> Vec<&SiteAccount> {
        self.accounts.iter().filter(|a| self.in_scope(a)).collect()
    }

    fn shown_status(&self, account: &SiteAccount) -> String {
        let settled = self.refresh_clicked
            && self.settle_after.is_some_and(|k| self.registry_reads >= k);
        if account.status == UPDATING && settled {
            NORMAL.to_string()
        } else {
            account.status.clone()
        }
    }

    fn registry_rows(&mut self) -> Vec<Vec<String>> {
        let rows = self
            .visible()
            .into_iter()
            .map(|a| {
                vec![
                    a.name.clone(),
                    format!("{}円", a.balance),
                    "10/19 07:00".to_string(),
                    self.shown_status(a),
                ]
            })
            .collect();
        if self.refresh_clicked {
            self.registry_reads += 1;
        }
        rows
    }

    fn scope_total(&self) -> i64 {
        self.visible().iter().map(|a| a.balance).sum()
    }
}

/// A mock site for deterministic end-to-end runs.
#[derive(Clone, Default)]
pub struct MockSite {
    state: Arc<Mutex<SiteState>>,
}

impl MockSite {
    pub fn new(groups: &[(&str, &str)], accounts: Vec<SiteAccount>) -> Self {
        let site = Self::default();
        {
            let mut s = site.state.lock().unwrap();
            s.groups = groups
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect();
            s.accounts = accounts;
            s.settle_after = Some(0);
        }
        site
    }

    /// Start the session on `group_id`.
    pub fn selected(self, group_id: &str) -> Self {
        self.state.lock().unwrap().selected = Some(group_id.to_string());
        self
    }

    pub fn settle_after(self, reads: Option<usize>) -> Self {
        self.state.lock().unwrap().settle_after = reads;
        self
    }

    /// Asset history fails to load while `group_id` is selected.
    pub fn broken_group(self, group_id: &str) -> Self {
        self.state.lock().unwrap().broken_group = Some(group_id.to_string());
        self
    }

    pub fn current_group(&self) -> Option<String> {
        self.state.lock().unwrap().selected.clone()
    }

    pub fn selects(&self) -> Vec<String> {
        self.state.lock().unwrap().selects.clone()
    }

    pub fn refresh_clicked(&self) -> bool {
        self.state.lock().unwrap().refresh_clicked
    }
}

#[async_trait]
impl BrowserPage for MockSite {
    async fn goto(&self, url: &str, _wait: WaitUntil) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.url = url.to_string();
        let broken = s.broken_group.is_some() && s.broken_group == s.selected;
        if broken && s.path() == "/bs/history" {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: "HTTP 500".into(),
            }
            .into());
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        let s = self.state.lock().unwrap();
        Ok(match (s.path(), selector) {
            ("/cf", sel::CF_RANGE) => Some("2026/10/01 - 2026/10/31".to_string()),
            _ => None,
        })
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let s = self.state.lock().unwrap();
        Ok(match selector {
            sel::GROUP_OPTIONS => std::iter::once(NO_GROUP_NAME.to_string())
                .chain(s.groups.iter().map(|(_, name)| name.clone()))
                .collect(),
            sel::REFRESH_ALL if s.path() == "/accounts" => vec!["一括更新".to_string()],
            _ => Vec::new(),
        })
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        Ok(self.attributes(selector, name).await?.into_iter().next().flatten())
    }

    async fn attributes(&self, selector: &str, name: &str) -> Result<Vec<Option<String>>> {
        let s = self.state.lock().unwrap();
        Ok(match (selector, name) {
            (sel::GROUP_OPTIONS, "value") => std::iter::once(Some(NO_GROUP_ID.to_string()))
                .chain(s.groups.iter().map(|(id, _)| Some(id.clone())))
                .collect(),
            (sel::GROUP_SELECTED, "value") => s.selected.clone().into_iter().map(Some).collect(),
            (sel::CF_ROWS, sel::CF_ROW_ID_ATTR) if s.path() == "/cf" => vec![Some("tx1".into())],
            (sel::CF_ROWS, "class") if s.path() == "/cf" => {
                vec![Some("transaction_list".into())]
            }
            _ => Vec::new(),
        })
    }

    async fn query_rows(&self, row_selector: &str, _cell_selector: &str) -> Result<Vec<Vec<String>>> {
        let mut s = self.state.lock().unwrap();
        let row = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        let path = s.path().to_string();
        Ok(match (path.as_str(), row_selector) {
            ("/accounts", sel::ACCOUNT_ROWS) => s.registry_rows(),
            ("/bs/history", sel::HISTORY_ROWS) => {
                let total = format!("{}円", s.scope_total());
                vec![
                    row(&["日付", "合計", "預金・現金・暗号資産"]),
                    row(&["10/18(土)", total.as_str(), total.as_str()]),
                ]
            }
            ("/cf", sel::CF_TOTAL_ROWS) => vec![
                row(&["当月収入", "300,000円"]),
                row(&["当月支出", "-120,000円"]),
            ],
            ("/cf", sel::CF_ROWS) => vec![row(&[
                "", "10/05(日)", "コンビニ", "-1,200", "みずほ銀行", "食費", "食料品",
            ])],
            ("/cf/summary", sel::CF_SUMMARY_ROWS) => vec![
                row(&["", "2026/09", "2026/10"]),
                row(&["収入", "300,000", "310,000"]),
                row(&["支出", "-100,000", "-120,000"]),
            ],
            _ => Vec::new(),
        })
    }

    async fn query_tables(
        &self,
        container_selector: &str,
        _heading_selector: &str,
    ) -> Result<Vec<TableSnapshot>> {
        let s = self.state.lock().unwrap();
        if container_selector != sel::BS_SECTIONS {
            return Ok(Vec::new());
        }
        Ok(match s.path() {
            "/bs/portfolio" => vec![TableSnapshot {
                heading: Some("預金・現金・暗号資産".into()),
                header: vec!["種類・名称".into(), "残高".into(), "保有金融機関".into()],
                rows: s
                    .visible()
                    .iter()
                    .map(|a| vec!["普通預金".into(), format!("{}円", a.balance), a.name.clone()])
                    .collect(),
            }],
            "/bs/liability" => vec![TableSnapshot {
                heading: Some("住宅ローン".into()),
                header: vec!["種類".into(), "名称".into(), "残高".into()],
                rows: vec![vec![
                    "住宅ローン".into(),
                    "フラット35".into(),
                    "-20,000,000円".into(),
                ]],
            }],
            _ => Vec::new(),
        })
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if selector == sel::REFRESH_ALL && s.path() == "/accounts" {
            s.refresh_clicked = true;
            s.registry_reads = 0;
            return Ok(());
        }
        Err(ScrapeError::ElementNotFound(selector.to_string()).into())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.selects.push(value.to_string());
        let known = value == NO_GROUP_ID || s.groups.iter().any(|(id, _)| id == value);
        if selector != sel::GROUP_SELECT || !known {
            return Err(ScrapeError::ElementNotFound(format!("{selector} option {value:?}")).into());
        }
        s.selected = Some(value.to_string());
        Ok(())
    }

    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn evaluate(&self, _script: &str, _args: Vec<Value>) -> Result<Value> {
        Err(anyhow!("mock site does not run scripts"))
    }

    async fn set_content(&self, _html: &str) -> Result<()> {
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn storage_state(&self) -> Result<StorageState> {
        Ok(StorageState::default())
    }

    async fn set_default_timeout(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn set_navigation_timeout(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
