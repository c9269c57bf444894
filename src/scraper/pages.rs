//! Page map: where each entity lives on the host and how to find it.

/// URLs of the host's views, rooted at the configured base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pages {
    base: String,
}

impl Pages {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Account registry with per-account refresh status.
    pub fn accounts(&self) -> String {
        self.url("/accounts")
    }

    pub fn portfolio(&self) -> String {
        self.url("/bs/portfolio")
    }

    pub fn liabilities(&self) -> String {
        self.url("/bs/liability")
    }

    pub fn asset_history(&self) -> String {
        self.url("/bs/history")
    }

    /// Current-month cash flow.
    pub fn cash_flow(&self) -> String {
        self.url("/cf")
    }

    /// Six-month income/expense summary.
    pub fn monthly_summary(&self) -> String {
        self.url("/cf/summary")
    }

    /// Transaction update endpoint.
    pub fn cash_flow_update(&self) -> String {
        self.url("/cf/update")
    }

    pub fn sign_in(&self) -> String {
        self.url("/sign_in")
    }
}

/// CSS selectors, grouped by view.
pub mod selectors {
    // ----- Group scope (present on every signed-in view) -----
    pub const GROUP_SELECT: &str = "#group_id_hash";
    pub const GROUP_OPTIONS: &str = "#group_id_hash option";
    pub const GROUP_SELECTED: &str = "#group_id_hash option[selected]";

    // ----- Accounts -----
    pub const ACCOUNT_ROWS: &str = "#account-table tbody tr";
    pub const ACCOUNT_CELLS: &str = "td";
    pub const REFRESH_ALL: &str = "#js-refresh-all-accounts";

    // ----- Portfolio / liabilities -----
    pub const BS_SECTIONS: &str = "section.bs-detail";
    pub const BS_HEADING: &str = "h1.heading-normal";
    pub const PORTFOLIO_TOTAL: &str = "section.bs-total-assets .heading-radius-box";
    pub const LIABILITY_TOTAL: &str = "section.bs-total-liability .heading-radius-box";

    // ----- Asset history -----
    pub const HISTORY_ROWS: &str = "#bs-history-table tr";

    // ----- Cash flow -----
    pub const CF_RANGE: &str = ".fc-header-title";
    pub const CF_TOTAL_ROWS: &str = "#monthly_total_table tr";
    pub const CF_ROWS: &str = "#cf-detail-table tbody tr.transaction_list";
    pub const CF_ROW_ID_ATTR: &str = "data-transaction-id";
    pub const CF_SUMMARY_ROWS: &str = "#monthly-summary-table tr";

    /// Cells of a labelled row (`th` label followed by `td` values).
    pub const LABELLED_CELLS: &str = "th, td";

    // ----- Session -----
    pub const CSRF_META: &str = "meta[name='csrf-token']";
    pub const SIGNED_IN_MARKER: &str = "#group_id_hash";
    pub const SIGN_IN_EMAIL: &str = "input[name='mfid_user[email]']";
    pub const SIGN_IN_PASSWORD: &str = "input[name='mfid_user[password]']";
    pub const SIGN_IN_SUBMIT: &str = "#submitto";
    pub const OTP_INPUT: &str = "input[name='otp_attempt']";
    pub const OTP_SUBMIT: &str = "#submitto";
    /// Whatever follows the password submit: the code prompt or the
    /// signed-in view.
    pub const SIGN_IN_NEXT: &str = "input[name='otp_attempt'], #group_id_hash";
}
