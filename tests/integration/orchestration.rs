//! Full-pipeline scenarios: refresh, global phase, every group, restore.

use chrono::NaiveDate;
use std::time::Duration;
use uuid::Uuid;

use harvester::browser::{BrowserPage, WaitUntil};
use harvester::scraper::extract::{count_updating, status_cells};
use harvester::scraper::pages::selectors as sel;
use harvester::scraper::{capture_on_error, run_scrape, Pages, ScraperSettings};
use harvester::storage;
use harvester::types::{AccountStatus, ScrapeError, NO_GROUP_ID};

use crate::mock_site::{MockSite, SiteAccount, BASE};

fn settings(skip_refresh: bool) -> ScraperSettings {
    ScraperSettings {
        base_url: BASE.to_string(),
        skip_refresh,
        refresh_poll_interval: Duration::from_millis(1),
        refresh_timeout: Duration::from_secs(2),
        group_switch_timeout: Duration::from_millis(50),
        reference_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
    }
}

/// Two groups over three accounts; the session starts on "家族".
fn household() -> MockSite {
    MockSite::new(
        &[("g1", "家族"), ("g2", "個人")],
        vec![
            SiteAccount::new("みずほ銀行", 1_000_000, &["g1"]),
            SiteAccount::new("楽天証券", 500_000, &["g1"]).updating(),
            SiteAccount::new("三井住友カード", 20_000, &["g2"]),
        ],
    )
    .selected("g1")
}

#[tokio::test]
async fn test_full_run_invariants() {
    let site = household().settle_after(Some(2));
    let run_id = Uuid::new_v4();

    let result = run_scrape(&site, &settings(false), run_id).await.unwrap();

    assert!(site.refresh_clicked());
    assert_eq!(result.run_id, run_id);

    // exactly one current group, and it is the one the session started on
    let current: Vec<_> = result
        .group_data_list
        .iter()
        .filter(|g| g.group.is_current)
        .collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].group.id, "g1");
    assert_eq!(result.default_group.as_ref().unwrap().id, "g1");

    // pseudo-group sees every account
    let pseudo = result.no_group_data().unwrap();
    assert_eq!(pseudo.accounts.len(), 3);
    for g in &result.group_data_list {
        assert!(g.accounts.len() <= pseudo.accounts.len());
    }

    // session scope restored
    assert_eq!(site.current_group().as_deref(), Some("g1"));
    assert!(result.check_consistency().is_empty());
}

#[tokio::test]
async fn test_global_phase_reads_default_scope() {
    let site = household();
    let result = run_scrape(&site, &settings(false), Uuid::new_v4())
        .await
        .unwrap();
    let global = &result.global_data;

    assert_eq!(global.accounts.len(), 2);
    assert!(global.accounts.iter().all(|a| a.status == AccountStatus::Normal));
    assert!(global.refresh_issues.is_empty());
    assert_eq!(global.portfolio.total, 1_500_000);
    assert_eq!(global.liabilities.total, 20_000_000);
    assert_eq!(global.cash_flow.month, "2026-10");
    assert_eq!(global.cash_flow.income, 300_000);
    assert_eq!(global.cash_flow.expense, 120_000);
    assert_eq!(global.cash_flow.items[0].id, "tx1");
    assert_eq!(global.cash_flow.items[0].date, "2026-10-05");
    assert_eq!(result.degraded_parses, 0);
}

#[tokio::test]
async fn test_group_entities_follow_scope() {
    let site = household();
    let result = run_scrape(&site, &settings(true), Uuid::new_v4())
        .await
        .unwrap();

    let by_id = |id: &str| {
        result
            .group_data_list
            .iter()
            .find(|g| g.group.id == id)
            .unwrap()
    };
    assert_eq!(by_id("g2").accounts.len(), 1);
    assert_eq!(by_id("g2").portfolio.total, 20_000);
    assert_eq!(by_id("g1").asset_history[0].total, 1_500_000);
    assert_eq!(by_id(NO_GROUP_ID).asset_history[0].total, 1_520_000);
    assert_eq!(by_id("g1").monthly_summary.len(), 2);
    assert_eq!(by_id("g1").monthly_summary[1].month, "2026-10");
}

#[tokio::test]
async fn test_updating_count_is_exact() {
    let site = MockSite::new(
        &[],
        vec![
            SiteAccount::new("A", 1, &[]).updating(),
            SiteAccount::new("B", 1, &[]).updating(),
            SiteAccount::new("C", 1, &[]).with_status("更新中 → 一時停止中"),
        ],
    );
    site.goto(&Pages::new(BASE).accounts(), WaitUntil::Load)
        .await
        .unwrap();
    let rows = site
        .query_rows(sel::ACCOUNT_ROWS, sel::ACCOUNT_CELLS)
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(count_updating(&status_cells(&rows)), 2);
}

#[tokio::test]
async fn test_refresh_timeout_reports_stragglers() {
    let site = MockSite::new(
        &[("g1", "家族")],
        vec![
            SiteAccount::new("A", 1_000, &["g1"]).updating(),
            SiteAccount::new("B", 2_000, &["g1"]).updating(),
            SiteAccount::new("C", 3_000, &["g1"]),
        ],
    )
    .selected("g1")
    .settle_after(None);
    let mut settings = settings(false);
    settings.refresh_timeout = Duration::from_millis(20);

    let result = run_scrape(&site, &settings, Uuid::new_v4()).await.unwrap();
    let issues = &result.global_data.refresh_issues;
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().all(|i| i.status == AccountStatus::Updating));
    let names: Vec<_> = issues.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
}

#[tokio::test]
async fn test_broken_group_fails_run_and_restores_scope() {
    let site = household().broken_group("g2");
    let err = run_scrape(&site, &settings(true), Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("g2"));
    assert!(matches!(
        err.downcast_ref::<ScrapeError>(),
        Some(ScrapeError::Navigation { .. })
    ));
    assert_eq!(site.current_group().as_deref(), Some("g1"));
}

#[tokio::test]
async fn test_no_selected_group_uses_pseudo_group() {
    let site = MockSite::new(
        &[("g1", "家族")],
        vec![SiteAccount::new("A", 1_000, &["g1"]), SiteAccount::new("B", 2_000, &[])],
    );
    let result = run_scrape(&site, &settings(true), Uuid::new_v4())
        .await
        .unwrap();

    assert!(result.default_group.is_none());
    let pseudo = result.no_group_data().unwrap();
    assert!(pseudo.group.is_current);
    assert_eq!(pseudo.accounts.len(), 2);
    assert_eq!(site.current_group().as_deref(), Some(NO_GROUP_ID));
    assert_eq!(site.selects(), vec!["g1".to_string(), NO_GROUP_ID.to_string()]);
}

#[tokio::test]
async fn test_failed_run_screenshot_and_result_hand_off() {
    let dir = tempfile::tempdir().unwrap();
    let shots = dir.path().join("shots");
    let output = dir.path().join("out").join("scrape_result.json");

    let broken = household().broken_group("g1");
    let err = capture_on_error(
        &broken,
        Some(&shots),
        run_scrape(&broken, &settings(true), Uuid::new_v4()),
    )
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("HTTP 500"));
    assert_eq!(std::fs::read_dir(&shots).unwrap().count(), 1);

    let site = household();
    let result = capture_on_error(
        &site,
        Some(&shots),
        run_scrape(&site, &settings(true), Uuid::new_v4()),
    )
    .await
    .unwrap();
    storage::save_result(&result, &output).unwrap();
    let loaded = storage::load_result(&output).unwrap().unwrap();
    assert_eq!(loaded, result);
    assert_eq!(std::fs::read_dir(&shots).unwrap().count(), 1);
}

#[tokio::test]
async fn test_every_group_visit_returns_to_starting_scope() {
    let site = household();
    run_scrape(&site, &settings(true), Uuid::new_v4())
        .await
        .unwrap();

    // each switch away from "g1" is paired with a switch back before the next
    let selects = site.selects();
    assert_eq!(selects.len() % 2, 0);
    let mut visited: Vec<&str> = Vec::new();
    for pair in selects.chunks(2) {
        assert_ne!(pair[0], "g1");
        assert_eq!(pair[1], "g1");
        visited.push(pair[0].as_str());
    }
    visited.sort();
    assert_eq!(visited, vec![NO_GROUP_ID, "g2"]);
    assert_eq!(site.current_group().as_deref(), Some("g1"));
}
