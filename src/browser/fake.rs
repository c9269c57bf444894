//! Scripted in-memory page for module tests.
//!
//! Selectors are plain map keys; nothing is actually matched against a DOM.
//! Row sequences registered for the same selector are served one per read
//! (the last one sticks) so polling loops can be driven deterministically.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BrowserDriver, BrowserPage, ContextOptions, StorageState, TableSnapshot, WaitUntil};
use crate::types::ScrapeError;

const GROUP_SELECT: &str = "#group_id_hash";
const GROUP_SELECTED: &str = "#group_id_hash option[selected]";

#[derive(Default)]
struct FakeState {
    url: String,
    texts: HashMap<String, Vec<String>>,
    attributes: HashMap<(String, String), Vec<Option<String>>>,
    rows: HashMap<String, VecDeque<Vec<Vec<String>>>>,
    tables: HashMap<String, Vec<TableSnapshot>>,
    elements: HashSet<String>,
    eval_results: VecDeque<Value>,
    evaluations: Vec<(String, Vec<Value>)>,
    failing_urls: HashSet<String>,
    failing_selects: HashSet<String>,
    frozen_scope: bool,
    screenshot: Vec<u8>,
    storage: StorageState,
    calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_text(self, selector: &str, text: &str) -> Self {
        self.with_texts(selector, &[text])
    }

    pub fn with_texts(self, selector: &str, texts: &[&str]) -> Self {
        self.with(|s| {
            s.texts.insert(
                selector.to_string(),
                texts.iter().map(|t| t.to_string()).collect(),
            );
        })
    }

    pub fn with_attribute(self, selector: &str, name: &str, value: &str) -> Self {
        self.with_attributes(selector, name, &[Some(value)])
    }

    pub fn with_attributes(self, selector: &str, name: &str, values: &[Option<&str>]) -> Self {
        self.with(|s| {
            s.attributes.insert(
                (selector.to_string(), name.to_string()),
                values.iter().map(|v| v.map(str::to_string)).collect(),
            );
        })
    }

    /// Queue one snapshot of `selector`'s rows.
    pub fn with_rows(self, selector: &str, rows: &[&[&str]]) -> Self {
        let frame: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        self.with(|s| {
            s.rows
                .entry(selector.to_string())
                .or_default()
                .push_back(frame);
        })
    }

    pub fn with_tables(self, selector: &str, tables: Vec<TableSnapshot>) -> Self {
        self.with(|s| {
            s.tables.insert(selector.to_string(), tables);
        })
    }

    /// Make `selector` satisfy `wait_for` and `click`.
    pub fn with_element(self, selector: &str) -> Self {
        self.with(|s| {
            s.elements.insert(selector.to_string());
        })
    }

    pub fn with_eval_result(self, value: Value) -> Self {
        self.with(|s| s.eval_results.push_back(value))
    }

    pub fn with_storage(self, storage: StorageState) -> Self {
        self.with(|s| s.storage = storage)
    }

    pub fn with_screenshot(self, png: &[u8]) -> Self {
        self.with(|s| s.screenshot = png.to_vec())
    }

    pub fn failing_goto(self, url: &str) -> Self {
        self.with(|s| {
            s.failing_urls.insert(url.to_string());
        })
    }

    /// `select_option` with this value fails.
    pub fn failing_select(self, value: &str) -> Self {
        self.with(|s| {
            s.failing_selects.insert(value.to_string());
        })
    }

    /// The group selector accepts selections but the view never follows.
    pub fn with_frozen_scope(self) -> Self {
        self.with(|s| s.frozen_scope = true)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn evaluations(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().evaluations.clone()
    }

    fn log(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str, _wait: WaitUntil) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("goto {url}"));
        if s.failing_urls.contains(url) {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_RESET".into(),
            }
            .into());
        }
        s.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        let s = self.state.lock().unwrap();
        Ok(s.texts.get(selector).and_then(|t| t.first().cloned()))
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let s = self.state.lock().unwrap();
        Ok(s.texts.get(selector).cloned().unwrap_or_default())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let s = self.state.lock().unwrap();
        Ok(s
            .attributes
            .get(&(selector.to_string(), name.to_string()))
            .and_then(|v| v.first().cloned().flatten()))
    }

    async fn attributes(&self, selector: &str, name: &str) -> Result<Vec<Option<String>>> {
        let s = self.state.lock().unwrap();
        Ok(s
            .attributes
            .get(&(selector.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn query_rows(&self, row_selector: &str, _cell_selector: &str) -> Result<Vec<Vec<String>>> {
        let mut s = self.state.lock().unwrap();
        let Some(frames) = s.rows.get_mut(row_selector) else {
            return Ok(Vec::new());
        };
        if frames.len() > 1 {
            Ok(frames.pop_front().unwrap_or_default())
        } else {
            Ok(frames.front().cloned().unwrap_or_default())
        }
    }

    async fn query_tables(
        &self,
        container_selector: &str,
        _heading_selector: &str,
    ) -> Result<Vec<TableSnapshot>> {
        let s = self.state.lock().unwrap();
        Ok(s.tables.get(container_selector).cloned().unwrap_or_default())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("click {selector}"));
        if !s.elements.contains(selector) {
            return Err(ScrapeError::ElementNotFound(selector.to_string()).into());
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.log(format!("fill {selector} {value}"));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("select {selector} {value}"));
        if s.failing_selects.contains(value) {
            return Err(ScrapeError::ElementNotFound(format!("{selector} option {value:?}")).into());
        }
        if selector == GROUP_SELECT && !s.frozen_scope {
            s.attributes.insert(
                (GROUP_SELECTED.to_string(), "value".to_string()),
                vec![Some(value.to_string())],
            );
        }
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let s = self.state.lock().unwrap();
        let present = s.elements.contains(selector)
            || s.texts.contains_key(selector)
            || s.rows.contains_key(selector);
        if present {
            Ok(())
        } else {
            Err(ScrapeError::Timeout {
                what: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
            .into())
        }
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        let mut s = self.state.lock().unwrap();
        s.evaluations.push((script.to_string(), args));
        s.eval_results
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted evaluate result"))
    }

    async fn set_content(&self, html: &str) -> Result<()> {
        self.log(format!("set_content {} bytes", html.len()));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let s = self.state.lock().unwrap();
        if s.screenshot.is_empty() {
            return Err(anyhow!("page has no screenshot"));
        }
        Ok(s.screenshot.clone())
    }

    async fn storage_state(&self) -> Result<StorageState> {
        Ok(self.state.lock().unwrap().storage.clone())
    }

    async fn set_default_timeout(&self, timeout: Duration) -> Result<()> {
        self.log(format!("set_default_timeout {}", timeout.as_millis()));
        Ok(())
    }

    async fn set_navigation_timeout(&self, timeout: Duration) -> Result<()> {
        self.log(format!("set_navigation_timeout {}", timeout.as_millis()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log("close".to_string());
        Ok(())
    }
}

type OpenLog = Arc<Mutex<Vec<(ContextOptions, Option<StorageState>)>>>;

/// Driver handing out blank `FakePage`s and recording what it was asked.
#[derive(Default)]
pub struct FakeDriver {
    opened: OpenLog,
    pages: Arc<Mutex<Vec<FakePage>>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> OpenLog {
        Arc::clone(&self.opened)
    }

    pub fn pages(&self) -> Arc<Mutex<Vec<FakePage>>> {
        Arc::clone(&self.pages)
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn new_page(
        &self,
        options: &ContextOptions,
        state: Option<&StorageState>,
    ) -> Result<Box<dyn BrowserPage>> {
        self.opened
            .lock()
            .unwrap()
            .push((options.clone(), state.cloned()));
        let page = FakePage::new();
        self.pages.lock().unwrap().push(page.clone());
        Ok(Box::new(page))
    }
}
