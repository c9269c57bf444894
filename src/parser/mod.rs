//! Parsing/normalization engine.
//!
//! Pure functions converting the host's localized financial text (yen
//! amounts with 万/億 units, ▲ loss markers, full-width digits, `M/D(曜)`
//! dates) into canonical values. `TextNormalizer` wraps them for the
//! scrapers and counts how many non-empty cells silently degraded.

pub mod date;
pub mod number;

pub use date::{first_full_date, normalize_date_in_range, normalize_date_to_iso, normalize_month_key};
pub use number::{
    format_signed_delta, group_thousands, parse_decimal, parse_large_unit_integer, parse_percentage,
    try_parse_decimal, try_parse_large_unit_integer,
};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

/// Cells the host renders for "no value".
const PLACEHOLDERS: &[&str] = &["-", "ー", "―", "--", "—"];

fn is_placeholder(text: &str) -> bool {
    let t = text.trim();
    t.is_empty() || PLACEHOLDERS.contains(&t)
}

/// Stateful front-end over the pure parsers.
///
/// Keeps the zero-fallback behaviour but records every fallback on a
/// non-empty cell, so a run can report how much data it silently lost.
#[derive(Debug, Default)]
pub struct TextNormalizer {
    degraded: u32,
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty cells that fell back to zero/absent/empty.
    pub fn degraded(&self) -> u32 {
        self.degraded
    }

    /// Record a fallback on `text`; empty text is not counted.
    pub fn record_degraded(&mut self, text: &str, kind: &'static str) {
        if text.trim().is_empty() {
            return;
        }
        self.degraded += 1;
        debug!(text, kind, "Unparsable cell degraded");
    }

    /// Integer amount; unparsable → `0`.
    pub fn integer(&mut self, text: &str) -> i64 {
        match try_parse_large_unit_integer(text) {
            Some(v) => v,
            None => {
                self.record_degraded(text, "integer");
                0
            }
        }
    }

    /// Integer amount where a placeholder cell means "no value".
    pub fn optional_integer(&mut self, text: &str) -> Option<i64> {
        if is_placeholder(text) {
            return None;
        }
        Some(self.integer(text))
    }

    /// Decimal amount; unparsable → `0`.
    pub fn decimal(&mut self, text: &str) -> Decimal {
        match try_parse_decimal(text) {
            Some(v) => v,
            None => {
                self.record_degraded(text, "decimal");
                Decimal::ZERO
            }
        }
    }

    /// Percentage; empty or placeholder → `None` without counting.
    pub fn percentage(&mut self, text: &str) -> Option<Decimal> {
        if is_placeholder(text) {
            return None;
        }
        let parsed = parse_percentage(text);
        if parsed.is_none() {
            self.record_degraded(text, "percentage");
        }
        parsed
    }

    /// Date in a period starting at `range_start`.
    pub fn date(&mut self, text: &str, range_start: NaiveDate) -> String {
        let iso = normalize_date_in_range(text, range_start);
        if iso.is_empty() {
            self.record_degraded(text, "date");
        }
        iso
    }
}
