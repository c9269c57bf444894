//! Short localized dates → ISO `YYYY-MM-DD`.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use super::number::fold_width;

static ISO_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("iso prefix pattern"));
static FULL_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2})").expect("full date pattern"));
/// `M/D`, optionally followed by a weekday such as `(日)`.
static MONTH_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})").expect("month/day pattern"));
static MONTH_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})\s*[/年\-]\s*(\d{1,2})").expect("month key pattern"));

fn iso(year: i32, month: u32, day: u32) -> String {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => String::new(),
    }
}

fn month_day(text: &str) -> Option<(u32, u32)> {
    let caps = MONTH_DAY_RE.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Normalize a date cell to ISO.
///
/// Already-ISO input passes through untouched. `M/D` and `M/D(曜)` take
/// their year from `year_hint` verbatim; no rollover is inferred here (see
/// [`normalize_date_in_range`]). Empty or unrecognised input yields an
/// empty string.
pub fn normalize_date_to_iso(text: &str, year_hint: i32) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if ISO_PREFIX_RE.is_match(trimmed) {
        return trimmed.to_string();
    }

    let folded = fold_width(trimmed);
    if let Some(caps) = FULL_DATE_RE.captures(&folded) {
        let parsed = (
            caps[1].parse::<i32>(),
            caps[2].parse::<u32>(),
            caps[3].parse::<u32>(),
        );
        return match parsed {
            (Ok(y), Ok(m), Ok(d)) => iso(y, m, d),
            _ => String::new(),
        };
    }

    match month_day(&folded) {
        Some((month, day)) => iso(year_hint, month, day),
        None => String::new(),
    }
}

/// Normalize a short date that belongs to a period starting at
/// `range_start`. A month numerically smaller than the start month is
/// taken to fall in the following year (a December-to-January period).
pub fn normalize_date_in_range(text: &str, range_start: NaiveDate) -> String {
    let folded = fold_width(text.trim());
    let year = match month_day(&folded) {
        Some((month, _)) if month < range_start.month() => range_start.year() + 1,
        _ => range_start.year(),
    };
    normalize_date_to_iso(text, year)
}

/// `2026/05`, `2026年5月`, `2026-05` → `2026-05`.
pub fn normalize_month_key(text: &str) -> Option<String> {
    let folded = fold_width(text);
    let caps = MONTH_KEY_RE.captures(&folded)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(format!("{year:04}-{month:02}"))
}

/// Parse the first full `YYYY/MM/DD` (or ISO) date found in `text`.
pub fn first_full_date(text: &str) -> Option<NaiveDate> {
    static ANY_FULL_DATE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d{4})[/\-](\d{1,2})[/\-](\d{1,2})").expect("full date pattern"));
    let folded = fold_width(text);
    let caps = ANY_FULL_DATE_RE.captures(&folded)?;
    NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
}
