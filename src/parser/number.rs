//! Localized numeric text → canonical values.
//!
//! Every parser here is total: unparsable input degrades to `0` (integers,
//! decimals) or `None` (percentages) instead of failing, so a single odd
//! cell never aborts a page. Use the `try_*` variants when the caller needs
//! to tell "zero" from "could not parse".

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

const HUNDRED_MILLION: i64 = 100_000_000;
const TEN_THOUSAND: i64 = 10_000;

static HUNDRED_MILLION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)億").expect("hundred-million pattern"));
static TEN_THOUSAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)万").expect("ten-thousand pattern"));

/// ASCII minus, minus sign, full-width hyphen-minus, and the triangle the
/// host uses for losses. Any one of them anywhere makes the value negative.
const NEGATIVE_MARKERS: &[char] = &['-', '−', '－', '▲'];

/// Fold full-width digits and punctuation to ASCII.
pub(crate) fn fold_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '，' => ',',
            '．' => '.',
            '＋' => '+',
            '／' => '/',
            '　' => ' ',
            _ => c,
        })
        .collect()
}

fn is_negative(text: &str) -> bool {
    text.chars().any(|c| NEGATIVE_MARKERS.contains(&c))
}

/// Currency symbols, separators, whitespace and sign markers.
fn is_stripped(c: char) -> bool {
    matches!(c, '¥' | '￥' | '円' | ',' | '+') || c.is_whitespace() || NEGATIVE_MARKERS.contains(&c)
}

fn ascii_digits(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Parse an integer amount that may use 万 (10^4) / 億 (10^8) units.
///
/// Returns `None` when the text carries no digits at all, the value does
/// not fit in an `i64`, or a unit carries a fractional prefix (`1.5万`).
pub fn try_parse_large_unit_integer(text: &str) -> Option<i64> {
    let folded = fold_width(text);
    let negative = is_negative(&folded);
    let cleaned: String = folded.chars().filter(|c| !is_stripped(*c)).collect();

    let magnitude = if cleaned.contains('億') || cleaned.contains('万') {
        if cleaned.contains('.') {
            return None;
        }
        let mut rest = cleaned;
        let mut total: i64 = 0;
        let mut matched = false;

        for (re, scale) in [(&*HUNDRED_MILLION_RE, HUNDRED_MILLION), (&*TEN_THOUSAND_RE, TEN_THOUSAND)] {
            let Some(caps) = re.captures(&rest) else {
                continue;
            };
            let range = caps.get(0)?.range();
            let units: i64 = caps[1].parse().ok()?;
            total = total.checked_add(units.checked_mul(scale)?)?;
            rest.replace_range(range, "");
            matched = true;
        }

        // Whatever digits survive sit below the smallest unit.
        let trailing = ascii_digits(&rest);
        if !trailing.is_empty() {
            total = total.checked_add(trailing.parse().ok()?)?;
            matched = true;
        }

        if !matched {
            return None;
        }
        total
    } else {
        let digits = ascii_digits(&cleaned);
        if digits.is_empty() {
            return None;
        }
        digits.parse::<i64>().ok()?
    };

    Some(if negative { -magnitude } else { magnitude })
}

/// `try_parse_large_unit_integer`, degrading to `0`.
pub fn parse_large_unit_integer(text: &str) -> i64 {
    try_parse_large_unit_integer(text).unwrap_or(0)
}

/// Parse a decimal amount (no unit expansion) with the integer parser's
/// sign and symbol rules.
pub fn try_parse_decimal(text: &str) -> Option<Decimal> {
    let folded = fold_width(text);
    let negative = is_negative(&folded);
    let cleaned: String = folded
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -value } else { value })
}

/// `try_parse_decimal`, degrading to `0`.
pub fn parse_decimal(text: &str) -> Decimal {
    try_parse_decimal(text).unwrap_or(Decimal::ZERO)
}

/// Parse a percentage such as `12.5%`, `-3.1％` or `▲0.8%`.
///
/// `None` means "no percentage", which is not the same thing as `0%`.
pub fn parse_percentage(text: &str) -> Option<Decimal> {
    let folded = fold_width(text);
    let cleaned: String = folded
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '%' | '％' | ','))
        .collect();

    let mut chars = cleaned.chars();
    let (negative, body) = match chars.next() {
        None => return None,
        Some(c) if NEGATIVE_MARKERS.contains(&c) => (true, chars.as_str()),
        Some('+') => (false, chars.as_str()),
        Some(_) => (false, cleaned.as_str()),
    };

    let value = Decimal::from_str(body).ok()?;
    Some(if negative { -value } else { value })
}

/// Insert thousands separators into a non-negative integer.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Render `current - previous` the way the host shows day-over-day change:
/// `+¥1,000` for gains (and zero), `¥-1,000` for losses.
pub fn format_signed_delta(current: &str, previous: &str) -> String {
    let delta = parse_large_unit_integer(current).saturating_sub(parse_large_unit_integer(previous));
    if delta >= 0 {
        format!("+¥{}", group_thousands(delta.unsigned_abs()))
    } else {
        format!("¥-{}", group_thousands(delta.unsigned_abs()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
