//! Heuristic turn hints
//!
//! Hints are facts about the question that the planner should honour even
//! when the model forgets them: a date range and an entity name. Callers can
//! pass them explicitly; otherwise date ranges are detected from the text.
//!
//! Recognised date forms:
//! - `2024-03-05`, `2024/3/5` (single day, or a range when two appear)
//! - `2024年3月`, `民國113年3月`, `113年3月` (one month)
//! - `2024年`, `民國113年`, `113年` (one year)
//!
//! Republic-of-China years are converted with `+1911`. A bare two-digit
//! year needs `民國` or a month. Spans such as `近10年` or `113年以來` count
//! years relative to now and are not read as dates.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Offset between ROC (民國) and Gregorian years
pub const ROC_YEAR_OFFSET: i32 = 1911;

/// Optional facts attached to a turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl TurnHints {
    /// Read caller-supplied hints, ignoring keys or values that do not fit
    pub fn from_value(value: &Value) -> Self {
        let date = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .and_then(crate::store::parse_date)
        };
        let entity = value
            .get("entity")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            date_from: date("date_from"),
            date_to: date("date_to"),
            entity,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.date_from.is_none() && self.date_to.is_none() && self.entity.is_none()
    }

    pub fn has_date_range(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }

    /// Fill gaps from `detected`; values already present win
    pub fn or(self, detected: TurnHints) -> TurnHints {
        // A caller-supplied range is kept whole rather than mixed with a detected one
        let (date_from, date_to) = if self.has_date_range() {
            (self.date_from, self.date_to)
        } else {
            (detected.date_from, detected.date_to)
        };
        TurnHints {
            date_from,
            date_to,
            entity: self.entity.or(detected.entity),
        }
    }

    pub fn date_from_arg(&self) -> Option<String> {
        self.date_from.map(format_date)
    }

    pub fn date_to_arg(&self) -> Option<String> {
        self.date_to.map(format_date)
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn date_literal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").expect("valid date literal pattern")
    })
}

fn year_month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^\d])(民國)?\s*(\d{2,4})\s*年(?:\s*(\d{1,2})\s*月)?").expect("valid year pattern")
    })
}

/// Convert a written year to Gregorian. Four digits are Gregorian; two or
/// three digits are ROC years.
fn gregorian_year(digits: &str, roc_marker: bool) -> Option<i32> {
    let year: i32 = digits.parse().ok()?;
    let year = if roc_marker || digits.len() < 4 {
        year + ROC_YEAR_OFFSET
    } else {
        year
    };
    (1912..=2200).contains(&year).then_some(year)
}

/// Words around `N年` that make it a relative span rather than a year
const RELATIVE_BEFORE: [&str; 7] = ["近", "過去", "最近", "未來", "前", "後", "這"];
const RELATIVE_AFTER: [&str; 6] = ["來", "內", "以來", "多", "前", "後"];

fn is_relative_span(question: &str, year_start: usize, match_end: usize) -> bool {
    let before = question[..year_start].trim_end();
    let after = question[match_end..].trim_start();
    RELATIVE_BEFORE.iter().any(|w| before.ends_with(w)) || RELATIVE_AFTER.iter().any(|w| after.starts_with(w))
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

fn year_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

/// Detect an explicit date range in the question
pub fn detect_hints(question: &str) -> TurnHints {
    let mut literals: Vec<NaiveDate> = date_literal_pattern()
        .captures_iter(question)
        .filter_map(|c| {
            let year = c.get(1)?.as_str().parse().ok()?;
            let month = c.get(2)?.as_str().parse().ok()?;
            let day = c.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .collect();

    if !literals.is_empty() {
        literals.sort();
        return TurnHints {
            date_from: literals.first().copied(),
            date_to: literals.last().copied(),
            entity: None,
        };
    }

    let mut ranges: Vec<(NaiveDate, NaiveDate)> = Vec::new();
    for caps in year_month_pattern().captures_iter(question) {
        let Some(digits) = caps.get(2) else { continue };
        let roc_marker = caps.get(1).is_some();
        let month = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok());

        if !roc_marker {
            if digits.as_str().len() == 2 && month.is_none() {
                continue;
            }
            let end = caps.get(0).map_or(digits.end(), |m| m.end());
            if is_relative_span(question, digits.start(), end) {
                continue;
            }
        }

        let Some(year) = gregorian_year(digits.as_str(), roc_marker) else {
            continue;
        };
        let bounds = match month {
            Some(month) => month_bounds(year, month),
            None => year_bounds(year),
        };
        if let Some(bounds) = bounds {
            ranges.push(bounds);
        }
    }

    // Several mentions ("112年到113年") span from the earliest to the latest
    let date_from = ranges.iter().map(|(from, _)| *from).min();
    let date_to = ranges.iter().map(|(_, to)| *to).max();
    TurnHints {
        date_from,
        date_to,
        entity: None,
    }
}

/// Shift both ends of a range outward by `days`
pub fn broaden_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    days: i64,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let delta = chrono::Duration::days(days.max(0));
    (
        from.and_then(|d| d.checked_sub_signed(delta)),
        to.and_then(|d| d.checked_add_signed(delta)),
    )
}
