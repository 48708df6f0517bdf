//! Date-Range Parser: resolves a [`DateRangeInput`] - either a literal
//! `[start, end]` pair or a relative token like `"last 7 days"` / `"this
//! month"` - into a concrete `(start, end)` pair of `YYYY-MM-DD` strings.

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::PlanError;
use crate::query::DateRangeInput;

/// A resolved, inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: String,
    pub end: String,
}

impl ResolvedRange {
    pub fn canonical_string(&self) -> String {
        format!("{}..{}", self.start, self.end)
    }
}

/// Resolves a date range against `today` (injected so results are
/// deterministic and testable rather than reading the system clock here).
pub fn resolve(input: &DateRangeInput, today: NaiveDate) -> Result<ResolvedRange, PlanError> {
    match input {
        DateRangeInput::Literal([start, end]) => Ok(ResolvedRange {
            start: start.clone(),
            end: end.clone(),
        }),
        DateRangeInput::Relative(token) => resolve_relative(token, today),
    }
}

fn resolve_relative(token: &str, today: NaiveDate) -> Result<ResolvedRange, PlanError> {
    let normalized = token.trim().to_lowercase();

    if let Some(rest) = normalized.strip_prefix("last ") {
        if let Some(n) = rest.strip_suffix(" days").and_then(|s| s.trim().parse::<i64>().ok()) {
            let end = today;
            let start = today - Duration::days(n - 1);
            return Ok(fmt(start, end));
        }
        if let Some(n) = rest.strip_suffix(" weeks").and_then(|s| s.trim().parse::<i64>().ok()) {
            let end = today;
            let start = today - Duration::weeks(n);
            return Ok(fmt(start, end));
        }
        if let Some(n) = rest.strip_suffix(" months").and_then(|s| s.trim().parse::<i64>().ok()) {
            let end = today;
            let start = shift_months(today, -n);
            return Ok(fmt(start, end));
        }
    }

    match normalized.as_str() {
        "today" => Ok(fmt(today, today)),
        "yesterday" => Ok(fmt(today - Duration::days(1), today - Duration::days(1))),
        "this week" => {
            let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            Ok(fmt(start, start + Duration::days(6)))
        }
        "this month" => {
            let start = today.with_day(1).unwrap();
            let end = month_end(start);
            Ok(fmt(start, end))
        }
        "last month" => {
            let this_month_start = today.with_day(1).unwrap();
            let start = shift_months(this_month_start, -1);
            let end = month_end(start);
            Ok(fmt(start, end))
        }
        "this year" => {
            let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap();
            let end = NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap();
            Ok(fmt(start, end))
        }
        _ => Err(PlanError::InvalidDateRange(token.to_string())),
    }
}

fn fmt(start: NaiveDate, end: NaiveDate) -> ResolvedRange {
    ResolvedRange {
        start: start.format("%Y-%m-%d").to_string(),
        end: end.format("%Y-%m-%d").to_string(),
    }
}

fn shift_months(date: NaiveDate, delta: i64) -> NaiveDate {
    let total = date.year() as i64 * 12 + (date.month() as i64 - 1) + delta;
    let year = (total.div_euclid(12)) as i32;
    let month = (total.rem_euclid(12)) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

fn month_end(first_of_month: NaiveDate) -> NaiveDate {
    let next = shift_months(first_of_month, 1);
    next - Duration::days(1)
}
