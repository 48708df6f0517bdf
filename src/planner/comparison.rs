//! Comparison Expander (§4.12): turns a query with one `compareDateRange`
//! time dimension into N independent per-period queries, then merges
//! their results back together tagged by period.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use crate::error::PlanError;
use crate::query::{DateRangeInput, QueryResult, SemanticQuery, TimeDimensionRequest};

use super::date_range;

/// One period of a comparison, with the query to run for it.
#[derive(Debug, Clone)]
pub struct ComparisonPeriod {
    pub query: SemanticQuery,
    pub period_index: usize,
    pub period_label: String,
}

/// Splits `query` into one [`ComparisonPeriod`] per entry of its
/// `compareDateRange` time dimension. Each period's query is a full clone
/// with that one time dimension pinned to a scalar `dateRange` and
/// defaulted to `day` granularity if none was requested (§4.12).
pub fn expand(query: &SemanticQuery, today: NaiveDate) -> Result<Vec<ComparisonPeriod>, PlanError> {
    let td_index = query
        .time_dimensions
        .iter()
        .position(|td| td.compare_date_range.is_some())
        .ok_or_else(|| PlanError::InvalidDateRange("no compareDateRange requested".into()))?;

    let ranges = query.time_dimensions[td_index]
        .compare_date_range
        .clone()
        .expect("checked above");

    let mut periods = Vec::with_capacity(ranges.len());
    for (index, range) in ranges.iter().enumerate() {
        let resolved = date_range::resolve(range, today)?;
        let mut cloned = query.clone();
        let td = &mut cloned.time_dimensions[td_index];
        td.compare_date_range = None;
        td.date_range = Some(DateRangeInput::Literal([
            resolved.start.clone(),
            resolved.end.clone(),
        ]));
        if td.granularity.is_none() {
            td.granularity = Some(crate::model::types::Granularity::Day);
        }
        periods.push(ComparisonPeriod {
            query: cloned,
            period_index: index,
            period_label: range.canonical_string(),
        });
    }
    Ok(periods)
}

/// Merges each period's result into one [`QueryResult`], stamping
/// `periodIndex`/`periodLabel` onto every row and sorting by period then
/// by the (single) time dimension's value.
pub fn merge(
    time_dimension: &TimeDimensionRequest,
    results: Vec<(ComparisonPeriod, QueryResult)>,
) -> QueryResult {
    let time_column = time_dimension.dimension.replace('.', "_");
    let mut merged = QueryResult::default();
    let mut rows: Vec<(usize, Option<String>, serde_json::Map<String, JsonValue>)> = Vec::new();

    for (period, result) in &results {
        for row in &result.data {
            let mut tagged = row.clone();
            tagged.insert("periodIndex".into(), JsonValue::from(period.period_index));
            tagged.insert(
                "periodLabel".into(),
                JsonValue::String(period.period_label.clone()),
            );
            let time_value = tagged
                .get(&time_column)
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            rows.push((period.period_index, time_value, tagged));
        }
    }

    rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    merged.data = rows.into_iter().map(|(_, _, row)| row).collect();
    if let Some((_, first)) = results.first() {
        merged.annotation = first.annotation.clone();
    }
    merged
}
