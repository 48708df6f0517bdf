//! Gap Filler (§4.13 step 9, `fillMissingDates`): inserts rows for time
//! buckets with no data, holding dimensions at their requested values and
//! filling measure columns with a configured default (0 unless
//! overridden).

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::{Map, Value as JsonValue};

use crate::error::PlanError;
use crate::model::types::Granularity;

/// Enumerates every bucket boundary (formatted `YYYY-MM-DD`) from `start`
/// to `end` inclusive, at `granularity`. Sub-day granularities
/// (`second`/`minute`/`hour`) can't be expressed as whole-day buckets, so
/// `fillMissingDates` is rejected outright for them rather than silently
/// gap-filling at the wrong resolution.
pub fn enumerate_buckets(
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
) -> Result<Vec<String>, PlanError> {
    if matches!(
        granularity,
        Granularity::Second | Granularity::Minute | Granularity::Hour
    ) {
        return Err(PlanError::InvalidDateRange(format!(
            "fillMissingDates does not support sub-day granularity '{granularity:?}'"
        )));
    }
    let mut buckets = Vec::new();
    let mut current = start;
    while current <= end {
        buckets.push(current.format("%Y-%m-%d").to_string());
        current = step(current, granularity);
    }
    Ok(buckets)
}

fn step(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Second | Granularity::Minute | Granularity::Hour | Granularity::Day => {
            date + Duration::days(1)
        }
        Granularity::Week => date + Duration::weeks(1),
        Granularity::Month => {
            let total = date.year() as i64 * 12 + date.month() as i64;
            let year = ((total) / 12) as i32;
            let month = ((total) % 12) as u32 + 1;
            NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
        }
        Granularity::Quarter => {
            let total = date.year() as i64 * 12 + date.month() as i64 + 2;
            let year = (total / 12) as i32;
            let month = (total % 12) as u32 + 1;
            NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
        }
        Granularity::Year => NaiveDate::from_ymd_opt(date.year() + 1, 1, 1).unwrap_or(date),
    }
}

/// Fills `rows` so every bucket in `expected_buckets` is present for every
/// distinct combination of `dimension_columns` values present in `rows`,
/// inserting a synthetic row (all measure columns set to `fill_value`,
/// default `0`, dimension columns copied from the group) for any missing
/// bucket. Gap-filling is scoped per dimension-combination so rows from
/// different groups sharing a bucket don't collapse into each other.
pub fn fill_missing(
    rows: Vec<Map<String, JsonValue>>,
    time_dimension_column: &str,
    dimension_columns: &[String],
    expected_buckets: &[String],
    measure_columns: &[String],
    fill_value: Option<JsonValue>,
) -> Vec<Map<String, JsonValue>> {
    let default_fill = fill_value.unwrap_or(JsonValue::from(0));

    let mut groups: std::collections::BTreeMap<Vec<String>, std::collections::HashMap<String, Map<String, JsonValue>>> =
        std::collections::BTreeMap::new();

    for row in rows {
        let Some(bucket) = row.get(time_dimension_column).and_then(JsonValue::as_str) else {
            continue;
        };
        let bucket = bucket.to_string();
        let key: Vec<String> = dimension_columns
            .iter()
            .map(|col| {
                row.get(col)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect();
        groups.entry(key).or_default().insert(bucket, row);
    }

    if groups.is_empty() {
        groups.insert(vec![String::new(); dimension_columns.len()], std::collections::HashMap::new());
    }

    let mut out = Vec::new();
    for (_key, mut by_bucket) in groups {
        let dimension_values: Option<Vec<JsonValue>> = by_bucket
            .values()
            .next()
            .map(|sample| dimension_columns.iter().map(|col| sample.get(col).cloned().unwrap_or(JsonValue::Null)).collect());

        for bucket in expected_buckets {
            if let Some(row) = by_bucket.remove(bucket) {
                out.push(row);
            } else {
                let mut row = Map::new();
                row.insert(time_dimension_column.to_string(), JsonValue::String(bucket.clone()));
                if let Some(values) = &dimension_values {
                    for (col, value) in dimension_columns.iter().zip(values) {
                        row.insert(col.clone(), value.clone());
                    }
                }
                for measure in measure_columns {
                    row.insert(measure.clone(), default_fill.clone());
                }
                out.push(row);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enumerate_daily_buckets() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();
        let buckets = enumerate_buckets(start, end, Granularity::Day).unwrap();
        assert_eq!(buckets, vec!["2026-01-01", "2026-01-02", "2026-01-03"]);
    }

    #[test]
    fn test_enumerate_monthly_buckets() {
        let start = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        let buckets = enumerate_buckets(start, end, Granularity::Month).unwrap();
        assert_eq!(buckets, vec!["2026-11-01", "2026-12-01", "2027-01-01"]);
    }

    #[test]
    fn test_enumerate_rejects_sub_day_granularity() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();
        assert!(enumerate_buckets(start, end, Granularity::Hour).is_err());
        assert!(enumerate_buckets(start, end, Granularity::Minute).is_err());
        assert!(enumerate_buckets(start, end, Granularity::Second).is_err());
    }

    #[test]
    fn test_fill_missing_inserts_zero_rows() {
        let mut present = Map::new();
        present.insert("day".into(), json!("2026-01-01"));
        present.insert("count".into(), json!(5));
        let rows = vec![present];

        let filled = fill_missing(
            rows,
            "day",
            &[],
            &["2026-01-01".into(), "2026-01-02".into()],
            &["count".to_string()],
            None,
        );
        assert_eq!(filled.len(), 2);
        assert_eq!(filled[1]["count"], json!(0));
        assert_eq!(filled[1]["day"], json!("2026-01-02"));
    }

    #[test]
    fn test_fill_missing_respects_custom_value() {
        let filled = fill_missing(
            Vec::new(),
            "day",
            &[],
            &["2026-01-01".into()],
            &["revenue".to_string()],
            Some(json!(null)),
        );
        assert_eq!(filled[0]["revenue"], JsonValue::Null);
    }

    #[test]
    fn test_fill_missing_scopes_gap_fill_per_dimension_group() {
        let mut row_a = Map::new();
        row_a.insert("day".into(), json!("2026-01-01"));
        row_a.insert("region".into(), json!("east"));
        row_a.insert("count".into(), json!(5));

        let mut row_b = Map::new();
        row_b.insert("day".into(), json!("2026-01-02"));
        row_b.insert("region".into(), json!("west"));
        row_b.insert("count".into(), json!(9));

        let filled = fill_missing(
            vec![row_a, row_b],
            "day",
            &["region".to_string()],
            &["2026-01-01".into(), "2026-01-02".into()],
            &["count".to_string()],
            None,
        );

        // Each of the two distinct regions gets its own complete bucket run,
        // so the overall result has 4 rows, not 2.
        assert_eq!(filled.len(), 4);
        let east_rows: Vec<_> = filled.iter().filter(|r| r["region"] == json!("east")).collect();
        let west_rows: Vec<_> = filled.iter().filter(|r| r["region"] == json!("west")).collect();
        assert_eq!(east_rows.len(), 2);
        assert_eq!(west_rows.len(), 2);
        // The synthetic gap-filled row for "east" on 2026-01-02 keeps the
        // "east" dimension value rather than bleeding in "west"'s data.
        let east_gap = east_rows.iter().find(|r| r["day"] == json!("2026-01-02")).unwrap();
        assert_eq!(east_gap["count"], json!(0));
        assert_eq!(east_gap["region"], json!("east"));
    }
}
