//! The semantic query input language.
//!
//! `SemanticQuery` is the public request shape a host decodes from JSON
//! (or builds directly) and hands to the [`crate::executor::Executor`].
//! It is distinct from [`crate::sql::query::Query`], the internal SQL AST
//! that the planner and assembler build from it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::model::types::Granularity;

/// A request against the registered cubes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticQuery {
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub time_dimensions: Vec<TimeDimensionRequest>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order: Vec<OrderEntry>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl SemanticQuery {
    /// Every `cube.field` reference in this query - measures, dimensions,
    /// time dimensions, and (recursively) filter members. Used by the
    /// validator and by primary-cube selection.
    pub fn all_member_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        refs.extend(self.measures.iter().map(String::as_str));
        refs.extend(self.dimensions.iter().map(String::as_str));
        refs.extend(self.time_dimensions.iter().map(|td| td.dimension.as_str()));
        for filter in &self.filters {
            filter.collect_members(&mut refs);
        }
        refs
    }

    /// Whether this query has any `compareDateRange` time dimension.
    pub fn has_comparison(&self) -> bool {
        self.time_dimensions
            .iter()
            .any(|td| td.compare_date_range.is_some())
    }
}

/// `{ field: "asc" | "desc" }` ordering entry. Kept as a `Vec` (not a map)
/// so that explicit ordering of multiple `ORDER BY` keys is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub field: String,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// A requested time dimension: the bucketing granularity plus an optional
/// date range or period-comparison range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeDimensionRequest {
    pub dimension: String,
    #[serde(default)]
    pub granularity: Option<Granularity>,
    #[serde(default)]
    pub date_range: Option<DateRangeInput>,
    #[serde(default)]
    pub compare_date_range: Option<Vec<DateRangeInput>>,
    /// Insert zero-valued rows for missing buckets (§4.13 step 9).
    #[serde(default)]
    pub fill_missing_dates: bool,
    /// Value used to fill missing measure columns; defaults to 0.
    #[serde(default)]
    pub fill_missing_dates_value: Option<JsonValue>,
}

/// Either a literal `[start, end]` pair or a relative token like
/// `"last 7 days"` / `"this month"`, resolved by the Date-Range Parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateRangeInput {
    Literal([String; 2]),
    Relative(String),
}

impl DateRangeInput {
    pub fn canonical_string(&self) -> String {
        match self {
            DateRangeInput::Literal([s, e]) => format!("{s}..{e}"),
            DateRangeInput::Relative(s) => s.clone(),
        }
    }
}

/// A filter tree: a single condition, or a logical AND/OR of sub-filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Condition(Condition),
    And { and: Vec<Filter> },
    Or { or: Vec<Filter> },
}

impl Filter {
    fn collect_members<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Condition(c) => out.push(c.member.as_str()),
            Filter::And { and } => and.iter().for_each(|f| f.collect_members(out)),
            Filter::Or { or } => or.iter().for_each(|f| f.collect_members(out)),
        }
    }

    /// A deterministic string used both for filter-SQL-cache keys and for
    /// cache-key canonicalization sort order (§4.3/§4.5).
    pub fn content_key(&self) -> String {
        match self {
            Filter::Condition(c) => c.content_key(),
            Filter::And { and } => {
                let mut parts: Vec<String> = and.iter().map(Filter::content_key).collect();
                parts.sort();
                format!("and({})", parts.join(","))
            }
            Filter::Or { or } => {
                let mut parts: Vec<String> = or.iter().map(Filter::content_key).collect();
                parts.sort();
                format!("or({})", parts.join(","))
            }
        }
    }
}

/// A single `member operator values` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub member: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<JsonValue>,
    #[serde(default)]
    pub date_range: Option<DateRangeInput>,
}

impl Condition {
    pub fn content_key(&self) -> String {
        let mut values: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        values.sort();
        format!(
            "{}:{:?}:[{}]:{}",
            self.member,
            self.operator,
            values.join(","),
            self.date_range
                .as_ref()
                .map(DateRangeInput::canonical_string)
                .unwrap_or_default()
        )
    }
}

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Set,
    NotSet,
    InDateRange,
    BeforeDate,
    AfterDate,
    ArrayContains,
    ArrayOverlaps,
    ArrayContained,
    Between,
}

/// Per-column display metadata attached to a result (GLOSSARY:
/// Annotation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub measures: Vec<MemberAnnotation>,
    pub dimensions: Vec<MemberAnnotation>,
    pub time_dimensions: Vec<MemberAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAnnotation {
    pub member: String,
    pub title: String,
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
}

/// Cache-hit metadata attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub hit: bool,
    pub cached_at: i64,
    pub ttl_ms: u64,
    pub ttl_remaining_ms: u64,
}

/// The result of executing a [`SemanticQuery`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub data: Vec<serde_json::Map<String, JsonValue>>,
    pub annotation: Annotation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheMetadata>,
}
