//! Shared value types used across cube/measure/dimension definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation applied by a simple measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationType {
    Count,
    CountDistinct,
    CountDistinctApprox,
    Sum,
    Avg,
    Min,
    Max,
    /// Raw, un-aggregated numeric expression (e.g. a pre-computed ratio column).
    Number,
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregationType::Count => "count",
            AggregationType::CountDistinct => "countDistinct",
            AggregationType::CountDistinctApprox => "countDistinctApprox",
            AggregationType::Sum => "sum",
            AggregationType::Avg => "avg",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Number => "number",
        };
        write!(f, "{s}")
    }
}

/// Kind of value a dimension projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DimensionKind {
    String,
    Number,
    Boolean,
    Time,
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DimensionKind::String => "string",
            DimensionKind::Number => "number",
            DimensionKind::Boolean => "boolean",
            DimensionKind::Time => "time",
        };
        write!(f, "{s}")
    }
}

/// Time-dimension bucketing granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    /// Parse a granularity from its wire/string name. Unknown names map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "second" => Some(Granularity::Second),
            "minute" => Some(Granularity::Minute),
            "hour" => Some(Granularity::Hour),
            "day" => Some(Granularity::Day),
            "week" => Some(Granularity::Week),
            "month" => Some(Granularity::Month),
            "quarter" => Some(Granularity::Quarter),
            "year" => Some(Granularity::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Second => "second",
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }

    /// Length of one bucket at this granularity, for gap-filling enumeration.
    /// Month/Quarter/Year are calendar-variable, handled specially by the gap filler.
    pub fn is_calendar_variable(&self) -> bool {
        matches!(
            self,
            Granularity::Month | Granularity::Quarter | Granularity::Year
        )
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
