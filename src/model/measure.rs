//! Measure definitions.

use std::sync::Arc;

use super::column::ColumnExpr;
use super::context::QueryContext;
use crate::model::types::AggregationType;
use crate::query::Condition;

/// A closure computing a measure/dimension's underlying column or
/// expression from the query context. Boxed behind `Arc` so cubes stay
/// `Clone` (needed by the registry's `get` returning owned copies) without
/// requiring the closure itself to be `Clone`.
pub type ColumnFn = Arc<dyn Fn(&QueryContext) -> ColumnExpr + Send + Sync>;

/// Ordering/partitioning reference used by window-measure config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRef {
    pub field: String,
    pub direction: crate::query::OrderDirection,
}

/// The arithmetic applied between a post-aggregation window result and its
/// base measure (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOperation {
    Difference,
    Ratio,
    PercentChange,
    Raw,
}

/// Which window function a `Window` measure computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Lag,
    Lead,
    Rank,
    DenseRank,
    RowNumber,
    Ntile,
    FirstValue,
    LastValue,
    MovingAvg,
    MovingSum,
}

impl WindowKind {
    /// Default operation when a measure doesn't specify one (§4.11):
    /// lag/lead default to `difference`, everything else to `raw`.
    pub fn default_operation(&self) -> WindowOperation {
        match self {
            WindowKind::Lag | WindowKind::Lead => WindowOperation::Difference,
            _ => WindowOperation::Raw,
        }
    }
}

/// Configuration for a post-aggregation window measure.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// The measure this window function is computed over.
    pub measure: String,
    pub operation: WindowOperation,
    pub order_by: Vec<OrderRef>,
    pub partition_by: Vec<String>,
    pub offset: Option<i64>,
    pub default_value: Option<serde_json::Value>,
    pub n_tile: Option<u32>,
    pub frame: Option<crate::sql::expr::WindowFrame>,
}

/// A measure: simple aggregate, calculated template, or post-aggregation
/// window function.
#[derive(Clone)]
pub enum MeasureDef {
    Simple {
        kind: AggregationType,
        sql: ColumnFn,
        filters: Vec<Condition>,
    },
    Calculated {
        template: String,
        /// Auto-populated from the template at registration time
        /// (§4.1); a caller-supplied value is overwritten.
        dependencies: Vec<String>,
    },
    Window {
        kind: WindowKind,
        config: Arc<WindowConfig>,
    },
}

impl std::fmt::Debug for MeasureDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasureDef::Simple { kind, filters, .. } => f
                .debug_struct("Simple")
                .field("kind", kind)
                .field("filters", filters)
                .finish(),
            MeasureDef::Calculated {
                template,
                dependencies,
            } => f
                .debug_struct("Calculated")
                .field("template", template)
                .field("dependencies", dependencies)
                .finish(),
            MeasureDef::Window { kind, .. } => {
                f.debug_struct("Window").field("kind", kind).finish()
            }
        }
    }
}

impl MeasureDef {
    pub fn simple(kind: AggregationType, sql: ColumnFn) -> Self {
        MeasureDef::Simple {
            kind,
            sql,
            filters: Vec::new(),
        }
    }

    pub fn calculated(template: impl Into<String>) -> Self {
        MeasureDef::Calculated {
            template: template.into(),
            dependencies: Vec::new(),
        }
    }

    /// References (`{name}` / `{Cube.name}`) found in a calculated
    /// measure's template, in order of first appearance.
    pub fn parse_template_refs(template: &str) -> Vec<String> {
        let mut refs = Vec::new();
        let mut chars = template.char_indices().peekable();
        while let Some((_, c)) = chars.next() {
            if c == '{' {
                let mut name = String::new();
                for (_, c2) in chars.by_ref() {
                    if c2 == '}' {
                        break;
                    }
                    name.push(c2);
                }
                if !name.is_empty() && !refs.contains(&name) {
                    refs.push(name);
                }
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template_refs() {
        let refs = MeasureDef::parse_template_refs("({activeCount}/NULLIF({count},0))*100");
        assert_eq!(refs, vec!["activeCount".to_string(), "count".to_string()]);
    }

    #[test]
    fn test_parse_template_refs_qualified() {
        let refs = MeasureDef::parse_template_refs("{Employees.count} + {Departments.count}");
        assert_eq!(
            refs,
            vec![
                "Employees.count".to_string(),
                "Departments.count".to_string()
            ]
        );
    }

    #[test]
    fn test_window_kind_default_operation() {
        assert_eq!(
            WindowKind::Lag.default_operation(),
            WindowOperation::Difference
        );
        assert_eq!(WindowKind::Rank.default_operation(), WindowOperation::Raw);
    }
}
