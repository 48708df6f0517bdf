//! Cube definitions.

use std::collections::HashMap;
use std::sync::Arc;

use super::context::QueryContext;
use super::dimension::DimensionDef;
use super::join::JoinDef;
use super::measure::MeasureDef;
use crate::sql::{Expr, TableRef};

/// The base table/query a cube's measures and dimensions select from,
/// produced by a cube's `sql(ctx)` closure.
#[derive(Debug, Clone)]
pub struct BaseQueryDefinition {
    pub from: TableRef,
    /// Tenant/security predicate ANDed into every query touching this
    /// cube; `None` only for cubes with no row-level isolation concern.
    pub where_: Option<Expr>,
}

impl BaseQueryDefinition {
    pub fn new(from: TableRef) -> Self {
        Self { from, where_: None }
    }

    pub fn with_security(mut self, predicate: Expr) -> Self {
        self.where_ = Some(predicate);
        self
    }
}

/// A closure producing a cube's base query from the execution context -
/// this is where tenant-scoping predicates get injected (§4.7 security
/// sanity check relies on every cube touched actually doing this).
pub type BaseQueryFn = Arc<dyn Fn(&QueryContext) -> BaseQueryDefinition + Send + Sync>;

/// A registered cube: a named collection of measures, dimensions, and
/// joins grounded on a base query.
#[derive(Clone)]
pub struct Cube {
    pub name: String,
    pub sql: BaseQueryFn,
    pub measures: HashMap<String, MeasureDef>,
    pub dimensions: HashMap<String, DimensionDef>,
    pub joins: HashMap<String, JoinDef>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl std::fmt::Debug for Cube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cube")
            .field("name", &self.name)
            .field("measures", &self.measures.keys().collect::<Vec<_>>())
            .field("dimensions", &self.dimensions.keys().collect::<Vec<_>>())
            .field("joins", &self.joins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Cube {
    pub fn new(name: impl Into<String>, sql: BaseQueryFn) -> Self {
        Self {
            name: name.into(),
            sql,
            measures: HashMap::new(),
            dimensions: HashMap::new(),
            joins: HashMap::new(),
            title: None,
            description: None,
        }
    }

    pub fn with_measure(mut self, name: impl Into<String>, measure: MeasureDef) -> Self {
        self.measures.insert(name.into(), measure);
        self
    }

    pub fn with_dimension(mut self, name: impl Into<String>, dimension: DimensionDef) -> Self {
        self.dimensions.insert(name.into(), dimension);
        self
    }

    pub fn with_join(mut self, name: impl Into<String>, join: JoinDef) -> Self {
        self.joins.insert(name.into(), join);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn primary_key_dimension(&self) -> Option<(&str, &DimensionDef)> {
        self.dimensions
            .iter()
            .find(|(_, d)| d.primary_key)
            .map(|(name, d)| (name.as_str(), d))
    }

    pub fn base_query(&self, ctx: &QueryContext) -> BaseQueryDefinition {
        (self.sql)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::measure::ColumnFn;
    use crate::model::types::{AggregationType, DimensionKind};
    use serde_json::json;

    fn count_fn() -> ColumnFn {
        Arc::new(|_ctx: &QueryContext| {
            super::super::column::ColumnExpr::Column(super::super::column::Column::new(
                "employees",
                "id",
            ))
        })
    }

    #[test]
    fn test_cube_builder_and_base_query() {
        let cube = Cube::new(
            "Employees",
            Arc::new(|_ctx: &QueryContext| {
                BaseQueryDefinition::new(TableRef::new("employees"))
            }),
        )
        .with_measure("count", MeasureDef::simple(AggregationType::Count, count_fn()))
        .with_dimension(
            "id",
            DimensionDef::new(DimensionKind::Number, super::super::dimension::column_fn("employees", "id"))
                .primary_key(),
        );

        assert_eq!(cube.measures.len(), 1);
        let (pk_name, _) = cube.primary_key_dimension().expect("has primary key");
        assert_eq!(pk_name, "id");

        let ctx = QueryContext::new("default", json!({}));
        let base = cube.base_query(&ctx);
        assert_eq!(base.from.table, "employees");
        assert!(base.where_.is_none());
    }
}
