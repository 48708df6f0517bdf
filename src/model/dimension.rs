//! Dimension definitions.

use std::sync::Arc;

use super::column::ColumnExpr;
use super::context::QueryContext;
use crate::model::types::DimensionKind;

use super::measure::ColumnFn;

/// A dimension: a grouped/selected column or expression, optionally the
/// cube's primary key.
#[derive(Clone)]
pub struct DimensionDef {
    pub kind: DimensionKind,
    pub sql: ColumnFn,
    pub primary_key: bool,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl std::fmt::Debug for DimensionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DimensionDef")
            .field("kind", &self.kind)
            .field("primary_key", &self.primary_key)
            .field("title", &self.title)
            .field("description", &self.description)
            .finish()
    }
}

impl DimensionDef {
    pub fn new(kind: DimensionKind, sql: ColumnFn) -> Self {
        Self {
            kind,
            sql,
            primary_key: false,
            title: None,
            description: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
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

    pub fn resolve(&self, ctx: &QueryContext) -> ColumnExpr {
        (self.sql)(ctx)
    }
}

/// Constructs a `sql(ctx)` closure from a fixed column, the common case for
/// a dimension grounded directly on a table column.
pub fn column_fn(table: impl Into<String>, name: impl Into<String>) -> ColumnFn {
    let table = table.into();
    let name = name.into();
    Arc::new(move |_ctx: &QueryContext| {
        ColumnExpr::Column(super::column::Column::new(table.clone(), name.clone()))
    })
}
