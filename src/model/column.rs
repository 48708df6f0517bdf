//! Typed column handles - the input contract a host's schema-introspection
//! layer (e.g. a Drizzle-ORM-style column object) must satisfy.

use crate::sql::Expr;

/// A reference to a single physical column, or a computed SQL fragment
/// standing in for one.
///
/// Mirrors the design note's `Expr = Column(ColumnRef) | Raw(Sql)` sum type:
/// measure/dimension `sql(ctx)` closures return a `ColumnExpr`, not a bare
/// string, so the planner can rewrite table aliases without string surgery.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnExpr {
    /// A column on a concrete table: `table.name`.
    Column(Column),
    /// An arbitrary expression built from the shared SQL AST.
    Expr(Expr),
}

impl ColumnExpr {
    pub fn into_expr(self) -> Expr {
        match self {
            ColumnExpr::Column(c) => c.to_expr(),
            ColumnExpr::Expr(e) => e,
        }
    }
}

impl From<Column> for ColumnExpr {
    fn from(c: Column) -> Self {
        ColumnExpr::Column(c)
    }
}

impl From<Expr> for ColumnExpr {
    fn from(e: Expr) -> Self {
        ColumnExpr::Expr(e)
    }
}

/// A single physical column: table reference, name, and declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub table: String,
    pub name: String,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn to_expr(&self) -> Expr {
        crate::sql::table_col(&self.table, &self.name)
    }
}
