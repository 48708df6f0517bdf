//! SQLite SQL dialect.
//!
//! SQLite differences from ANSI:
//! - ANSI identifier quoting (`"`)
//! - Boolean is stored as 0/1 (no native BOOLEAN type)
//! - No `DATE_TRUNC`; dates/timestamps are TEXT and truncated via STRFTIME
//! - `?` positional placeholders (no `$n` numbering)
//! - No FULL OUTER JOIN, no NULLS FIRST/LAST
//! - No DISTINCT ON, no FILTER clause, no native PIVOT

use super::super::expr::Expr;
use super::helpers;
use super::SqlDialect;
use crate::model::types::Granularity;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn supports_full_outer_join(&self) -> bool {
        false
    }

    fn supports_lateral(&self) -> bool {
        false
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_sqlite(name)
    }

    fn truncate_date(&self, expr: Expr, granularity: Granularity) -> Expr {
        helpers::truncate_date_sqlite(expr, granularity)
    }

    fn build_avg(&self, expr: Expr) -> Expr {
        // SQLite's AVG() always returns a float regardless of column type.
        super::super::expr::avg(expr)
    }
}
