//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Lowercase case folding for unquoted identifiers
//! - Native boolean type (true/false)
//! - RETURNING clause
//! - ON CONFLICT for upserts
//! - Dollar quoting for strings ($$text$$)
//! - DISTINCT ON
//! - FILTER clause for aggregates

use super::super::expr::{avg, ArrayOp, BinaryOperator, Expr};
use super::helpers;
use super::SqlDialect;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn supports_distinct_on(&self) -> bool {
        true
    }

    fn supports_aggregate_filter(&self) -> bool {
        true
    }

    fn supports_groups_frame(&self) -> bool {
        true
    }

    fn supports_named_windows(&self) -> bool {
        true
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_postgres(name)
    }

    fn build_avg(&self, expr: Expr) -> Expr {
        // Postgres AVG already promotes integer columns to numeric.
        avg(expr)
    }

    fn build_array_operator(&self, column: Expr, op: ArrayOp, values: Vec<Expr>) -> Option<Expr> {
        let array = Expr::ArrayLiteral(values);
        let op = match op {
            ArrayOp::Contains => BinaryOperator::ArrayContains,
            ArrayOp::Overlaps => BinaryOperator::ArrayOverlaps,
            ArrayOp::Contained => BinaryOperator::ArrayContained,
        };
        Some(Expr::BinaryOp {
            left: Box::new(column),
            op,
            right: Box::new(array),
        })
    }
}
