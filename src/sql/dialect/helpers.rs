//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB, SQLite.
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL.
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
/// Used by: All dialects
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Postgres, DuckDB, SQLite.
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: MySQL.
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

use super::super::token::{Token, TokenStream};

/// Emit LIMIT ... OFFSET ... (standard SQL).
/// Used by: Postgres, DuckDB, MySQL, SQLite.
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

// =============================================================================
// Function Remapping
// =============================================================================

/// Remap functions for Postgres dialect.
pub fn remap_function_postgres(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "STRFTIME" => Some("TO_CHAR"),
        "DATE_FORMAT" => Some("TO_CHAR"),
        "FORMAT" => Some("TO_CHAR"),
        "NVL" => Some("COALESCE"),
        "IFNULL" => Some("COALESCE"),
        "ISNULL" => Some("COALESCE"),
        _ => None,
    }
}

/// Remap functions for DuckDB dialect.
pub fn remap_function_duckdb(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "TO_CHAR" => Some("STRFTIME"),
        "DATE_FORMAT" => Some("STRFTIME"),
        "FORMAT" => Some("STRFTIME"),
        "NVL" => Some("COALESCE"),
        "IFNULL" => Some("COALESCE"),
        "ISNULL" => Some("COALESCE"),
        _ => None,
    }
}

/// Remap functions for MySQL dialect.
pub fn remap_function_mysql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "STRFTIME" => Some("DATE_FORMAT"),
        "TO_CHAR" => Some("DATE_FORMAT"),
        "NOW" => None, // NOW() works in MySQL
        "NVL" => Some("IFNULL"),
        "ISNULL" => Some("IFNULL"),
        "SUBSTR" => Some("SUBSTRING"),
        _ => None,
    }
}

/// Remap functions for SQLite dialect.
pub fn remap_function_sqlite(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "DATE_FORMAT" => Some("STRFTIME"),
        "TO_CHAR" => Some("STRFTIME"),
        "NVL" => Some("COALESCE"),
        "ISNULL" => Some("COALESCE"),
        "IFNULL" => None, // native to SQLite
        _ => None,
    }
}

// =============================================================================
// Date Truncation
// =============================================================================

use super::super::expr::Expr;
use crate::model::types::Granularity;

/// MySQL has no `DATE_TRUNC`; truncate via `DATE_FORMAT` with a
/// granularity-specific mask, falling back to `DATE_SUB`/`DATE_ADD`
/// arithmetic for week truncation (no native mask for it).
pub fn truncate_date_mysql(expr: Expr, granularity: Granularity) -> Expr {
    match granularity {
        Granularity::Second => date_format(expr, "%Y-%m-%d %H:%i:%s"),
        Granularity::Minute => date_format(expr, "%Y-%m-%d %H:%i:00"),
        Granularity::Hour => date_format(expr, "%Y-%m-%d %H:00:00"),
        Granularity::Day => date_format(expr, "%Y-%m-%d"),
        Granularity::Week => Expr::Function {
            name: "DATE_SUB".into(),
            args: vec![
                expr.clone(),
                Expr::Raw(format!(
                    "INTERVAL WEEKDAY({}) DAY",
                    render_inline(&expr)
                )),
            ],
            distinct: false,
        },
        Granularity::Month => date_format(expr, "%Y-%m-01"),
        Granularity::Quarter => Expr::Function {
            name: "MAKEDATE".into(),
            args: vec![
                Expr::Function {
                    name: "YEAR".into(),
                    args: vec![expr.clone()],
                    distinct: false,
                },
                Expr::Raw("1".into()),
            ],
            distinct: false,
        },
        Granularity::Year => date_format(expr, "%Y-01-01"),
    }
}

fn date_format(expr: Expr, mask: &str) -> Expr {
    Expr::Function {
        name: "DATE_FORMAT".into(),
        args: vec![expr, Expr::Literal(super::super::expr::Literal::String(mask.into()))],
        distinct: false,
    }
}

fn render_inline(expr: &Expr) -> String {
    expr.to_tokens()
        .serialize(super::Dialect::MySql)
}

/// SQLite has no `DATE_TRUNC`; truncate via `STRFTIME` masks, since SQLite
/// stores dates/timestamps as TEXT/INTEGER/REAL and has no DATE type.
pub fn truncate_date_sqlite(expr: Expr, granularity: Granularity) -> Expr {
    let mask = match granularity {
        Granularity::Second => "%Y-%m-%d %H:%M:%S",
        Granularity::Minute => "%Y-%m-%d %H:%M:00",
        Granularity::Hour => "%Y-%m-%d %H:00:00",
        Granularity::Day => "%Y-%m-%d",
        Granularity::Week => "%Y-%m-%d", // caller applies -N days via weekday(expr) separately
        Granularity::Month => "%Y-%m-01",
        Granularity::Quarter => "%Y-%m-01", // caller rounds month down to quarter boundary
        Granularity::Year => "%Y-01-01",
    };
    Expr::Function {
        name: "STRFTIME".into(),
        args: vec![
            Expr::Literal(super::super::expr::Literal::String(mask.into())),
            expr,
        ],
        distinct: false,
    }
}
