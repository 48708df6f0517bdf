//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (ANSI/PG/DuckDB/SQLite), `` ` `` (MySQL)
//! - Pagination: LIMIT/OFFSET
//! - Boolean literals: true/false vs 1/0
//! - String concatenation: `||` vs CONCAT()
//! - Bind parameter placeholders: `$1` vs `?`
//! - Date truncation and window-frame support
//!
//! # Usage
//!
//! ```ignore
//! use semlayer::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! ```

mod ansi;
pub mod helpers;
mod duckdb;
mod mysql;
mod postgres;
mod sqlite;

// Ansi is a reference implementation kept only as the trait's default-method
// baseline; it is not reachable through the `Dialect` enum.
pub use ansi::Ansi;
pub use duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use super::expr::{ArrayOp, Expr};
use super::token::{Token, TokenStream};
use crate::model::types::Granularity;

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    ///
    /// - ANSI/PostgreSQL/DuckDB/SQLite: `"identifier"`
    /// - MySQL: `` `identifier` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// All dialects use single quotes with `''` for escaping.
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Format a boolean literal.
    ///
    /// - PostgreSQL/DuckDB/SQLite: `true`/`false`
    /// - MySQL: `1`/`0`
    fn format_bool(&self, b: bool) -> &'static str;

    /// Format a NULL literal.
    fn format_null(&self) -> &'static str {
        "NULL"
    }

    // =========================================================================
    // Bind Parameters
    // =========================================================================

    /// Render the bind-parameter placeholder for the given 0-based position.
    ///
    /// - PostgreSQL/DuckDB: `$1`, `$2`, ...
    /// - MySQL/SQLite: `?` (positional, driver matches by order)
    fn placeholder(&self, index: usize) -> String {
        let _ = index;
        "?".to_string()
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
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

    /// Whether this dialect requires ORDER BY for OFFSET/LIMIT.
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// String concatenation operator or function.
    ///
    /// - ANSI/PostgreSQL/DuckDB/SQLite: `||`
    /// - MySQL: `CONCAT()` (|| is OR by default)
    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Whether this dialect supports the `||` concat operator.
    ///
    /// MySQL uses `||` as logical OR by default.
    fn supports_concat_operator(&self) -> bool {
        true
    }

    // =========================================================================
    // CTE (Common Table Expressions)
    // =========================================================================

    /// Whether to emit RECURSIVE keyword for recursive CTEs.
    fn emit_recursive_keyword(&self) -> bool {
        true
    }

    // =========================================================================
    // JOIN Syntax
    // =========================================================================

    /// Whether this dialect supports FULL OUTER JOIN.
    ///
    /// SQLite and (older) MySQL do not.
    fn supports_full_outer_join(&self) -> bool {
        true
    }

    /// Whether this dialect supports LATERAL joins.
    fn supports_lateral(&self) -> bool {
        true
    }

    // =========================================================================
    // NULLS Ordering
    // =========================================================================

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    ///
    /// MySQL and SQLite don't support this directly.
    fn supports_nulls_ordering(&self) -> bool {
        true
    }

    // =========================================================================
    // Date/Time
    // =========================================================================

    /// Format a date literal.
    fn format_date_literal(&self, date: &str) -> String {
        format!("DATE '{}'", date)
    }

    /// Truncate a timestamp expression down to the given granularity.
    ///
    /// This is the core primitive behind time-dimension bucketing: every
    /// cube's `timeDimensions` entry is rendered through this before
    /// grouping/ordering. Default uses ANSI `DATE_TRUNC('granularity', expr)`;
    /// MySQL and SQLite, which have no `DATE_TRUNC`, override with
    /// dialect-native date arithmetic.
    fn truncate_date(&self, expr: Expr, granularity: Granularity) -> Expr {
        Expr::Function {
            name: "DATE_TRUNC".into(),
            args: vec![Expr::Literal(super::expr::Literal::String(
                granularity.as_str().into(),
            )), expr],
            distinct: false,
        }
    }

    /// Convert a value returned for a truncated time dimension into the
    /// canonical wire representation (`YYYY-MM-DD HH:MM:SS`, UTC, no
    /// trailing zone). Most drivers already return this; dialects whose
    /// native driver returns something else (e.g. an epoch integer) override.
    fn convert_time_dimension_result(&self, value: &str) -> String {
        value.to_string()
    }

    /// Wrap an expression so `AVG` does not silently perform integer
    /// division before averaging (e.g. MySQL/SQLite on two INTEGER columns).
    /// Default: cast to DOUBLE PRECISION before handing to `AVG`.
    fn build_avg(&self, expr: Expr) -> Expr {
        super::expr::avg(Expr::Function {
            name: "CAST".into(),
            args: vec![expr, Expr::Raw("AS DOUBLE PRECISION".into())],
            distinct: false,
        })
    }

    /// Build an array-membership predicate (`arrayContains`/`arrayOverlaps`/
    /// `arrayContained`). Returns `None` for dialects without a native array
    /// type (MySQL, SQLite) - callers must reject such filters rather than
    /// silently dropping them.
    fn build_array_operator(&self, column: Expr, op: ArrayOp, values: Vec<Expr>) -> Option<Expr> {
        let _ = (column, op, values);
        None
    }

    // =========================================================================
    // PIVOT
    // =========================================================================

    /// Whether this dialect has native PIVOT syntax.
    fn supports_native_pivot(&self) -> bool {
        false
    }

    // =========================================================================
    // Misc
    // =========================================================================

    /// Whether this dialect supports DISTINCT ON.
    ///
    /// Only PostgreSQL and DuckDB support this.
    fn supports_distinct_on(&self) -> bool {
        false
    }

    /// Whether this dialect supports the FILTER clause for aggregates.
    ///
    /// PostgreSQL and DuckDB support `COUNT(*) FILTER (WHERE ...)`.
    fn supports_aggregate_filter(&self) -> bool {
        false
    }

    // =========================================================================
    // Window Functions
    // =========================================================================

    /// Whether this dialect supports GROUPS frame type.
    ///
    /// Only PostgreSQL and DuckDB support GROUPS.
    fn supports_groups_frame(&self) -> bool {
        false
    }

    /// Whether this dialect supports QUALIFY clause for window filtering.
    ///
    /// Only DuckDB supports QUALIFY.
    fn supports_qualify(&self) -> bool {
        false
    }

    /// Whether this dialect supports named windows (WINDOW clause).
    fn supports_named_windows(&self) -> bool {
        false
    }

    // =========================================================================
    // Function Remapping
    // =========================================================================

    /// Remap a function name for this dialect.
    ///
    /// Returns `Some(new_name)` if the function should be remapped, `None` to
    /// keep the original. The input is matched case-insensitively.
    fn remap_function(&self, name: &str) -> Option<&'static str> {
        let _ = name;
        None
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    DuckDb,
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
            Dialect::Sqlite => &Sqlite,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn placeholder(&self, index: usize) -> String {
        self.dialect().placeholder(index)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        self.dialect().requires_order_by_for_offset()
    }

    fn concat_operator(&self) -> &'static str {
        self.dialect().concat_operator()
    }

    fn supports_concat_operator(&self) -> bool {
        self.dialect().supports_concat_operator()
    }

    fn emit_recursive_keyword(&self) -> bool {
        self.dialect().emit_recursive_keyword()
    }

    fn supports_full_outer_join(&self) -> bool {
        self.dialect().supports_full_outer_join()
    }

    fn supports_lateral(&self) -> bool {
        self.dialect().supports_lateral()
    }

    fn supports_nulls_ordering(&self) -> bool {
        self.dialect().supports_nulls_ordering()
    }

    fn format_date_literal(&self, date: &str) -> String {
        self.dialect().format_date_literal(date)
    }

    fn truncate_date(&self, expr: Expr, granularity: Granularity) -> Expr {
        self.dialect().truncate_date(expr, granularity)
    }

    fn convert_time_dimension_result(&self, value: &str) -> String {
        self.dialect().convert_time_dimension_result(value)
    }

    fn build_avg(&self, expr: Expr) -> Expr {
        self.dialect().build_avg(expr)
    }

    fn build_array_operator(&self, column: Expr, op: ArrayOp, values: Vec<Expr>) -> Option<Expr> {
        self.dialect().build_array_operator(column, op, values)
    }

    fn supports_native_pivot(&self) -> bool {
        self.dialect().supports_native_pivot()
    }

    fn supports_distinct_on(&self) -> bool {
        self.dialect().supports_distinct_on()
    }

    fn supports_aggregate_filter(&self) -> bool {
        self.dialect().supports_aggregate_filter()
    }

    fn supports_groups_frame(&self) -> bool {
        self.dialect().supports_groups_frame()
    }

    fn supports_qualify(&self) -> bool {
        self.dialect().supports_qualify()
    }

    fn supports_named_windows(&self) -> bool {
        self.dialect().supports_named_windows()
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        self.dialect().remap_function(name)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::DuckDb.to_string(), "duckdb");
        assert_eq!(Dialect::Postgres.to_string(), "postgres");
        assert_eq!(Dialect::MySql.to_string(), "mysql");
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::DuckDb.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::Postgres.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::Sqlite.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::MySql.quote_identifier("users"), "`users`");
    }

    #[test]
    fn test_quote_identifier_escaping() {
        assert_eq!(
            Dialect::DuckDb.quote_identifier("weird\"name"),
            "\"weird\"\"name\""
        );
        assert_eq!(
            Dialect::MySql.quote_identifier("weird`name"),
            "`weird``name`"
        );
    }

    #[test]
    fn test_format_bool() {
        assert_eq!(Dialect::DuckDb.format_bool(true), "true");
        assert_eq!(Dialect::Postgres.format_bool(false), "false");
        assert_eq!(Dialect::MySql.format_bool(true), "1");
        assert_eq!(Dialect::Sqlite.format_bool(false), "0");
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(Dialect::Postgres.placeholder(0), "$1");
        assert_eq!(Dialect::Postgres.placeholder(2), "$3");
        assert_eq!(Dialect::MySql.placeholder(5), "?");
        assert_eq!(Dialect::Sqlite.placeholder(5), "?");
        assert_eq!(Dialect::DuckDb.placeholder(0), "$1");
    }

    #[test]
    fn test_concat_operator() {
        assert_eq!(Dialect::DuckDb.concat_operator(), "||");
        assert_eq!(Dialect::Postgres.concat_operator(), "||");
        // MySQL uses CONCAT() function, operator returns || but shouldn't be used
        assert!(!Dialect::MySql.supports_concat_operator());
    }

    #[test]
    fn test_supports_native_pivot() {
        assert!(Dialect::DuckDb.supports_native_pivot());
        assert!(!Dialect::Postgres.supports_native_pivot());
        assert!(!Dialect::MySql.supports_native_pivot());
        assert!(!Dialect::Sqlite.supports_native_pivot());
    }

    #[test]
    fn test_supports_distinct_on() {
        assert!(Dialect::DuckDb.supports_distinct_on());
        assert!(Dialect::Postgres.supports_distinct_on());
        assert!(!Dialect::MySql.supports_distinct_on());
        assert!(!Dialect::Sqlite.supports_distinct_on());
    }

    #[test]
    fn test_remap_function_datetime() {
        assert_eq!(Dialect::DuckDb.remap_function("STRFTIME"), None); // native
        assert_eq!(
            Dialect::Postgres.remap_function("STRFTIME"),
            Some("TO_CHAR")
        );
        assert_eq!(
            Dialect::MySql.remap_function("STRFTIME"),
            Some("DATE_FORMAT")
        );

        assert_eq!(Dialect::DuckDb.remap_function("TO_CHAR"), Some("STRFTIME"));
        assert_eq!(Dialect::Postgres.remap_function("TO_CHAR"), None); // native
    }

    #[test]
    fn test_remap_function_null_handling() {
        assert_eq!(Dialect::DuckDb.remap_function("NVL"), Some("COALESCE"));
        assert_eq!(Dialect::Postgres.remap_function("NVL"), Some("COALESCE"));
        assert_eq!(Dialect::MySql.remap_function("NVL"), Some("IFNULL"));
        assert_eq!(Dialect::DuckDb.remap_function("IFNULL"), Some("COALESCE"));
    }

    #[test]
    fn test_remap_function_unknown() {
        assert_eq!(Dialect::DuckDb.remap_function("CUSTOM_FUNC"), None);
        assert_eq!(Dialect::Postgres.remap_function("CUSTOM_FUNC"), None);
        assert_eq!(Dialect::MySql.remap_function("CUSTOM_FUNC"), None);
        assert_eq!(Dialect::Sqlite.remap_function("CUSTOM_FUNC"), None);
    }

    #[test]
    fn test_truncate_date_default_vs_mysql() {
        use super::super::expr::col;
        use crate::model::types::Granularity;

        let pg = Dialect::Postgres
            .truncate_date(col("created_at"), Granularity::Month)
            .to_tokens_for_dialect(Dialect::Postgres)
            .serialize(Dialect::Postgres);
        assert!(pg.contains("DATE_TRUNC"));

        let my = Dialect::MySql
            .truncate_date(col("created_at"), Granularity::Month)
            .to_tokens_for_dialect(Dialect::MySql)
            .serialize(Dialect::MySql);
        assert!(my.contains("DATE_FORMAT"));
    }
}
