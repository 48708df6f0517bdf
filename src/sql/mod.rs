//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder (including CTEs and set operations)
//! - [`expr`] - Expression AST and builder DSL, with bind-parameter support
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations (Postgres, MySQL, SQLite, DuckDB)

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    avg, coalesce, col, count, count_distinct, count_star, dense_rank, first_value, func,
    lag_default, lag_offset, last_value, lead_default, lead_offset, lit_bool, lit_float, lit_int,
    lit_null, lit_str, max, min, ntile, nullif, rank, row_number, star, sum, table_col, table_star,
    ArrayOp, BinaryOperator, Expr, ExprExt, Literal, ParamStore, UnaryOperator, WindowBuilder,
    WindowExt, WindowFrame, WindowOrderBy,
};
pub use query::{
    Cte, Join, JoinType, LimitOffset, NullsOrder, OrderByExpr, Query, SelectExpr, SetOperation,
    SortDir, TableRef,
};
pub use token::{Token, TokenStream};
