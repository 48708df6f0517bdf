//! # semlayer
//!
//! A semantic query layer: cubes of measures and dimensions, compiled
//! into parameterized, multi-dialect SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           SemanticQuery (cubes/measures/filters)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validator]
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ValidationResult                      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │      QueryPlan (primary cube, joins, pre-agg CTEs)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [assembler]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  sql::Query (multi-dialect)              │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod planner;
pub mod query;
pub mod registry;
pub mod sql;
pub mod validator;

pub mod prelude {
    pub use crate::cache::{cache_key, FilterSqlCache, MemoryResultCache, ResultCache};
    pub use crate::config::Settings;
    pub use crate::error::{CubeDefinitionError, ExecutionError, PlanError, ValidationError};
    pub use crate::executor::Executor;
    pub use crate::model::{Cube, DimensionDef, JoinDef, MeasureDef, QueryContext};
    pub use crate::query::{Condition, Filter, Operator, SemanticQuery, QueryResult};
    pub use crate::registry::Registry;
    pub use crate::sql::{Dialect, SqlDialect};
    pub use crate::validator::{validate, ValidationResult};
}
