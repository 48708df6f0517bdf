//! Window-function measure builder (§4.11).
//!
//! Resolves a [`WindowConfig`]'s base measure, wraps it in `OVER (...)`,
//! and applies the requested before/after arithmetic (difference, ratio,
//! percent-change) on top of the windowed value.

use crate::cache::FilterSqlCache;
use crate::error::PlanError;
use crate::model::{MeasureDef, OrderRef, QueryContext, WindowConfig, WindowKind, WindowOperation};
use crate::query::OrderDirection;
use crate::registry::Registry;
use crate::sql::{
    dense_rank, first_value, lag_default, last_value, lit_float, lit_int, ntile, nullif, rank,
    row_number, Expr, ExprExt, ParamStore, WindowBuilder, WindowOrderBy,
};

use super::condition::{build_condition_expr, resolve_member};
use super::measure_builder;

/// Builds the full `Expr` for a window measure, including any
/// post-window arithmetic (`operation`).
pub fn build_window(
    kind: WindowKind,
    config: &WindowConfig,
    cube_name: &str,
    registry: &Registry,
    ctx: &QueryContext,
    params: &mut ParamStore,
    filter_cache: &FilterSqlCache,
) -> Result<Expr, PlanError> {
    let cube = registry
        .get(cube_name)
        .ok_or_else(|| PlanError::UnknownCube(cube_name.to_string()))?;

    let partition_by: Vec<Expr> = config
        .partition_by
        .iter()
        .filter_map(|r| resolve_member(r, registry, ctx))
        .collect();
    let order_by: Vec<WindowOrderBy> = config
        .order_by
        .iter()
        .filter_map(|o| window_order(o, registry, ctx))
        .collect();

    let function = base_window_function(kind, config, &cube, ctx, params, filter_cache)?;

    let mut builder = WindowBuilder::new(function).partition_by(partition_by);
    if !order_by.is_empty() {
        builder = builder.order_by(order_by);
    }
    let windowed = builder.build();

    if matches!(
        config.operation,
        WindowOperation::Difference | WindowOperation::Ratio | WindowOperation::PercentChange
    ) {
        let base = base_measure_expr(config, &cube, ctx, params, filter_cache)?;
        return Ok(apply_operation_with_base(base, windowed, config.operation));
    }

    Ok(apply_operation(windowed, config.operation))
}

/// Builds the plain (un-windowed) measure expression, used as the
/// "current" operand for `Difference`/`Ratio` against the windowed value.
fn base_measure_expr(
    config: &WindowConfig,
    cube: &crate::model::Cube,
    ctx: &QueryContext,
    params: &mut ParamStore,
    filter_cache: &FilterSqlCache,
) -> Result<Expr, PlanError> {
    let measure = cube
        .measures
        .get(&config.measure)
        .ok_or_else(|| PlanError::UnknownMember {
            cube: cube.name.clone(),
            field: config.measure.clone(),
        })?;
    match measure {
        MeasureDef::Simple { .. } => measure_builder::build_simple(measure, ctx, filter_cache, |c| {
            let col = crate::sql::table_col(&cube.name, c.member.split('.').nth(1).unwrap_or(""));
            build_condition_expr(c, col, params)
        }),
        _ => Ok(crate::sql::lit_null()),
    }
}

fn window_order(order: &OrderRef, registry: &Registry, ctx: &QueryContext) -> Option<WindowOrderBy> {
    let expr = resolve_member(&order.field, registry, ctx)?;
    Some(match order.direction {
        OrderDirection::Asc => WindowOrderBy::asc(expr),
        OrderDirection::Desc => WindowOrderBy::desc(expr),
    })
}

fn base_window_function(
    kind: WindowKind,
    config: &WindowConfig,
    cube: &crate::model::Cube,
    ctx: &QueryContext,
    params: &mut ParamStore,
    filter_cache: &FilterSqlCache,
) -> Result<Expr, PlanError> {
    let mut measure_expr = |registry_measure: &str| -> Result<Expr, PlanError> {
        let measure = cube.measures.get(registry_measure).ok_or_else(|| {
            PlanError::UnknownMember {
                cube: cube.name.clone(),
                field: registry_measure.to_string(),
            }
        })?;
        match measure {
            MeasureDef::Simple { .. } => measure_builder::build_simple(measure, ctx, filter_cache, |c| {
                let col = crate::sql::table_col(&cube.name, c.member.split('.').nth(1).unwrap_or(""));
                build_condition_expr(c, col, params)
            }),
            _ => Ok(crate::sql::lit_null()),
        }
    };

    Ok(match kind {
        WindowKind::RowNumber => row_number(),
        WindowKind::Rank => rank(),
        WindowKind::DenseRank => dense_rank(),
        WindowKind::Ntile => ntile(u64::from(config.n_tile.unwrap_or(4))),
        WindowKind::FirstValue => first_value(measure_expr(&config.measure)?),
        WindowKind::LastValue => last_value(measure_expr(&config.measure)?),
        WindowKind::Lag => lag_default(
            measure_expr(&config.measure)?,
            config.offset.unwrap_or(1),
            default_value_expr(config),
        ),
        WindowKind::Lead => crate::sql::lead_default(
            measure_expr(&config.measure)?,
            config.offset.unwrap_or(1),
            default_value_expr(config),
        ),
        WindowKind::MovingAvg => crate::sql::func("AVG", vec![measure_expr(&config.measure)?]),
        WindowKind::MovingSum => crate::sql::func("SUM", vec![measure_expr(&config.measure)?]),
    })
}

fn default_value_expr(config: &WindowConfig) -> Expr {
    config
        .default_value
        .as_ref()
        .map(super::condition::json_literal_expr)
        .unwrap_or_else(crate::sql::lit_null)
}

fn apply_operation(windowed: Expr, operation: WindowOperation) -> Expr {
    match operation {
        WindowOperation::Raw
        | WindowOperation::Difference
        | WindowOperation::Ratio
        | WindowOperation::PercentChange => windowed,
    }
}

/// `Difference`/`Ratio`/`PercentChange` compare the current measure value
/// against the windowed one (e.g. `measure - LAG(measure)`,
/// `measure / NULLIF(LAG(measure), 0)`). `Ratio` and `PercentChange` guard
/// the windowed denominator with `NULLIF` so a zero window value yields
/// NULL instead of dividing by zero.
fn apply_operation_with_base(base: Expr, windowed: Expr, operation: WindowOperation) -> Expr {
    match operation {
        WindowOperation::Difference => base.sub(windowed),
        WindowOperation::Ratio => base.div(nullif(windowed, lit_int(0))),
        WindowOperation::PercentChange => base
            .clone()
            .sub(windowed.clone())
            .div(nullif(windowed, lit_int(0)))
            .mul(lit_float(100.0)),
        WindowOperation::Raw => windowed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BaseQueryDefinition, Column, ColumnExpr, Cube};
    use crate::sql::TableRef;
    use std::sync::Arc;

    fn registry_with_sales() -> Registry {
        let registry = Registry::new();
        let cube = Cube::new(
            "Sales",
            Arc::new(|_ctx: &QueryContext| BaseQueryDefinition::new(TableRef::new("sales"))),
        )
        .with_measure(
            "revenue",
            MeasureDef::simple(
                crate::model::types::AggregationType::Sum,
                Arc::new(|_ctx: &QueryContext| ColumnExpr::Column(Column::new("sales", "amount"))),
            ),
        )
        .with_dimension(
            "month",
            crate::model::DimensionDef::new(
                crate::model::types::DimensionKind::Time,
                crate::model::column_fn("sales", "month"),
            ),
        );
        registry.register(cube).unwrap();
        registry
    }

    #[test]
    fn test_build_lag_window() {
        let registry = registry_with_sales();
        let config = WindowConfig {
            measure: "revenue".into(),
            operation: WindowOperation::Difference,
            order_by: vec![OrderRef {
                field: "Sales.month".into(),
                direction: OrderDirection::Asc,
            }],
            partition_by: vec![],
            offset: Some(1),
            default_value: None,
            n_tile: None,
            frame: None,
        };
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let mut params = ParamStore::new();
        let cache = FilterSqlCache::new();
        let expr = build_window(
            WindowKind::Lag,
            &config,
            "Sales",
            &registry,
            &ctx,
            &mut params,
            &cache,
        )
        .unwrap();
        // Difference subtracts the windowed LAG value from the current one.
        assert!(matches!(expr, Expr::BinaryOp { op, .. } if op == crate::sql::BinaryOperator::Minus));
    }

    #[test]
    fn test_build_first_value_window_raw() {
        let registry = registry_with_sales();
        let config = WindowConfig {
            measure: "revenue".into(),
            operation: WindowOperation::Raw,
            order_by: vec![OrderRef {
                field: "Sales.month".into(),
                direction: OrderDirection::Asc,
            }],
            partition_by: vec![],
            offset: None,
            default_value: None,
            n_tile: None,
            frame: None,
        };
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let mut params = ParamStore::new();
        let cache = FilterSqlCache::new();
        let expr = build_window(
            WindowKind::FirstValue,
            &config,
            "Sales",
            &registry,
            &ctx,
            &mut params,
            &cache,
        )
        .unwrap();
        assert!(matches!(expr, Expr::WindowFunction { .. }));
    }

    #[test]
    fn test_build_ratio_window() {
        let registry = registry_with_sales();
        let config = WindowConfig {
            measure: "revenue".into(),
            operation: WindowOperation::Ratio,
            order_by: vec![OrderRef {
                field: "Sales.month".into(),
                direction: OrderDirection::Asc,
            }],
            partition_by: vec![],
            offset: Some(1),
            default_value: None,
            n_tile: None,
            frame: None,
        };
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let mut params = ParamStore::new();
        let cache = FilterSqlCache::new();
        let expr = build_window(
            WindowKind::Lag,
            &config,
            "Sales",
            &registry,
            &ctx,
            &mut params,
            &cache,
        )
        .unwrap();
        assert!(matches!(expr, Expr::BinaryOp { op, .. } if op == crate::sql::BinaryOperator::Div));
    }

    #[test]
    fn test_ratio_window_guards_denominator_with_nullif() {
        let registry = registry_with_sales();
        let config = WindowConfig {
            measure: "revenue".into(),
            operation: WindowOperation::Ratio,
            order_by: vec![OrderRef {
                field: "Sales.month".into(),
                direction: OrderDirection::Asc,
            }],
            partition_by: vec![],
            offset: Some(1),
            default_value: None,
            n_tile: None,
            frame: None,
        };
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let mut params = ParamStore::new();
        let cache = FilterSqlCache::new();
        let expr = build_window(
            WindowKind::Lag,
            &config,
            "Sales",
            &registry,
            &ctx,
            &mut params,
            &cache,
        )
        .unwrap();
        let sql = crate::sql::Query::new()
            .select(vec![crate::sql::SelectExpr::new(expr)])
            .from(crate::sql::TableRef::new("sales"))
            .to_sql(crate::sql::Dialect::Postgres);
        assert!(sql.contains("NULLIF"));
    }

    #[test]
    fn test_percent_change_uses_base_and_nullif() {
        let registry = registry_with_sales();
        let config = WindowConfig {
            measure: "revenue".into(),
            operation: WindowOperation::PercentChange,
            order_by: vec![OrderRef {
                field: "Sales.month".into(),
                direction: OrderDirection::Asc,
            }],
            partition_by: vec![],
            offset: Some(1),
            default_value: None,
            n_tile: None,
            frame: None,
        };
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let mut params = ParamStore::new();
        let cache = FilterSqlCache::new();
        let expr = build_window(
            WindowKind::Lag,
            &config,
            "Sales",
            &registry,
            &ctx,
            &mut params,
            &cache,
        )
        .unwrap();
        // ((base - window) / NULLIF(window, 0)) * 100
        assert!(matches!(expr, Expr::BinaryOp { op, .. } if op == crate::sql::BinaryOperator::Mul));
        let sql = crate::sql::Query::new()
            .select(vec![crate::sql::SelectExpr::new(expr)])
            .from(crate::sql::TableRef::new("sales"))
            .to_sql(crate::sql::Dialect::Postgres);
        assert!(sql.contains("NULLIF"));
        assert!(sql.contains("100"));
        // The base column (the un-windowed measure) appears in the
        // generated SQL, not just the LAG expression.
        assert!(sql.contains("SUM"));
    }
}
