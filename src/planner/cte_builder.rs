//! Pre-aggregation CTE builder (§4.9).
//!
//! Builds one `WITH alias AS (...)` per [`super::CtePlan`]: join-key
//! columns projected verbatim, every required measure aggregated under
//! its field name, GROUP BY everything non-aggregate.

use crate::cache::FilterSqlCache;
use crate::error::PlanError;
use crate::model::{MeasureDef, QueryContext};
use crate::query::{Filter, SemanticQuery};
use crate::registry::Registry;
use crate::sql::{Cte, Expr, ExprExt, ParamStore, Query, SelectExpr};

use super::condition::{build_condition_expr, resolve_member};
use super::measure_builder;
use super::CtePlan;

/// Builds the CTE's inner `Query` plus its `Cte` wrapper.
pub fn build_cte(
    cte_plan: &CtePlan,
    registry: &Registry,
    query: &SemanticQuery,
    ctx: &QueryContext,
    params: &mut ParamStore,
    filter_cache: &FilterSqlCache,
) -> Result<Cte, PlanError> {
    let cube = registry
        .get(&cte_plan.cube)
        .ok_or_else(|| PlanError::UnknownCube(cte_plan.cube.clone()))?;
    let base = cube.base_query(ctx);

    let mut select: Vec<SelectExpr> = Vec::new();
    let mut group_by: Vec<Expr> = Vec::new();

    for on in &cte_plan.join_keys {
        let expr = on.target.to_expr();
        select.push(SelectExpr::new(expr.clone()).with_alias(&on.target.name));
        group_by.push(expr);
    }

    for dim_name in cte_plan.dimensions.iter().chain(cte_plan.time_dimensions.iter()) {
        let reference = format!("{}.{dim_name}", cte_plan.cube);
        let expr = resolve_member(&reference, registry, ctx).ok_or_else(|| PlanError::UnknownMember {
            cube: cte_plan.cube.clone(),
            field: dim_name.clone(),
        })?;
        select.push(SelectExpr::new(expr.clone()).with_alias(dim_name));
        group_by.push(expr);
    }

    for measure_name in &cte_plan.measures {
        let measure = cube
            .measures
            .get(measure_name)
            .ok_or_else(|| PlanError::UnknownMember {
                cube: cte_plan.cube.clone(),
                field: measure_name.clone(),
            })?;
        let expr = match measure {
            MeasureDef::Simple { .. } => measure_builder::build_simple(measure, ctx, filter_cache, |c| {
                let column = resolve_member(&c.member, registry, ctx)
                    .unwrap_or_else(crate::sql::lit_null);
                build_condition_expr(c, column, params)
            })?,
            MeasureDef::Calculated { template, .. } => {
                measure_builder::build_calculated(template, |reference| {
                    cube.measures
                        .get(reference)
                        .and_then(|m| match m {
                            MeasureDef::Simple { .. } => measure_builder::build_simple(
                                m,
                                ctx,
                                filter_cache,
                                |c| {
                                    let column = resolve_member(&c.member, registry, ctx)
                                        .unwrap_or_else(crate::sql::lit_null);
                                    build_condition_expr(c, column, params)
                                },
                            )
                            .ok(),
                            _ => None,
                        })
                        .unwrap_or_else(crate::sql::lit_null)
                })
            }
            MeasureDef::Window { .. } => {
                return Err(PlanError::CrossCteDependency {
                    measure: measure_name.clone(),
                })
            }
        };
        select.push(SelectExpr::new(expr).with_alias(measure_name));
    }

    let mut q = Query::new()
        .select(select)
        .from(base.from.clone())
        .group_by(group_by);

    let mut where_clause = base.where_.clone();

    for propagating in &cte_plan.propagating_filters {
        let subquery = propagating_subquery(propagating, registry, ctx, params)?;
        let target_key = cte_plan
            .join_keys
            .first()
            .map(|k| k.target.to_expr())
            .unwrap_or_else(crate::sql::lit_null);
        let pushed = Expr::InSubquery {
            expr: Box::new(target_key),
            subquery: Box::new(subquery),
            negated: false,
        };
        where_clause = Some(match where_clause {
            Some(existing) => existing.and(pushed),
            None => pushed,
        });
    }

    let mut having_clause: Option<Expr> = None;

    for filter in &query.filters {
        if let Some(expr) = filter_for_cube(filter, &cte_plan.cube, registry, ctx, params) {
            where_clause = Some(match where_clause {
                Some(existing) => existing.and(expr),
                None => expr,
            });
        }
        if let Some(expr) =
            having_filter_for_cube(filter, &cte_plan.cube, &cube, registry, ctx, filter_cache, params)
        {
            having_clause = Some(match having_clause {
                Some(existing) => existing.and(expr),
                None => expr,
            });
        }
    }

    if let Some(w) = where_clause {
        q = q.filter(w);
    }
    if let Some(h) = having_clause {
        q = q.having(h);
    }

    Ok(Cte::new(&cte_plan.alias, q))
}

/// Builds `SELECT pk FROM source_cube WHERE condition` for a propagating
/// filter - the subquery the outer CTE's WHERE does `target_key IN (...)`
/// against (§4.7/§4.9).
fn propagating_subquery(
    propagating: &super::PropagatingFilter,
    registry: &Registry,
    ctx: &QueryContext,
    params: &mut ParamStore,
) -> Result<Query, PlanError> {
    let cube = registry
        .get(&propagating.source_cube)
        .ok_or_else(|| PlanError::UnknownCube(propagating.source_cube.clone()))?;
    let base = cube.base_query(ctx);
    let join_to_target = cube
        .joins
        .values()
        .find(|j| j.on.first().is_some())
        .and_then(|j| j.on.first())
        .map(|on| on.source.to_expr())
        .unwrap_or_else(crate::sql::lit_null);

    let member_col = resolve_member(&propagating.condition.member, registry, ctx)
        .unwrap_or_else(crate::sql::lit_null);
    let predicate = build_condition_expr(&propagating.condition, member_col, params);

    let where_clause = match &base.where_ {
        Some(existing) => existing.clone().and(predicate),
        None => predicate,
    };

    Ok(Query::new()
        .select(vec![join_to_target])
        .from(base.from)
        .filter(where_clause))
}

/// A dimension-targeting query filter whose member belongs to `cube_name`,
/// to be applied directly in the CTE's WHERE (pre-aggregation) rather than
/// pushed in from outside. Measure-targeting filters are left to
/// [`having_filter_for_cube`] instead, since they must run post-aggregation.
fn filter_for_cube(
    filter: &Filter,
    cube_name: &str,
    registry: &Registry,
    ctx: &QueryContext,
    params: &mut ParamStore,
) -> Option<Expr> {
    match filter {
        Filter::Condition(c) => {
            let (cube_ref, field) = c.member.split_once('.')?;
            if cube_ref != cube_name {
                return None;
            }
            if matches!(registry.get(cube_ref)?.measures.get(field), Some(MeasureDef::Simple { .. })) {
                return None;
            }
            let column = resolve_member(&c.member, registry, ctx)?;
            Some(build_condition_expr(c, column, params))
        }
        Filter::And { and } => {
            let parts: Vec<Expr> = and
                .iter()
                .filter_map(|f| filter_for_cube(f, cube_name, registry, ctx, params))
                .collect();
            parts.into_iter().reduce(|a, b| a.and(b))
        }
        Filter::Or { or } => {
            let all_same_cube = or.iter().all(|f| matches!(f, Filter::Condition(c) if c.member.split('.').next() == Some(cube_name)));
            if !all_same_cube {
                return None;
            }
            let parts: Vec<Expr> = or
                .iter()
                .filter_map(|f| filter_for_cube(f, cube_name, registry, ctx, params))
                .collect();
            parts.into_iter().reduce(|a, b| a.or(b))
        }
    }
}

/// A measure-targeting query filter whose member belongs to `cube_name`,
/// applied as a post-aggregation HAVING against the CTE's own re-aggregated
/// measure expression (e.g. `HAVING SUM(lines_of_code) > $N`), rather than
/// against the underlying raw column (§4.7/§4.9, §8 S4).
fn having_filter_for_cube(
    filter: &Filter,
    cube_name: &str,
    cube: &crate::model::Cube,
    registry: &Registry,
    ctx: &QueryContext,
    filter_cache: &FilterSqlCache,
    params: &mut ParamStore,
) -> Option<Expr> {
    match filter {
        Filter::Condition(c) => {
            let (cube_ref, field) = c.member.split_once('.')?;
            if cube_ref != cube_name {
                return None;
            }
            let measure = cube.measures.get(field)?;
            let aggregate = match measure {
                MeasureDef::Simple { .. } => measure_builder::build_simple(measure, ctx, filter_cache, |inline| {
                    let column = resolve_member(&inline.member, registry, ctx)
                        .unwrap_or_else(crate::sql::lit_null);
                    build_condition_expr(inline, column, params)
                })
                .ok()?,
                _ => return None,
            };
            Some(build_condition_expr(c, aggregate, params))
        }
        Filter::And { and } => {
            let parts: Vec<Expr> = and
                .iter()
                .filter_map(|f| having_filter_for_cube(f, cube_name, cube, registry, ctx, filter_cache, params))
                .collect();
            parts.into_iter().reduce(|a, b| a.and(b))
        }
        Filter::Or { or } => {
            let all_same_cube = or.iter().all(|f| matches!(f, Filter::Condition(c) if c.member.split('.').next() == Some(cube_name)));
            if !all_same_cube {
                return None;
            }
            let parts: Vec<Expr> = or
                .iter()
                .filter_map(|f| having_filter_for_cube(f, cube_name, cube, registry, ctx, filter_cache, params))
                .collect();
            parts.into_iter().reduce(|a, b| a.or(b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::AggregationType;
    use crate::model::{BaseQueryDefinition, Column, ColumnExpr, Cube, JoinDef, OnCondition};
    use crate::query::{Condition, Operator};
    use crate::sql::TableRef;
    use std::sync::Arc;

    fn registry_with_employees_productivity() -> Registry {
        let registry = Registry::new();
        let employees = Cube::new(
            "Employees",
            Arc::new(|_ctx: &QueryContext| BaseQueryDefinition::new(TableRef::new("employees"))),
        )
        .with_measure(
            "totalSalary",
            MeasureDef::simple(
                AggregationType::Sum,
                Arc::new(|_ctx: &QueryContext| ColumnExpr::Column(Column::new("employees", "salary"))),
            ),
        )
        .with_join(
            "productivity",
            JoinDef::has_many(
                "Productivity",
                vec![OnCondition {
                    source: Column::new("employees", "id"),
                    target: Column::new("productivity", "employee_id"),
                }],
            ),
        );
        let productivity = Cube::new(
            "Productivity",
            Arc::new(|_ctx: &QueryContext| BaseQueryDefinition::new(TableRef::new("productivity"))),
        )
        .with_measure(
            "totalLinesOfCode",
            MeasureDef::simple(
                AggregationType::Sum,
                Arc::new(|_ctx: &QueryContext| ColumnExpr::Column(Column::new("productivity", "lines_of_code"))),
            ),
        );
        registry.register(employees).unwrap();
        registry.register(productivity).unwrap();
        registry
    }

    fn cte_plan_for_productivity() -> CtePlan {
        CtePlan {
            cube: "Productivity".into(),
            alias: "Productivity_cte".into(),
            measures: vec!["totalLinesOfCode".into()],
            propagating_filters: vec![],
            join_keys: vec![OnCondition {
                source: Column::new("employees", "id"),
                target: Column::new("productivity", "employee_id"),
            }],
            dimensions: vec![],
            time_dimensions: vec![],
        }
    }

    #[test]
    fn test_dimension_filter_lands_in_where_not_having() {
        let registry = registry_with_employees_productivity();
        let query = SemanticQuery {
            measures: vec!["Productivity.totalLinesOfCode".into()],
            filters: vec![],
            ..Default::default()
        };
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let mut params = ParamStore::new();
        let cache = FilterSqlCache::new();
        let cte = build_cte(&cte_plan_for_productivity(), &registry, &query, &ctx, &mut params, &cache).unwrap();
        assert!(cte.query.having.is_none());
    }

    #[test]
    fn test_measure_filter_becomes_having_on_reaggregated_column() {
        let registry = registry_with_employees_productivity();
        let query = SemanticQuery {
            measures: vec!["Productivity.totalLinesOfCode".into()],
            filters: vec![Filter::Condition(Condition {
                member: "Productivity.totalLinesOfCode".into(),
                operator: Operator::Gt,
                values: vec![serde_json::json!(50000)],
                date_range: None,
            })],
            ..Default::default()
        };
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let mut params = ParamStore::new();
        let cache = FilterSqlCache::new();
        let cte = build_cte(&cte_plan_for_productivity(), &registry, &query, &ctx, &mut params, &cache).unwrap();
        assert!(cte.query.having.is_some());
        let sql = cte.query.to_sql(crate::sql::Dialect::Postgres);
        assert!(sql.contains("HAVING SUM(\"productivity\".\"lines_of_code\") > $1"));
        assert!(!sql.contains("WHERE") || !sql.contains("lines_of_code\" > $1"));
    }

    #[test]
    fn test_measure_filter_snapshot() {
        use insta::assert_snapshot;

        let registry = registry_with_employees_productivity();
        let query = SemanticQuery {
            measures: vec!["Productivity.totalLinesOfCode".into()],
            filters: vec![Filter::Condition(Condition {
                member: "Productivity.totalLinesOfCode".into(),
                operator: Operator::Gt,
                values: vec![serde_json::json!(50000)],
                date_range: None,
            })],
            ..Default::default()
        };
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let mut params = ParamStore::new();
        let cache = FilterSqlCache::new();
        let cte = build_cte(&cte_plan_for_productivity(), &registry, &query, &ctx, &mut params, &cache).unwrap();
        let sql = cte.query.to_sql(crate::sql::Dialect::Postgres);
        assert_snapshot!(sql, @r#"
        SELECT
          "productivity"."employee_id" AS "employee_id",
          SUM("productivity"."lines_of_code") AS "totalLinesOfCode"
        FROM "productivity"
        GROUP BY "productivity"."employee_id"
        HAVING SUM("productivity"."lines_of_code") > $1
        "#);
    }
}
