//! Main SQL Assembler (§4.10): renders a [`QueryPlan`] and a
//! [`SemanticQuery`] into one executable [`Query`] plus its deduplicated
//! bind parameters.

use crate::cache::FilterSqlCache;
use crate::error::PlanError;
use crate::model::types::AggregationType;
use crate::model::{MeasureDef, QueryContext};
use crate::query::{Filter, OrderDirection, SemanticQuery};
use crate::registry::Registry;
use crate::sql::{
    Dialect, Expr, ExprExt, OrderByExpr, ParamStore, Query, SelectExpr, SqlDialect,
};

use super::condition::{build_condition_expr, resolve_member};
use super::cte_builder;
use super::measure_builder;
use super::{CtePlan, PlannedJoin, QueryPlan};

/// The assembled SQL plus its positional bind parameters, ready for a
/// driver to execute.
pub struct Assembled {
    pub query: Query,
    pub params: ParamStore,
}

pub fn assemble(
    plan: &QueryPlan,
    query: &SemanticQuery,
    registry: &Registry,
    ctx: &QueryContext,
    dialect: Dialect,
    filter_cache: &FilterSqlCache,
) -> Result<Assembled, PlanError> {
    let mut params = ParamStore::new();

    let mut ctes = Vec::new();
    for cte_plan in &plan.ctes {
        ctes.push(cte_builder::build_cte(
            cte_plan,
            registry,
            query,
            ctx,
            &mut params,
            filter_cache,
        )?);
    }

    let primary = registry
        .get(&plan.primary_cube)
        .ok_or_else(|| PlanError::UnknownCube(plan.primary_cube.clone()))?;
    let primary_base = primary.base_query(ctx);

    let mut select = Vec::new();
    let mut group_by = Vec::new();
    let mut has_aggregate = false;

    for measure_ref in &query.measures {
        let (cube_name, field) = measure_ref
            .split_once('.')
            .ok_or_else(|| PlanError::UnknownMember {
                cube: measure_ref.clone(),
                field: String::new(),
            })?;
        has_aggregate = true;
        let expr = if let Some(cte) = plan.cte_for(cube_name) {
            reaggregate_from_cte(cube_name, field, cte, registry)?
        } else {
            build_outer_measure(cube_name, field, registry, ctx, &mut params, filter_cache)?
        };
        select.push(SelectExpr::new(expr).with_alias(&alias_for(measure_ref)));
    }

    for dim_ref in &query.dimensions {
        let expr = resolve_dimension(dim_ref, plan, registry, ctx)?;
        select.push(SelectExpr::new(expr.clone()).with_alias(&alias_for(dim_ref)));
        group_by.push(expr);
    }

    for td in &query.time_dimensions {
        let base = resolve_dimension(&td.dimension, plan, registry, ctx)?;
        let granularity = td.granularity.unwrap_or(crate::model::types::Granularity::Day);
        let expr = dialect.truncate_date(base, granularity);
        select.push(SelectExpr::new(expr.clone()).with_alias(&alias_for(&td.dimension)));
        group_by.push(expr);
    }

    if select.is_empty() {
        return Err(PlanError::UnknownMember {
            cube: plan.primary_cube.clone(),
            field: String::new(),
        });
    }

    let mut q = Query::new().select(select).from(primary_base.from.clone());

    for planned_join in &plan.joins {
        q = apply_join(q, planned_join, plan, registry, ctx)?;
    }

    let mut where_clause = primary_base.where_.clone();
    for cube_name in joined_base_cube_names(plan) {
        if plan.cte_for(&cube_name).is_some() {
            continue;
        }
        if let Some(cube) = registry.get(&cube_name) {
            if let Some(w) = cube.base_query(ctx).where_ {
                where_clause = Some(match where_clause {
                    Some(existing) => existing.and(w),
                    None => w,
                });
            }
        }
    }

    for filter in &query.filters {
        if let Some(expr) = outer_filter_expr(filter, plan, registry, ctx, &mut params)? {
            where_clause = Some(match where_clause {
                Some(existing) => existing.and(expr),
                None => expr,
            });
        }
    }

    if let Some(w) = where_clause {
        q = q.filter(w);
    }

    if has_aggregate && !group_by.is_empty() {
        q = q.group_by(group_by);
    }

    let mut order_by = Vec::new();
    for order in &query.order {
        let expr = Expr::Column {
            table: None,
            column: alias_for(&order.field),
        };
        order_by.push(match order.direction {
            OrderDirection::Asc => OrderByExpr::asc(expr),
            OrderDirection::Desc => OrderByExpr::desc(expr),
        });
    }
    if !order_by.is_empty() {
        q = q.order_by(order_by);
    }

    if let Some(limit) = query.limit {
        q = q.limit(limit);
    }
    if let Some(offset) = query.offset {
        q = q.offset(offset);
    }

    for cte in ctes.into_iter().rev() {
        q = q.with_cte(cte);
    }

    Ok(Assembled { query: q, params })
}

fn alias_for(member_reference: &str) -> String {
    member_reference.replace('.', "_")
}

fn resolve_dimension(
    reference: &str,
    plan: &QueryPlan,
    registry: &Registry,
    ctx: &QueryContext,
) -> Result<Expr, PlanError> {
    let (cube_name, field) = reference
        .split_once('.')
        .ok_or_else(|| PlanError::UnknownMember {
            cube: reference.to_string(),
            field: String::new(),
        })?;
    if let Some(cte) = plan.cte_for(cube_name) {
        if cte.dimensions.iter().any(|d| d == field) || cte.time_dimensions.iter().any(|d| d == field) {
            return Ok(crate::sql::table_col(&cte.alias, field));
        }
        if let Some(key) = cte.join_keys.iter().find(|k| k.target.name == field) {
            return Ok(crate::sql::table_col(&cte.alias, &key.target.name));
        }
        return Err(PlanError::UnknownMember {
            cube: cube_name.to_string(),
            field: field.to_string(),
        });
    }
    resolve_member(reference, registry, ctx).ok_or_else(|| PlanError::UnknownMember {
        cube: cube_name.to_string(),
        field: reference.to_string(),
    })
}

fn build_outer_measure(
    cube_name: &str,
    field: &str,
    registry: &Registry,
    ctx: &QueryContext,
    params: &mut ParamStore,
    filter_cache: &FilterSqlCache,
) -> Result<Expr, PlanError> {
    let cube = registry
        .get(cube_name)
        .ok_or_else(|| PlanError::UnknownCube(cube_name.to_string()))?;
    let measure = cube
        .measures
        .get(field)
        .ok_or_else(|| PlanError::UnknownMember {
            cube: cube_name.to_string(),
            field: field.to_string(),
        })?;
    match measure {
        MeasureDef::Simple { .. } => measure_builder::build_simple(measure, ctx, filter_cache, |c| {
            let column = resolve_member(&c.member, registry, ctx).unwrap_or_else(crate::sql::lit_null);
            build_condition_expr(c, column, params)
        }),
        MeasureDef::Calculated { template, .. } => Ok(measure_builder::build_calculated(template, |r| {
            cube.measures
                .get(r)
                .and_then(|m| match m {
                    MeasureDef::Simple { .. } => measure_builder::build_simple(m, ctx, filter_cache, |c| {
                        let column =
                            resolve_member(&c.member, registry, ctx).unwrap_or_else(crate::sql::lit_null);
                        build_condition_expr(c, column, params)
                    })
                    .ok(),
                    _ => None,
                })
                .unwrap_or_else(crate::sql::lit_null)
        })),
        MeasureDef::Window { kind, config } => super::window_builder::build_window(
            *kind,
            config,
            cube_name,
            registry,
            ctx,
            params,
            filter_cache,
        ),
    }
}

/// Re-aggregates a CTE-resident measure for the outer query: `SUM`/`COUNT`
/// style measures combine with an outer `SUM`, `MIN`/`MAX` with the same
/// function (§4.9/§4.10).
fn reaggregate_from_cte(
    cube_name: &str,
    field: &str,
    cte: &CtePlan,
    registry: &Registry,
) -> Result<Expr, PlanError> {
    let cube = registry
        .get(cube_name)
        .ok_or_else(|| PlanError::UnknownCube(cube_name.to_string()))?;
    let measure = cube
        .measures
        .get(field)
        .ok_or_else(|| PlanError::UnknownMember {
            cube: cube_name.to_string(),
            field: field.to_string(),
        })?;
    let cte_col = crate::sql::table_col(&cte.alias, field);
    let kind = match measure {
        MeasureDef::Simple { kind, .. } => *kind,
        _ => AggregationType::Sum,
    };
    Ok(match kind {
        AggregationType::Count | AggregationType::CountDistinct | AggregationType::Sum => {
            crate::sql::sum(cte_col)
        }
        AggregationType::CountDistinctApprox => crate::sql::sum(cte_col),
        AggregationType::Avg => crate::sql::avg(cte_col),
        AggregationType::Min => crate::sql::min(cte_col),
        AggregationType::Max => crate::sql::max(cte_col),
        AggregationType::Number => cte_col,
    })
}

fn apply_join(
    q: Query,
    planned: &PlannedJoin,
    plan: &QueryPlan,
    registry: &Registry,
    ctx: &QueryContext,
) -> Result<Query, PlanError> {
    if planned.is_junction {
        let through = planned
            .on
            .through
            .as_ref()
            .expect("junction leg must carry a through");
        let on_expr = equality_chain(&through.source_key);
        let table = crate::sql::TableRef::new(&through.table).with_alias(&planned.to_cube);
        return Ok(q.join(planned.join_type, table, on_expr));
    }

    if let Some(through) = planned.on.through.as_ref() {
        // Target leg of a belongsToMany: join the real target cube's base
        // table against the junction alias already in FROM.
        let target_cube = registry
            .get(&planned.to_cube)
            .ok_or_else(|| PlanError::UnknownCube(planned.to_cube.clone()))?;
        let base = target_cube.base_query(ctx);
        let on_expr = equality_chain(&through.target_key);
        return Ok(q.join(planned.join_type, base.from, on_expr));
    }

    if let Some(cte) = plan.cte_for(&planned.to_cube) {
        let table = crate::sql::TableRef::new(&cte.alias);
        let on_expr = planned
            .on
            .on
            .iter()
            .map(|k| {
                let cte_col = cte
                    .join_keys
                    .first()
                    .map(|first| crate::sql::table_col(&cte.alias, &first.target.name))
                    .unwrap_or_else(crate::sql::lit_null);
                k.source.to_expr().eq(cte_col)
            })
            .reduce(|a, b| a.and(b))
            .unwrap_or_else(crate::sql::lit_null);
        return Ok(q.join(planned.join_type, table, on_expr));
    }

    let target_cube = registry
        .get(&planned.to_cube)
        .ok_or_else(|| PlanError::UnknownCube(planned.to_cube.clone()))?;
    let base = target_cube.base_query(ctx);
    let on_expr = equality_chain(&planned.on.on);
    Ok(q.join(planned.join_type, base.from, on_expr))
}

fn equality_chain(conditions: &[crate::model::OnCondition]) -> Expr {
    conditions
        .iter()
        .map(|c| c.source.to_expr().eq(c.target.to_expr()))
        .reduce(|a, b| a.and(b))
        .unwrap_or_else(crate::sql::lit_null)
}

fn joined_base_cube_names(plan: &QueryPlan) -> Vec<String> {
    let mut names: Vec<String> = plan.joins.iter().map(|j| j.to_cube.clone()).collect();
    names.retain(|n| !n.contains('_')); // junction aliases are synthetic, not real cubes
    names
}

fn outer_filter_expr(
    filter: &Filter,
    plan: &QueryPlan,
    registry: &Registry,
    ctx: &QueryContext,
    params: &mut ParamStore,
) -> Result<Option<Expr>, PlanError> {
    match filter {
        Filter::Condition(c) => {
            let Some((cube_name, _)) = c.member.split_once('.') else {
                return Ok(None);
            };
            if plan.cte_for(cube_name).is_some() {
                return Ok(None);
            }
            let Some(column) = resolve_member(&c.member, registry, ctx) else {
                return Ok(None);
            };
            Ok(Some(build_condition_expr(c, column, params)))
        }
        Filter::And { and } => {
            let mut parts = Vec::new();
            for f in and {
                if let Some(e) = outer_filter_expr(f, plan, registry, ctx, params)? {
                    parts.push(e);
                }
            }
            Ok(parts.into_iter().reduce(|a, b| a.and(b)))
        }
        Filter::Or { or } => {
            let mut parts = Vec::new();
            for f in or {
                match outer_filter_expr(f, plan, registry, ctx, params)? {
                    Some(e) => parts.push(e),
                    None => return Ok(None),
                }
            }
            Ok(parts.into_iter().reduce(|a, b| a.or(b)))
        }
    }
}
