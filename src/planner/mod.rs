//! The query planner (§4.6–§4.12): turns a validated [`SemanticQuery`]
//! into a [`QueryPlan`] the assembler can render to SQL.

pub mod assembler;
pub mod comparison;
pub mod condition;
pub mod cte_builder;
pub mod date_range;
pub mod gap_fill;
pub mod join_resolver;
pub mod measure_builder;
pub mod window_builder;

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::PlanError;
use crate::model::{JoinDef, Relationship};
use crate::query::{Filter, SemanticQuery};
use crate::registry::Registry;
use crate::sql::JoinType;

use join_resolver::JoinGraph;

/// One join the assembler must emit, in traversal order.
#[derive(Debug, Clone)]
pub struct PlannedJoin {
    pub from_cube: String,
    pub to_cube: String,
    pub join_type: JoinType,
    pub on: JoinDef,
    /// Set for the synthetic junction-table leg of a `belongsToMany` join.
    pub is_junction: bool,
}

/// A filter condition on `source_cube` that must be pushed into a CTE's
/// WHERE as `target_col IN (SELECT source_pk FROM source_cube WHERE ...)`
/// (§4.7/§4.9).
#[derive(Debug, Clone)]
pub struct PropagatingFilter {
    pub source_cube: String,
    pub condition: crate::query::Condition,
}

/// A pre-aggregation CTE built for a `hasMany`-joined cube whose measures
/// the outer query needs (§4.7).
#[derive(Debug, Clone)]
pub struct CtePlan {
    pub cube: String,
    pub alias: String,
    /// Measure field names (union of SELECT + filter references, expanded
    /// for calculated dependencies).
    pub measures: Vec<String>,
    pub propagating_filters: Vec<PropagatingFilter>,
    /// Join-key columns (on the CTE cube's side) to project verbatim so
    /// the outer query can join back against them.
    pub join_keys: Vec<crate::model::OnCondition>,
    /// Plain dimension field names the outer query selects/groups by on
    /// this cube, projected verbatim alongside the join keys (§4.9 step 3).
    pub dimensions: Vec<String>,
    /// Time-dimension field names the outer query selects on this cube,
    /// projected verbatim - truncation to the requested granularity is
    /// applied by the outer query, not inside the CTE (§4.9 step 4).
    pub time_dimensions: Vec<String>,
}

/// The full plan for one (non-comparison) query execution.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub primary_cube: String,
    pub joins: Vec<PlannedJoin>,
    pub ctes: Vec<CtePlan>,
}

impl QueryPlan {
    pub fn cte_for(&self, cube: &str) -> Option<&CtePlan> {
        self.ctes.iter().find(|c| c.cube == cube)
    }
}

/// Builds a [`QueryPlan`] for `query` against `registry` (§4.7).
pub fn plan(registry: &Registry, query: &SemanticQuery) -> Result<QueryPlan, PlanError> {
    let referenced_cubes = referenced_cube_names(query);
    if referenced_cubes.is_empty() {
        return Err(PlanError::UnknownCube(String::new()));
    }

    let graph = JoinGraph::build(registry, &all_known_cube_names(registry, &referenced_cubes))?;
    let primary = choose_primary_cube(registry, query, &referenced_cubes, &graph)?;
    tracing::debug!(primary_cube = %primary, cubes = ?referenced_cubes, "planned primary cube");

    let mut joins = Vec::new();
    let mut others: Vec<&String> = referenced_cubes.iter().filter(|c| **c != primary).collect();
    others.sort();
    for target in others {
        let steps = graph.find_path(&primary, target, &[])?;
        let mut from_cube = primary.clone();
        for step in steps {
            let join_def = &step.join;
            if join_def.relationship == Relationship::BelongsToMany {
                let through = join_def
                    .through
                    .as_ref()
                    .expect("belongsToMany join must carry a through");
                let junction_alias = format!("{}_{}", from_cube, through.table);
                joins.push(PlannedJoin {
                    from_cube: from_cube.clone(),
                    to_cube: junction_alias.clone(),
                    join_type: JoinType::Left,
                    on: join_def.clone(),
                    is_junction: true,
                });
                joins.push(PlannedJoin {
                    from_cube: junction_alias,
                    to_cube: step.to_cube.clone(),
                    join_type: JoinType::Left,
                    on: join_def.clone(),
                    is_junction: false,
                });
            } else {
                joins.push(PlannedJoin {
                    from_cube: from_cube.clone(),
                    to_cube: step.to_cube.clone(),
                    join_type: join_def.effective_join_type(),
                    on: join_def.clone(),
                    is_junction: false,
                });
            }
            from_cube = step.to_cube.clone();
        }
    }

    let ctes = build_ctes(registry, query, &primary, &joins)?;

    Ok(QueryPlan {
        primary_cube: primary,
        joins,
        ctes,
    })
}

fn referenced_cube_names(query: &SemanticQuery) -> BTreeSet<String> {
    query
        .all_member_refs()
        .into_iter()
        .filter_map(|r| r.split('.').next().map(str::to_string))
        .collect()
}

fn all_known_cube_names(registry: &Registry, referenced: &BTreeSet<String>) -> Vec<String> {
    // The join graph needs every cube reachable from the referenced set,
    // not just the referenced cubes themselves, so transitively-joined
    // cubes resolve too. Registering the full registry keeps this simple;
    // registries are expected to be query-sized in practice (§5).
    let mut names = registry.names();
    for r in referenced {
        if !names.contains(r) {
            names.push(r.clone());
        }
    }
    names
}

/// Primary-cube choice (§4.7), deterministic and independent of input
/// array order:
/// 1. If there are dimensions, the cube appearing most often in dimension
///    refs, tie-broken alphabetically, that can reach every other
///    referenced cube.
/// 2. Else the referenced cube with the most join edges that can reach
///    every other referenced cube, tie-broken alphabetically.
/// 3. Else the alphabetically first referenced cube.
fn choose_primary_cube(
    registry: &Registry,
    query: &SemanticQuery,
    referenced: &BTreeSet<String>,
    graph: &JoinGraph,
) -> Result<String, PlanError> {
    let targets: Vec<String> = referenced.iter().cloned().collect();

    if !query.dimensions.is_empty() || !query.time_dimensions.is_empty() {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for d in &query.dimensions {
            if let Some(cube) = d.split('.').next() {
                *counts.entry(cube).or_insert(0) += 1;
            }
        }
        for td in &query.time_dimensions {
            if let Some(cube) = td.dimension.split('.').next() {
                *counts.entry(cube).or_insert(0) += 1;
            }
        }
        let mut candidates: Vec<(&str, usize)> = counts.into_iter().collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        for (cube, _) in candidates {
            if graph.can_reach_all(cube, &targets) {
                return Ok(cube.to_string());
            }
        }
    }

    let mut by_edges: Vec<(String, usize)> = referenced
        .iter()
        .filter_map(|name| registry.get(name).map(|c| (name.clone(), c.joins.len())))
        .collect();
    by_edges.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (cube, _) in by_edges {
        if graph.can_reach_all(&cube, &targets) {
            return Ok(cube);
        }
    }

    referenced
        .iter()
        .next()
        .cloned()
        .ok_or_else(|| PlanError::UnknownCube(String::new()))
}

/// Pre-aggregation CTE decisions (§4.7): for each `hasMany` join from the
/// primary, build a CTE if the plan references any measure (not merely a
/// dimension) of the target cube, from SELECT or from any filter.
/// `belongsToMany` never triggers a CTE.
fn build_ctes(
    registry: &Registry,
    query: &SemanticQuery,
    primary: &str,
    joins: &[PlannedJoin],
) -> Result<Vec<CtePlan>, PlanError> {
    let mut ctes = Vec::new();

    for join in joins {
        if join.from_cube != primary || join.is_junction {
            continue;
        }
        if join.on.relationship != Relationship::HasMany {
            continue;
        }
        let target = &join.to_cube;
        let Some(cube) = registry.get(target) else {
            continue;
        };

        let mut measures: BTreeSet<String> = query
            .measures
            .iter()
            .filter_map(|m| strip_cube_prefix(m, target))
            .collect();
        for filter_measure in filter_measure_refs(&query.filters, target, &cube) {
            measures.insert(filter_measure);
        }
        if measures.is_empty() {
            continue;
        }

        let dimensions: BTreeSet<String> = query
            .dimensions
            .iter()
            .filter_map(|d| strip_cube_prefix(d, target))
            .collect();
        let time_dimensions: BTreeSet<String> = query
            .time_dimensions
            .iter()
            .filter_map(|td| strip_cube_prefix(&td.dimension, target))
            .collect();

        let expanded = expand_calculated_dependencies(&cube, measures);
        let propagating_filters = propagating_filters_for(query, target, registry);
        tracing::debug!(cube = %target, measures = ?expanded, "pre-aggregating hasMany cube into CTE");

        ctes.push(CtePlan {
            cube: target.clone(),
            alias: format!("{target}_cte"),
            measures: expanded.into_iter().collect(),
            propagating_filters,
            join_keys: join.on.on.clone(),
            dimensions: dimensions.into_iter().collect(),
            time_dimensions: time_dimensions.into_iter().collect(),
        });
    }

    Ok(ctes)
}

fn strip_cube_prefix(reference: &str, cube: &str) -> Option<String> {
    reference
        .strip_prefix(cube)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(str::to_string)
}

fn filter_measure_refs(
    filters: &[Filter],
    target_cube: &str,
    cube: &crate::model::Cube,
) -> Vec<String> {
    let mut out = Vec::new();
    fn walk(
        filter: &Filter,
        target_cube: &str,
        cube: &crate::model::Cube,
        out: &mut Vec<String>,
    ) {
        match filter {
            Filter::Condition(c) => {
                if let Some(field) = strip_cube_prefix(&c.member, target_cube) {
                    if cube.measures.contains_key(&field) {
                        out.push(field);
                    }
                }
            }
            Filter::And { and } => and.iter().for_each(|f| walk(f, target_cube, cube, out)),
            Filter::Or { or } => or.iter().for_each(|f| walk(f, target_cube, cube, out)),
        }
    }
    for filter in filters {
        walk(filter, target_cube, cube, &mut out);
    }
    out
}

fn expand_calculated_dependencies(
    cube: &crate::model::Cube,
    seed: BTreeSet<String>,
) -> BTreeSet<String> {
    let mut expanded = seed.clone();
    let mut stack: Vec<String> = seed.into_iter().collect();
    while let Some(name) = stack.pop() {
        if let Some(crate::model::MeasureDef::Calculated { template, .. }) = cube.measures.get(&name) {
            for reference in crate::model::MeasureDef::parse_template_refs(template) {
                if reference.contains('.') {
                    continue;
                }
                if expanded.insert(reference.clone()) {
                    stack.push(reference);
                }
            }
        }
    }
    expanded
}

/// Scans the query's filters (and `timeDimension.dateRange`) for
/// conditions on cubes that have a `hasMany` edge INTO `target_cube`
/// (§4.7). An AND branch may be partially extracted (only conditions on
/// the source cube); an OR is only propagated if every branch belongs to
/// the same source cube - partial OR propagation would change row
/// semantics.
fn propagating_filters_for(
    query: &SemanticQuery,
    target_cube: &str,
    registry: &Registry,
) -> Vec<PropagatingFilter> {
    let source_cubes = has_many_sources_of(registry, target_cube);
    if source_cubes.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for filter in &query.filters {
        collect_propagating(filter, &source_cubes, &mut out);
    }
    for td in &query.time_dimensions {
        let Some(date_range) = &td.date_range else {
            continue;
        };
        let Some(cube) = td.dimension.split('.').next() else {
            continue;
        };
        if !source_cubes.contains(cube) {
            continue;
        }
        out.push(PropagatingFilter {
            source_cube: cube.to_string(),
            condition: crate::query::Condition {
                member: td.dimension.clone(),
                operator: crate::query::Operator::InDateRange,
                values: Vec::new(),
                date_range: Some(date_range.clone()),
            },
        });
    }
    out
}

fn has_many_sources_of(registry: &Registry, target_cube: &str) -> HashSet<String> {
    let mut sources = HashSet::new();
    for name in registry.names() {
        let Some(cube) = registry.get(&name) else {
            continue;
        };
        for join in cube.joins.values() {
            if join.target_cube == target_cube && join.relationship == Relationship::HasMany {
                sources.insert(name.clone());
            }
        }
    }
    sources
}

fn collect_propagating(
    filter: &Filter,
    source_cubes: &HashSet<String>,
    out: &mut Vec<PropagatingFilter>,
) {
    match filter {
        Filter::Condition(c) => {
            if let Some(cube) = c.member.split('.').next() {
                if source_cubes.contains(cube) {
                    out.push(PropagatingFilter {
                        source_cube: cube.to_string(),
                        condition: c.clone(),
                    });
                }
            }
        }
        Filter::And { and } => {
            for f in and {
                collect_propagating(f, source_cubes, out);
            }
        }
        Filter::Or { or } => {
            let cubes: HashSet<&str> = or
                .iter()
                .filter_map(|f| single_condition_cube(f))
                .collect();
            if cubes.len() == 1 {
                let cube = *cubes.iter().next().unwrap();
                if source_cubes.contains(cube) {
                    for f in or {
                        collect_propagating(f, source_cubes, out);
                    }
                }
            }
            // Mixed-cube OR: forbidden to partially propagate, so skipped
            // entirely here (§4.7).
        }
    }
}

fn single_condition_cube(filter: &Filter) -> Option<&str> {
    match filter {
        Filter::Condition(c) => c.member.split('.').next(),
        _ => None,
    }
}
