//! The Executor (§4.13): the one state-free entry point a host calls.
//!
//! Owns no per-query state beyond what is injected (`registry`, `driver`,
//! `cache`, `settings`); the filter-SQL cache is built fresh for every
//! `execute` call and dropped at the end of it (§5 "never shared across
//! queries").

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use crate::cache::{cache_key, CacheEntryMetadata, CachedValue, FilterSqlCache, ResultCache};
use crate::config::{FilterCacheLogVerbosity, Settings};
use crate::error::{DriverError, ExecutionError};
use crate::model::QueryContext;
use crate::planner::{self, comparison, date_range, gap_fill};
use crate::query::{Annotation, CacheMetadata, MemberAnnotation, QueryResult, SemanticQuery};
use crate::registry::Registry;
use crate::sql::{Dialect, Literal};
use crate::validator::{self, ValidationResult};

/// The only collaborator the core does not implement itself: raw SQL
/// execution against whatever engine the host has wired up (§6).
///
/// `numeric_fields` names result columns the executor expects to be
/// numeric; some drivers (MySQL, decimals) return these as strings and
/// the implementation is expected to coerce them back to a JSON number.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        params: &[Literal],
        numeric_fields: &[String],
    ) -> Result<Vec<Map<String, JsonValue>>, DriverError>;
}

/// Reference driver that never touches a database - returns an empty
/// result set unconditionally. Useful for `generate_sql`/`dry_run` style
/// callers, and as a placeholder in tests that only assert on SQL shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDriver;

#[async_trait]
impl Driver for NullDriver {
    async fn execute(
        &self,
        _sql: &str,
        _params: &[Literal],
        _numeric_fields: &[String],
    ) -> Result<Vec<Map<String, JsonValue>>, DriverError> {
        Ok(Vec::new())
    }
}

/// Reference driver for tests: always returns a fixed set of rows,
/// regardless of the SQL sent to it.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    rows: Vec<Map<String, JsonValue>>,
}

impl MemoryDriver {
    pub fn new(rows: Vec<Map<String, JsonValue>>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn execute(
        &self,
        _sql: &str,
        _params: &[Literal],
        _numeric_fields: &[String],
    ) -> Result<Vec<Map<String, JsonValue>>, DriverError> {
        Ok(self.rows.clone())
    }
}

/// Preview of the SQL the executor would run, without executing it.
#[derive(Debug, Clone)]
pub struct SqlPreview {
    pub sql: String,
    pub params: Vec<Literal>,
}

/// Planner transparency: the plan plus the SQL it was assembled into.
#[derive(Debug, Clone)]
pub struct DryRun {
    pub plan: planner::QueryPlan,
    pub sql: SqlPreview,
}

/// Drives one query end to end (§4.13). Holds no per-query state; every
/// field here is set up once at host startup and shared across calls.
pub struct Executor<D: Driver, C: ResultCache> {
    registry: Arc<Registry>,
    driver: D,
    cache: Option<C>,
    settings: Settings,
    dialect: Dialect,
}

impl<D: Driver, C: ResultCache> Executor<D, C> {
    pub fn new(
        registry: Arc<Registry>,
        driver: D,
        cache: Option<C>,
        settings: Settings,
    ) -> Result<Self, crate::config::SettingsError> {
        let dialect = settings.resolved_dialect()?;
        Ok(Self {
            registry,
            driver,
            cache,
            settings,
            dialect,
        })
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// `validateQuery` (§6).
    pub fn validate_query(&self, query: &SemanticQuery) -> ValidationResult {
        validator::validate(query, &self.registry)
    }

    /// `metadata` (§6).
    pub fn metadata(&self) -> Vec<crate::registry::CubeMetadata> {
        self.registry.metadata()
    }

    /// `generateSQL` (§6): plan and assemble without executing.
    pub fn generate_sql(
        &self,
        query: &SemanticQuery,
        ctx: &QueryContext,
    ) -> Result<SqlPreview, ExecutionError> {
        let plan = planner::plan(&self.registry, query)?;
        let filter_cache = FilterSqlCache::new();
        let assembled = planner::assembler::assemble(
            &plan,
            query,
            &self.registry,
            ctx,
            self.dialect(),
            &filter_cache,
        )?;
        Ok(SqlPreview {
            sql: assembled.query.to_sql(self.dialect()),
            params: assembled.params.values().to_vec(),
        })
    }

    /// `dryRun` (§6): plan transparency plus the SQL it compiles to.
    pub fn dry_run(
        &self,
        query: &SemanticQuery,
        ctx: &QueryContext,
    ) -> Result<DryRun, ExecutionError> {
        let plan = planner::plan(&self.registry, query)?;
        let filter_cache = FilterSqlCache::new();
        let assembled = planner::assembler::assemble(
            &plan,
            query,
            &self.registry,
            ctx,
            self.dialect(),
            &filter_cache,
        )?;
        let sql = SqlPreview {
            sql: assembled.query.to_sql(self.dialect()),
            params: assembled.params.values().to_vec(),
        };
        Ok(DryRun { plan, sql })
    }

    /// `execute` (§4.13/§6): the full validate -> cache -> plan ->
    /// assemble -> execute -> post-process pipeline.
    pub async fn execute(
        &self,
        query: &SemanticQuery,
        ctx: &QueryContext,
    ) -> Result<QueryResult, ExecutionError> {
        // 1. Validate.
        let validation = validator::validate(query, &self.registry);
        if !validation.is_valid {
            return Err(ExecutionError::Validation(validation.errors));
        }

        // 2. Cache lookup.
        let key = cache_key(query, ctx, &self.settings.cache_defaults);
        if let Some(cache) = &self.cache {
            match cache.get::<QueryResult>(&key).await {
                Ok(Some(CachedValue { mut value, metadata })) => {
                    tracing::debug!(key, "result cache hit");
                    value.cache = Some(cache_metadata(metadata, true));
                    return Ok(value);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%err, "result cache get failed, treating as miss");
                }
            }
        }

        // 3. Comparison expansion, if requested.
        let result = if query.has_comparison() {
            self.execute_comparison(query, ctx).await?
        } else {
            self.execute_single(query, ctx).await?
        };

        // 11. Cache store (miss path only).
        if let Some(cache) = &self.cache {
            if let Err(err) = cache
                .set(&key, &result, Some(self.settings.cache_defaults.default_ttl_ms))
                .await
            {
                tracing::warn!(%err, "result cache set failed");
            }
        }

        Ok(result)
    }

    async fn execute_comparison(
        &self,
        query: &SemanticQuery,
        ctx: &QueryContext,
    ) -> Result<QueryResult, ExecutionError> {
        let today = chrono::Utc::now().date_naive();
        let periods = comparison::expand(query, today)?;
        let td_index = query
            .time_dimensions
            .iter()
            .position(|td| td.compare_date_range.is_some())
            .expect("has_comparison() guaranteed this");
        let time_dimension = periods[0].query.time_dimensions[td_index].clone();

        // Run every comparison period concurrently rather than one at a
        // time (§4.12 step 3).
        let row_results = futures::future::try_join_all(
            periods.iter().map(|period| self.execute_single(&period.query, ctx)),
        )
        .await?;
        let results = periods.into_iter().zip(row_results).collect();
        Ok(comparison::merge(&time_dimension, results))
    }

    async fn execute_single(
        &self,
        query: &SemanticQuery,
        ctx: &QueryContext,
    ) -> Result<QueryResult, ExecutionError> {
        // 4. Plan.
        let plan = planner::plan(&self.registry, query)?;

        // 5. Security sanity.
        if self.settings.dev_mode_security_warning {
            self.warn_on_missing_security_filters(&plan, ctx);
        }

        // 6. Preload filter cache (owned for this call only, §5).
        let filter_cache = FilterSqlCache::new();

        // 7. Assemble & execute.
        let assembled = planner::assembler::assemble(
            &plan,
            query,
            &self.registry,
            ctx,
            self.dialect(),
            &filter_cache,
        )?;
        self.log_filter_cache_stats(&filter_cache);

        let sql = assembled.query.to_sql(self.dialect());
        let numeric_fields: Vec<String> = query
            .measures
            .iter()
            .map(|m| m.replace('.', "_"))
            .collect();

        tracing::debug!(sql = %sql, "executing query");
        let rows = self
            .driver
            .execute(&sql, assembled.params.values(), &numeric_fields)
            .await
            .map_err(ExecutionError::Driver)?;

        // 8. Post-process: normalize time-dimension values.
        let time_dim_columns: Vec<String> = query
            .time_dimensions
            .iter()
            .map(|td| td.dimension.replace('.', "_"))
            .collect();
        let mut rows = rows;
        for row in &mut rows {
            for column in &time_dim_columns {
                if let Some(JsonValue::String(s)) = row.get_mut(column) {
                    normalize_time_value(s);
                }
            }
        }

        // 9. Gap-fill.
        let rows = self.gap_fill(query, rows)?;

        // 10. Annotate.
        let annotation = self.annotate(query);

        Ok(QueryResult {
            data: rows,
            annotation,
            cache: None,
        })
    }

    fn warn_on_missing_security_filters(&self, plan: &planner::QueryPlan, ctx: &QueryContext) {
        let mut cubes = vec![plan.primary_cube.clone()];
        cubes.extend(plan.joins.iter().map(|j| j.to_cube.clone()));
        cubes.extend(plan.ctes.iter().map(|c| c.cube.clone()));
        for name in cubes {
            let Some(cube) = self.registry.get(&name) else {
                continue;
            };
            if cube.base_query(ctx).where_.is_none() {
                tracing::warn!(cube = %name, "cube's base query has no security filter");
            }
        }
    }

    /// Logs this call's filter-SQL cache hit/miss stats at the verbosity
    /// configured by `filter_cache.log_verbosity` (§4.5, §10).
    fn log_filter_cache_stats(&self, filter_cache: &FilterSqlCache) {
        match self.settings.filter_cache.log_verbosity {
            FilterCacheLogVerbosity::Silent => {}
            FilterCacheLogVerbosity::Stats => {
                let stats = filter_cache.stats();
                tracing::debug!(hits = stats.hits, misses = stats.misses, size = stats.size, "filter cache stats");
            }
            FilterCacheLogVerbosity::Debug => {
                let stats = filter_cache.stats();
                tracing::debug!(?stats, "filter cache stats");
            }
        }
    }

    fn gap_fill(
        &self,
        query: &SemanticQuery,
        rows: Vec<Map<String, JsonValue>>,
    ) -> Result<Vec<Map<String, JsonValue>>, ExecutionError> {
        let Some(td) = query.time_dimensions.iter().find(|td| td.fill_missing_dates) else {
            return Ok(rows);
        };
        let Some(range) = &td.date_range else {
            return Ok(rows);
        };
        let today = chrono::Utc::now().date_naive();
        let resolved = date_range::resolve(range, today)?;
        let start = resolved
            .start
            .parse::<chrono::NaiveDate>()
            .map_err(|_| crate::error::PlanError::InvalidDateRange(resolved.start.clone()))?;
        let end = resolved
            .end
            .parse::<chrono::NaiveDate>()
            .map_err(|_| crate::error::PlanError::InvalidDateRange(resolved.end.clone()))?;
        let granularity = td.granularity.unwrap_or(crate::model::types::Granularity::Day);
        let buckets = gap_fill::enumerate_buckets(start, end, granularity)?;
        let time_column = td.dimension.replace('.', "_");
        let measure_columns: Vec<String> = query
            .measures
            .iter()
            .map(|m| m.replace('.', "_"))
            .collect();
        let dimension_columns: Vec<String> = query
            .dimensions
            .iter()
            .map(|d| d.replace('.', "_"))
            .collect();
        Ok(gap_fill::fill_missing(
            rows,
            &time_column,
            &dimension_columns,
            &buckets,
            &measure_columns,
            td.fill_missing_dates_value.clone(),
        ))
    }

    fn annotate(&self, query: &SemanticQuery) -> Annotation {
        let member = |reference: &str| -> Option<MemberAnnotation> {
            let (cube_name, field) = reference.split_once('.')?;
            let cube = self.registry.get(cube_name)?;
            if let Some(dim) = cube.dimensions.get(field) {
                return Some(MemberAnnotation {
                    member: reference.to_string(),
                    title: dim.title.clone().unwrap_or_else(|| field.to_string()),
                    value_type: dim.kind.to_string(),
                    granularity: None,
                });
            }
            if cube.measures.contains_key(field) {
                return Some(MemberAnnotation {
                    member: reference.to_string(),
                    title: field.to_string(),
                    value_type: "number".to_string(),
                    granularity: None,
                });
            }
            None
        };

        Annotation {
            measures: query.measures.iter().filter_map(|m| member(m)).collect(),
            dimensions: query.dimensions.iter().filter_map(|d| member(d)).collect(),
            time_dimensions: query
                .time_dimensions
                .iter()
                .filter_map(|td| {
                    member(&td.dimension).map(|mut a| {
                        a.granularity = td.granularity;
                        a
                    })
                })
                .collect(),
        }
    }
}

fn cache_metadata(metadata: CacheEntryMetadata, hit: bool) -> CacheMetadata {
    CacheMetadata {
        hit,
        cached_at: metadata.cached_at_ms as i64,
        ttl_ms: metadata.ttl_ms,
        ttl_remaining_ms: metadata.ttl_remaining_ms,
    }
}

/// `YYYY-MM-DD HH:MM:SS` -> `YYYY-MM-DDTHH:MM:SSZ` when the driver
/// returned a timezone-less timestamp (§4.13 step 8).
fn normalize_time_value(value: &mut String) {
    if value.contains('T') || value.len() <= 10 {
        return;
    }
    if let Some(space_idx) = value.find(' ') {
        value.replace_range(space_idx..space_idx + 1, "T");
        value.push('Z');
    }
}
