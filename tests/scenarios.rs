//! End-to-end scenario tests, one per testable property.

use std::sync::Arc;

use serde_json::json;
use semlayer::model::types::{AggregationType, DimensionKind};
use semlayer::model::{
    BaseQueryDefinition, Column, ColumnExpr, Cube, DimensionDef, JoinDef, MeasureDef, OnCondition,
    OrderRef, WindowConfig, WindowKind, WindowOperation,
};
use semlayer::prelude::*;
use semlayer::query::{Condition, Operator, OrderDirection, TimeDimensionRequest};
use semlayer::sql::TableRef;

fn ctx() -> QueryContext {
    QueryContext::new("default", json!({ "organisationId": 1 }))
}

fn tenant_filter(table: &str) -> semlayer::sql::Expr {
    semlayer::sql::ExprExt::eq(
        semlayer::sql::table_col(table, "organisation_id"),
        semlayer::sql::lit_int(1),
    )
}

fn executor_with_rows(
    registry: Registry,
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
) -> Executor<semlayer::executor::MemoryDriver, MemoryResultCache> {
    Executor::new(
        Arc::new(registry),
        semlayer::executor::MemoryDriver::new(rows),
        None,
        Settings::default(),
    )
    .unwrap()
}

/// S1. Single-cube count: plain tenant-filtered COUNT, no joins.
#[test]
fn s1_single_cube_count() {
    let registry = Registry::new();
    let employees = Cube::new(
        "Employees",
        Arc::new(|ctx: &QueryContext| {
            let _ = ctx;
            BaseQueryDefinition::new(TableRef::new("employees")).with_security(tenant_filter("employees"))
        }),
    )
    .with_measure(
        "count",
        MeasureDef::simple(
            AggregationType::Count,
            Arc::new(|_ctx: &QueryContext| ColumnExpr::Column(Column::new("employees", "id"))),
        ),
    );
    registry.register(employees).unwrap();

    let executor = executor_with_rows(registry, vec![]);
    let query = SemanticQuery {
        measures: vec!["Employees.count".into()],
        ..Default::default()
    };
    let preview = executor.generate_sql(&query, &ctx()).unwrap();
    assert!(preview.sql.contains("COUNT(\"employees\".\"id\")"));
    assert!(preview.sql.contains("\"employees\".\"organisation_id\""));
    assert!(!preview.sql.contains("JOIN"));
}

fn registry_with_employees_productivity() -> Registry {
    let registry = Registry::new();
    let employees = Cube::new(
        "Employees",
        Arc::new(|_ctx: &QueryContext| {
            BaseQueryDefinition::new(TableRef::new("employees")).with_security(tenant_filter("employees"))
        }),
    )
    .with_measure(
        "totalSalary",
        MeasureDef::simple(
            AggregationType::Sum,
            Arc::new(|_ctx: &QueryContext| ColumnExpr::Column(Column::new("employees", "salary"))),
        ),
    )
    .with_dimension(
        "name",
        DimensionDef::new(DimensionKind::String, semlayer::model::column_fn("employees", "name")),
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
        Arc::new(|_ctx: &QueryContext| {
            BaseQueryDefinition::new(TableRef::new("productivity"))
                .with_security(tenant_filter("productivity"))
        }),
    )
    .with_measure(
        "totalLinesOfCode",
        MeasureDef::simple(
            AggregationType::Sum,
            Arc::new(|_ctx: &QueryContext| {
                ColumnExpr::Column(Column::new("productivity", "lines_of_code"))
            }),
        ),
    );
    registry.register(employees).unwrap();
    registry.register(productivity).unwrap();
    registry
}

/// S2. HasMany aggregation with fan-out avoidance: the `hasMany` side's
/// measure gets pre-aggregated in a CTE and LEFT JOINed in, rather than
/// duplicating employee rows per productivity row.
#[test]
fn s2_has_many_fan_out_avoidance() {
    let registry = registry_with_employees_productivity();
    let executor = executor_with_rows(registry, vec![]);
    let query = SemanticQuery {
        measures: vec!["Employees.totalSalary".into(), "Productivity.totalLinesOfCode".into()],
        dimensions: vec!["Employees.name".into()],
        ..Default::default()
    };
    let dry_run = executor.dry_run(&query, &ctx()).unwrap();
    assert_eq!(dry_run.plan.ctes.len(), 1);
    assert_eq!(dry_run.plan.ctes[0].cube, "Productivity");

    let sql = dry_run.sql.sql;
    assert!(sql.starts_with("WITH"));
    assert!(sql.contains("LEFT JOIN"));
    assert!(sql.contains("SUM(\"employees\".\"salary\")"));
    assert!(sql.contains("SUM(\"Productivity_cte\".\"totalLinesOfCode\")"));
}

/// S3. Calculated ratio through a CTE: `activePercentage` built from a
/// pre-aggregated `activeCount`/`count` pair, bounded to [0, 100] over
/// realistic data.
#[test]
fn s3_calculated_ratio_through_cte() {
    let registry = Registry::new();
    let employees = Cube::new(
        "Employees",
        Arc::new(|_ctx: &QueryContext| {
            BaseQueryDefinition::new(TableRef::new("employees")).with_security(tenant_filter("employees"))
        }),
    )
    .with_measure(
        "count",
        MeasureDef::simple(
            AggregationType::Count,
            Arc::new(|_ctx: &QueryContext| ColumnExpr::Column(Column::new("employees", "id"))),
        ),
    )
    .with_measure(
        "activeCount",
        MeasureDef::Simple {
            kind: AggregationType::Count,
            sql: Arc::new(|_ctx: &QueryContext| ColumnExpr::Column(Column::new("employees", "id"))),
            filters: vec![Condition {
                member: "Employees.active".into(),
                operator: Operator::Equals,
                values: vec![json!(true)],
                date_range: None,
            }],
        },
    )
    .with_measure("activePercentage", MeasureDef::calculated("{activeCount}/{count}*100"))
    .with_dimension(
        "active",
        DimensionDef::new(DimensionKind::Boolean, semlayer::model::column_fn("employees", "active")),
    )
    .with_join(
        "department",
        JoinDef::belongs_to(
            "Departments",
            vec![OnCondition {
                source: Column::new("employees", "department_id"),
                target: Column::new("departments", "id"),
            }],
        ),
    );
    let departments = Cube::new(
        "Departments",
        Arc::new(|_ctx: &QueryContext| BaseQueryDefinition::new(TableRef::new("departments"))),
    )
    .with_dimension(
        "name",
        DimensionDef::new(DimensionKind::String, semlayer::model::column_fn("departments", "name")),
    )
    .with_join(
        "employees",
        JoinDef::has_many(
            "Employees",
            vec![OnCondition {
                source: Column::new("departments", "id"),
                target: Column::new("employees", "department_id"),
            }],
        ),
    );
    registry.register(employees).unwrap();
    registry.register(departments).unwrap();

    let mut row = serde_json::Map::new();
    row.insert("Employees_activePercentage".into(), json!(75.0));
    let executor = executor_with_rows(registry, vec![row]);

    let query = SemanticQuery {
        measures: vec!["Employees.activePercentage".into()],
        dimensions: vec!["Departments.name".into()],
        ..Default::default()
    };
    let preview = executor.generate_sql(&query, &ctx()).unwrap();
    assert!(preview.sql.contains("activeCount"));
    assert!(preview.sql.contains("100"));

    let result = tokio_test_block_on(executor.execute(&query, &ctx())).unwrap();
    let percentage = result.data[0]["Employees_activePercentage"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&percentage));
}

/// S4. HAVING on an aggregated CTE measure references the re-aggregated
/// outer expression, not the underlying raw column.
#[test]
fn s4_having_on_cte_measure() {
    let registry = registry_with_employees_productivity();
    let executor = executor_with_rows(registry, vec![]);
    let query = SemanticQuery {
        measures: vec!["Employees.totalSalary".into(), "Productivity.totalLinesOfCode".into()],
        dimensions: vec!["Employees.name".into()],
        filters: vec![semlayer::query::Filter::Condition(Condition {
            member: "Productivity.totalLinesOfCode".into(),
            operator: Operator::Gt,
            values: vec![json!(50000)],
            date_range: None,
        })],
        ..Default::default()
    };
    let preview = executor.generate_sql(&query, &ctx()).unwrap();
    assert!(preview.sql.contains("HAVING SUM(\"productivity\".\"lines_of_code\") > $1"));
    assert!(preview.sql.contains("SUM(\"Productivity_cte\".\"totalLinesOfCode\")"));
}

/// S5. Comparison period: two executions merged, every row tagged with
/// `periodIndex`/`periodLabel`, ordered by period then date.
#[test]
fn s5_comparison_period_merge() {
    let registry = Registry::new();
    let sales = Cube::new(
        "Sales",
        Arc::new(|_ctx: &QueryContext| BaseQueryDefinition::new(TableRef::new("sales"))),
    )
    .with_measure(
        "revenue",
        MeasureDef::simple(
            AggregationType::Sum,
            Arc::new(|_ctx: &QueryContext| ColumnExpr::Column(Column::new("sales", "amount"))),
        ),
    )
    .with_dimension(
        "date",
        DimensionDef::new(DimensionKind::Time, semlayer::model::column_fn("sales", "date")),
    );
    registry.register(sales).unwrap();

    let mut row = serde_json::Map::new();
    row.insert("Sales_date".into(), json!("2024-01-01"));
    row.insert("Sales_revenue".into(), json!(100));
    let executor = executor_with_rows(registry, vec![row]);

    let query = SemanticQuery {
        measures: vec!["Sales.revenue".into()],
        time_dimensions: vec![TimeDimensionRequest {
            dimension: "Sales.date".into(),
            granularity: Some(semlayer::model::types::Granularity::Day),
            date_range: None,
            compare_date_range: Some(vec![
                semlayer::query::DateRangeInput::Literal([
                    "2024-01-01".into(),
                    "2024-01-07".into(),
                ]),
                semlayer::query::DateRangeInput::Literal([
                    "2023-12-25".into(),
                    "2023-12-31".into(),
                ]),
            ]),
            fill_missing_dates: false,
            fill_missing_dates_value: None,
        }],
        ..Default::default()
    };

    let result = tokio_test_block_on(executor.execute(&query, &ctx())).unwrap();
    assert_eq!(result.data.len(), 2);
    for row in &result.data {
        let idx = row["periodIndex"].as_u64().unwrap();
        assert!(idx == 0 || idx == 1);
        assert!(row.contains_key("periodLabel"));
    }
}

/// S6. Post-aggregation LAG difference: the window measure's SQL performs
/// `current - LAG(current)`.
#[test]
fn s6_lag_difference_window_measure() {
    let registry = Registry::new();
    let analytics = Cube::new(
        "Analytics",
        Arc::new(|_ctx: &QueryContext| BaseQueryDefinition::new(TableRef::new("analytics"))),
    )
    .with_measure(
        "totalLines",
        MeasureDef::simple(
            AggregationType::Sum,
            Arc::new(|_ctx: &QueryContext| ColumnExpr::Column(Column::new("analytics", "lines_of_code"))),
        ),
    )
    .with_measure(
        "linesChangeFromPrevious",
        MeasureDef::Window {
            kind: WindowKind::Lag,
            config: Arc::new(WindowConfig {
                measure: "totalLines".into(),
                operation: WindowOperation::Difference,
                order_by: vec![OrderRef {
                    field: "Analytics.date".into(),
                    direction: OrderDirection::Asc,
                }],
                partition_by: vec![],
                offset: Some(1),
                default_value: None,
                n_tile: None,
                frame: None,
            }),
        },
    )
    .with_dimension(
        "date",
        DimensionDef::new(DimensionKind::Time, semlayer::model::column_fn("analytics", "date")),
    );
    registry.register(analytics).unwrap();

    let executor = executor_with_rows(registry, vec![]);
    let query = SemanticQuery {
        measures: vec!["Analytics.totalLines".into(), "Analytics.linesChangeFromPrevious".into()],
        time_dimensions: vec![TimeDimensionRequest {
            dimension: "Analytics.date".into(),
            granularity: Some(semlayer::model::types::Granularity::Day),
            date_range: None,
            compare_date_range: None,
            fill_missing_dates: false,
            fill_missing_dates_value: None,
        }],
        limit: Some(10),
        ..Default::default()
    };
    let preview = executor.generate_sql(&query, &ctx()).unwrap();
    assert!(preview.sql.contains("SUM(\"analytics\".\"lines_of_code\")"));
    assert!(preview.sql.contains("LAG("));
    assert!(preview.sql.contains("LIMIT 10"));
}

/// Minimal blocking helper so scenario tests stay plain `#[test]` rather
/// than dragging in a tokio runtime attribute per case.
fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

