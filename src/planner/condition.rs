//! Translates a [`Condition`] into a SQL predicate, resolving its member
//! reference against the registry and deduplicating bind parameters
//! through a shared [`ParamStore`] (§4.3 "parameter dedup").

use serde_json::Value as JsonValue;

use crate::model::{DimensionDef, MeasureDef, QueryContext};
use crate::query::{Condition, DateRangeInput, Operator};
use crate::registry::Registry;
use crate::sql::{Expr, ExprExt, Literal, ParamStore};

/// Resolves `cube.field` to the SQL expression for that dimension or
/// simple measure's base column, evaluated for the current context.
pub fn resolve_member(
    reference: &str,
    registry: &Registry,
    ctx: &QueryContext,
) -> Option<Expr> {
    let (cube_name, field) = reference.split_once('.')?;
    let cube = registry.get(cube_name)?;
    if let Some(DimensionDef { sql, .. }) = cube.dimensions.get(field) {
        return Some((sql)(ctx).into_expr());
    }
    if let Some(MeasureDef::Simple { sql, .. }) = cube.measures.get(field) {
        return Some((sql)(ctx).into_expr());
    }
    None
}

pub(crate) fn json_literal_expr(value: &JsonValue) -> Expr {
    Expr::Literal(json_to_literal(value))
}

fn json_to_literal(value: &JsonValue) -> Literal {
    match value {
        JsonValue::String(s) => Literal::String(s.clone()),
        JsonValue::Bool(b) => Literal::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Literal::Int(i)
            } else {
                Literal::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        _ => Literal::Null,
    }
}

fn param(params: &mut ParamStore, value: &JsonValue) -> Expr {
    params.push(json_to_literal(value))
}

/// Builds the predicate for a single condition against an already-resolved
/// column expression, binding each value through `params` so repeated
/// literals across a query share one placeholder.
pub fn build_condition_expr(
    condition: &Condition,
    column: Expr,
    params: &mut ParamStore,
) -> Expr {
    let mut values = || -> Vec<Expr> {
        condition
            .values
            .iter()
            .map(|v| param(params, v))
            .collect()
    };

    match condition.operator {
        Operator::Equals => {
            if condition.values.len() == 1 {
                column.eq(values().remove(0))
            } else {
                Expr::In {
                    expr: Box::new(column),
                    values: values(),
                    negated: false,
                }
            }
        }
        Operator::NotEquals => {
            if condition.values.len() == 1 {
                column.ne(values().remove(0))
            } else {
                Expr::In {
                    expr: Box::new(column),
                    values: values(),
                    negated: true,
                }
            }
        }
        Operator::Contains => like_pattern(column, condition, params, "%{}%", false),
        Operator::NotContains => like_pattern(column, condition, params, "%{}%", true),
        Operator::StartsWith => like_pattern(column, condition, params, "{}%", false),
        Operator::NotStartsWith => like_pattern(column, condition, params, "{}%", true),
        Operator::EndsWith => like_pattern(column, condition, params, "%{}", false),
        Operator::NotEndsWith => like_pattern(column, condition, params, "%{}", true),
        Operator::Gt => column.gt(values().remove(0)),
        Operator::Gte => column.gte(values().remove(0)),
        Operator::Lt => column.lt(values().remove(0)),
        Operator::Lte => column.lte(values().remove(0)),
        Operator::Set => Expr::IsNull {
            expr: Box::new(column),
            negated: true,
        },
        Operator::NotSet => Expr::IsNull {
            expr: Box::new(column),
            negated: false,
        },
        Operator::Between => {
            let mut vs = values();
            let high = vs.pop().expect("between requires two values");
            let low = vs.pop().expect("between requires two values");
            Expr::Between {
                expr: Box::new(column),
                low: Box::new(low),
                high: Box::new(high),
                negated: false,
            }
        }
        Operator::InDateRange => in_date_range(column, condition, params),
        Operator::BeforeDate => column.lt(values().remove(0)),
        Operator::AfterDate => column.gt(values().remove(0)),
        Operator::ArrayContains => Expr::Function {
            name: "ARRAY_CONTAINS".into(),
            args: vec![column, values().remove(0)],
            distinct: false,
        },
        Operator::ArrayOverlaps => Expr::Function {
            name: "ARRAY_OVERLAPS".into(),
            args: std::iter::once(column).chain(values()).collect(),
            distinct: false,
        },
        Operator::ArrayContained => Expr::Function {
            name: "ARRAY_CONTAINED_BY".into(),
            args: std::iter::once(column).chain(values()).collect(),
            distinct: false,
        },
    }
}

fn like_pattern(
    column: Expr,
    condition: &Condition,
    params: &mut ParamStore,
    template: &str,
    negated: bool,
) -> Expr {
    let raw = condition
        .values
        .first()
        .and_then(JsonValue::as_str)
        .unwrap_or_default();
    let pattern = template.replace("{}", raw);
    let placeholder = params.push(Literal::String(pattern));
    let like = column.like(placeholder);
    if negated {
        like.not()
    } else {
        like
    }
}

fn in_date_range(column: Expr, condition: &Condition, params: &mut ParamStore) -> Expr {
    let (start, end) = match &condition.date_range {
        Some(DateRangeInput::Literal([s, e])) => (s.clone(), e.clone()),
        _ => {
            let mut it = condition.values.iter().filter_map(JsonValue::as_str);
            (
                it.next().unwrap_or_default().to_string(),
                it.next().unwrap_or_default().to_string(),
            )
        }
    };
    let low = params.push(Literal::String(start));
    let high = params.push(Literal::String(end));
    Expr::Between {
        expr: Box::new(column),
        low: Box::new(low),
        high: Box::new(high),
        negated: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::col;

    #[test]
    fn test_equals_single_value_becomes_eq() {
        let mut params = ParamStore::new();
        let condition = Condition {
            member: "Employees.active".into(),
            operator: Operator::Equals,
            values: vec![JsonValue::Bool(true)],
            date_range: None,
        };
        let expr = build_condition_expr(&condition, col("active"), &mut params);
        assert!(matches!(expr, Expr::BinaryOp { .. }));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_equals_multi_value_becomes_in() {
        let mut params = ParamStore::new();
        let condition = Condition {
            member: "Employees.dept".into(),
            operator: Operator::Equals,
            values: vec![JsonValue::from(1), JsonValue::from(2)],
            date_range: None,
        };
        let expr = build_condition_expr(&condition, col("dept"), &mut params);
        match expr {
            Expr::In { negated, values, .. } => {
                assert!(!negated);
                assert_eq!(values.len(), 2);
            }
            _ => panic!("expected IN"),
        }
    }

    #[test]
    fn test_set_becomes_is_not_null() {
        let mut params = ParamStore::new();
        let condition = Condition {
            member: "Employees.email".into(),
            operator: Operator::Set,
            values: vec![],
            date_range: None,
        };
        let expr = build_condition_expr(&condition, col("email"), &mut params);
        assert!(matches!(expr, Expr::IsNull { negated: true, .. }));
    }

    #[test]
    fn test_params_dedup_equal_literals() {
        let mut params = ParamStore::new();
        let a = Condition {
            member: "Employees.dept".into(),
            operator: Operator::Equals,
            values: vec![JsonValue::from(7)],
            date_range: None,
        };
        let b = a.clone();
        build_condition_expr(&a, col("dept"), &mut params);
        build_condition_expr(&b, col("dept"), &mut params);
        assert_eq!(params.len(), 1);
    }
}
