//! Query validator (§4.2).

use crate::error::ValidationError;
use crate::query::{Condition, DateRangeInput, Filter, Operator, SemanticQuery};
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

enum MemberRole {
    Measure,
    Dimension,
    Either,
}

/// Validates a query against the registry, accumulating every error
/// rather than stopping at the first (§4.2).
pub fn validate(query: &SemanticQuery, registry: &Registry) -> ValidationResult {
    let mut errors = Vec::new();

    for reference in &query.measures {
        check_member(reference, registry, MemberRole::Measure, &mut errors);
    }
    for reference in &query.dimensions {
        check_member(reference, registry, MemberRole::Dimension, &mut errors);
    }
    for td in &query.time_dimensions {
        check_member(&td.dimension, registry, MemberRole::Dimension, &mut errors);
    }
    for filter in &query.filters {
        check_filter(filter, registry, &mut errors);
    }

    if query.all_member_refs().is_empty() {
        errors.push(ValidationError::NoCubeReferenced);
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}

fn check_filter(filter: &Filter, registry: &Registry, errors: &mut Vec<ValidationError>) {
    match filter {
        Filter::Condition(c) => {
            check_member(&c.member, registry, MemberRole::Either, errors);
            check_operator_arity(c, errors);
        }
        Filter::And { and } => and.iter().for_each(|f| check_filter(f, registry, errors)),
        Filter::Or { or } => or.iter().for_each(|f| check_filter(f, registry, errors)),
    }
}

/// Rejects operator/value-count combinations that `condition.rs` can't
/// translate into SQL (e.g. `between` needs exactly two values) so they
/// surface as a clean [`ValidationError`] instead of panicking deeper in
/// the planner.
fn check_operator_arity(condition: &Condition, errors: &mut Vec<ValidationError>) {
    let n = condition.values.len();
    let expected: Option<&'static str> = match condition.operator {
        Operator::Set | Operator::NotSet => (n != 0).then_some("0"),
        Operator::Between => (n != 2).then_some("2"),
        Operator::Gt
        | Operator::Gte
        | Operator::Lt
        | Operator::Lte
        | Operator::BeforeDate
        | Operator::AfterDate
        | Operator::ArrayContains => (n != 1).then_some("1"),
        Operator::Equals
        | Operator::NotEquals
        | Operator::Contains
        | Operator::NotContains
        | Operator::StartsWith
        | Operator::NotStartsWith
        | Operator::EndsWith
        | Operator::NotEndsWith
        | Operator::ArrayOverlaps
        | Operator::ArrayContained => (n < 1).then_some("at least 1"),
        Operator::InDateRange => {
            let has_literal_range = matches!(condition.date_range, Some(DateRangeInput::Literal(_)));
            (!has_literal_range && n != 2).then_some("2 (or a literal dateRange)")
        }
    };

    if let Some(expected) = expected {
        errors.push(ValidationError::InvalidOperatorArity {
            reference: condition.member.clone(),
            operator: format!("{:?}", condition.operator),
            expected,
            actual: n,
        });
    }
}

fn check_member(
    reference: &str,
    registry: &Registry,
    role: MemberRole,
    errors: &mut Vec<ValidationError>,
) {
    let parts: Vec<&str> = reference.split('.').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        errors.push(ValidationError::MalformedReference(reference.to_string()));
        return;
    }
    let (cube_name, field_name) = (parts[0], parts[1]);

    let Some(cube) = registry.get(cube_name) else {
        errors.push(ValidationError::UnknownCube {
            reference: reference.to_string(),
            cube: cube_name.to_string(),
        });
        return;
    };

    let found = match role {
        MemberRole::Measure => cube.measures.contains_key(field_name),
        MemberRole::Dimension => cube.dimensions.contains_key(field_name),
        MemberRole::Either => {
            cube.measures.contains_key(field_name) || cube.dimensions.contains_key(field_name)
        }
    };
    if !found {
        errors.push(ValidationError::UnknownField {
            reference: reference.to_string(),
            cube: cube_name.to_string(),
            field: field_name.to_string(),
        });
    }
}
