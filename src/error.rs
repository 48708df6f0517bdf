//! Unified error taxonomy.
//!
//! `CubeDefinitionError`, `ValidationError`, and `PlanError` carry
//! structured diagnostic payloads (offending measure name, cycle path,
//! cube/field pairs) and get hand-written `Display`/`Error` impls rather
//! than `thiserror`'s derive, since the payload shape varies per variant.
//! `ExecutionError` and `CacheError` each wrap a single external failure
//! and use `thiserror::Error` instead.

use std::fmt;

/// Raised by [`crate::registry::Registry::register`] when a cube's
/// calculated measures fail structural validation (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum CubeDefinitionError {
    /// A calculated measure's template references a measure that does not
    /// exist on the named cube.
    UnknownReference {
        cube: String,
        measure: String,
        reference: String,
    },
    /// A calculated measure's template references itself.
    SelfReference { cube: String, measure: String },
    /// A calculated measure's dependency graph contains a cycle.
    CyclicDependency { cube: String, cycle: Vec<String> },
    /// A cube with this name is already registered.
    DuplicateCube(String),
}

impl fmt::Display for CubeDefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CubeDefinitionError::UnknownReference {
                cube,
                measure,
                reference,
            } => write!(
                f,
                "measure '{cube}.{measure}' references unknown measure '{reference}'"
            ),
            CubeDefinitionError::SelfReference { cube, measure } => {
                write!(f, "measure '{cube}.{measure}' references itself")
            }
            CubeDefinitionError::CyclicDependency { cube, cycle } => write!(
                f,
                "cyclic measure dependency in cube '{cube}': {}",
                cycle.join(" -> ")
            ),
            CubeDefinitionError::DuplicateCube(name) => {
                write!(f, "cube '{name}' is already registered")
            }
        }
    }
}

impl std::error::Error for CubeDefinitionError {}

/// One failed assertion from [`crate::validator::validate`] (§4.2). All
/// errors are accumulated, not just the first.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A `cube.field` reference did not have exactly two dot-separated
    /// parts.
    MalformedReference(String),
    /// The referenced cube is not registered.
    UnknownCube { reference: String, cube: String },
    /// The referenced field is not a measure/dimension (as appropriate)
    /// on its cube.
    UnknownField { reference: String, cube: String, field: String },
    /// The query referenced no cube at all.
    NoCubeReferenced,
    /// A filter's operator was given a number of values it can't operate
    /// on (e.g. `between` with anything other than two).
    InvalidOperatorArity {
        reference: String,
        operator: String,
        expected: &'static str,
        actual: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MalformedReference(r) => {
                write!(f, "malformed member reference '{r}': expected 'Cube.field'")
            }
            ValidationError::UnknownCube { reference, cube } => {
                write!(f, "'{reference}' references unknown cube '{cube}'")
            }
            ValidationError::UnknownField {
                reference,
                cube,
                field,
            } => write!(f, "'{reference}' - cube '{cube}' has no field '{field}'"),
            ValidationError::NoCubeReferenced => {
                write!(f, "query does not reference any cube")
            }
            ValidationError::InvalidOperatorArity {
                reference,
                operator,
                expected,
                actual,
            } => write!(
                f,
                "'{reference}' operator '{operator}' expects {expected} value(s), got {actual}"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Raised by the query planner (§4.6/§4.7) when no valid plan exists.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    /// No join path connects `from` to `to`.
    NoJoinPath { from: String, to: String },
    /// A referenced cube is not registered (should not happen after
    /// validation, but the planner checks again since it runs against a
    /// possibly-different registry snapshot).
    UnknownCube(String),
    /// A referenced measure/dimension does not exist on its cube.
    UnknownMember { cube: String, field: String },
    /// A calculated measure depends on a member living in a different
    /// CTE than the one being assembled - not expressible in one pass.
    CrossCteDependency { measure: String },
    /// A relative date-range token (e.g. `"last N fortnights"`) could not
    /// be resolved.
    InvalidDateRange(String),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::NoJoinPath { from, to } => {
                write!(f, "no join path from '{from}' to '{to}'")
            }
            PlanError::UnknownCube(name) => write!(f, "unknown cube '{name}'"),
            PlanError::UnknownMember { cube, field } => {
                write!(f, "cube '{cube}' has no member '{field}'")
            }
            PlanError::CrossCteDependency { measure } => write!(
                f,
                "measure '{measure}' depends on a member from a different CTE"
            ),
            PlanError::InvalidDateRange(token) => {
                write!(f, "could not resolve date range '{token}'")
            }
        }
    }
}

impl std::error::Error for PlanError {}

/// The innermost failure reported by a [`crate::executor::Driver`]
/// implementation. Carries the structured code/detail/hint a real
/// database error exposes (e.g. Postgres's SQLSTATE plus its `DETAIL`/
/// `HINT` fields) rather than flattening it into a single string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriverError {
    pub message: String,
    pub code: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " - {detail}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {}

/// Errors surfaced by [`crate::executor::Executor::execute`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<ValidationError>),

    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    #[error("database driver error: {0}")]
    Driver(DriverError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_definition_error_display() {
        let err = CubeDefinitionError::UnknownReference {
            cube: "Employees".into(),
            measure: "ratio".into(),
            reference: "missing".into(),
        };
        assert_eq!(
            err.to_string(),
            "measure 'Employees.ratio' references unknown measure 'missing'"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::NoCubeReferenced;
        assert_eq!(err.to_string(), "query does not reference any cube");
    }

    #[test]
    fn test_plan_error_display() {
        let err = PlanError::NoJoinPath {
            from: "A".into(),
            to: "B".into(),
        };
        assert_eq!(err.to_string(), "no join path from 'A' to 'B'");
    }

    #[test]
    fn test_driver_error_display_concatenates_all_fields() {
        let err = DriverError::new("syntax error at or near \"FORM\"")
            .with_code("42601")
            .with_detail("unexpected token")
            .with_hint("did you mean FROM?");
        assert_eq!(
            err.to_string(),
            "syntax error at or near \"FORM\" (code: 42601) - unexpected token (hint: did you mean FROM?)"
        );
    }

    #[test]
    fn test_driver_error_display_message_only() {
        let err = DriverError::new("connection refused");
        assert_eq!(err.to_string(), "connection refused");
    }
}
