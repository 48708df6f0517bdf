//! Per-execution query context.

use serde_json::Value as JsonValue;

/// Context threaded through every cube's `sql(ctx)` closure and into the
/// planner/assembler. The filter-SQL cache itself is *not* carried here -
/// it is owned by the executor for the lifetime of a single `execute()`
/// call and passed explicitly to planner stages that need it, which keeps
/// `QueryContext` `Clone` and free of interior mutability. See
/// `DESIGN.md` Open Question.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Logical database/connection name the host resolves separately.
    pub db: String,
    /// Optional schema qualifier.
    pub schema: Option<String>,
    /// Opaque host-supplied security context (e.g. `{"organisationId": 1}`),
    /// forwarded verbatim into every cube's base `sql(ctx)`.
    pub security_context: JsonValue,
}

impl QueryContext {
    pub fn new(db: impl Into<String>, security_context: JsonValue) -> Self {
        Self {
            db: db.into(),
            schema: None,
            security_context,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// A stable string for cache-key canonicalization (§4.3): the
    /// security context serialized with sorted object keys.
    pub fn canonical_security_context(&self) -> String {
        crate::cache::key::canonical_json_string(&self.security_context)
    }
}
