//! Join definitions.

use super::column::Column;

/// The relationship a join expresses, which in turn determines the
/// default SQL join type (§4.7): `BelongsTo` -> inner, `HasOne`/`HasMany`
/// -> left, `BelongsToMany` -> expanded into two joins through a junction
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

/// One `source = target` equality condition in a join's `on` list.
/// Composite join keys are expressed as multiple `OnCondition`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnCondition {
    pub source: Column,
    pub target: Column,
}

/// A many-to-many join's junction table description.
#[derive(Debug, Clone)]
pub struct Through {
    pub table: String,
    pub source_key: Vec<OnCondition>,
    pub target_key: Vec<OnCondition>,
    /// Security predicate applied to the junction table itself. Optional,
    /// but its absence is a tenant-isolation risk - see `DESIGN.md`.
    pub security_sql: Option<crate::sql::Expr>,
}

/// A named edge from the owning cube to another cube, referenced by name
/// and resolved against the registry at plan time rather than eagerly, so
/// cubes can reference each other regardless of registration order.
#[derive(Debug, Clone)]
pub struct JoinDef {
    pub target_cube: String,
    pub relationship: Relationship,
    pub on: Vec<OnCondition>,
    /// Overrides the relationship-derived SQL join type when set.
    pub sql_join_type: Option<crate::sql::JoinType>,
    pub through: Option<Through>,
}

impl JoinDef {
    pub fn belongs_to(target_cube: impl Into<String>, on: Vec<OnCondition>) -> Self {
        Self {
            target_cube: target_cube.into(),
            relationship: Relationship::BelongsTo,
            on,
            sql_join_type: None,
            through: None,
        }
    }

    pub fn has_one(target_cube: impl Into<String>, on: Vec<OnCondition>) -> Self {
        Self {
            target_cube: target_cube.into(),
            relationship: Relationship::HasOne,
            on,
            sql_join_type: None,
            through: None,
        }
    }

    pub fn has_many(target_cube: impl Into<String>, on: Vec<OnCondition>) -> Self {
        Self {
            target_cube: target_cube.into(),
            relationship: Relationship::HasMany,
            on,
            sql_join_type: None,
            through: None,
        }
    }

    pub fn belongs_to_many(target_cube: impl Into<String>, through: Through) -> Self {
        Self {
            target_cube: target_cube.into(),
            relationship: Relationship::BelongsToMany,
            on: Vec::new(),
            sql_join_type: None,
            through: Some(through),
        }
    }

    /// Default SQL join type for this relationship, absent an override.
    pub fn default_join_type(&self) -> crate::sql::JoinType {
        match self.relationship {
            Relationship::BelongsTo => crate::sql::JoinType::Inner,
            Relationship::HasOne | Relationship::HasMany => crate::sql::JoinType::Left,
            Relationship::BelongsToMany => crate::sql::JoinType::Left,
        }
    }

    pub fn effective_join_type(&self) -> crate::sql::JoinType {
        self.sql_join_type.unwrap_or_else(|| self.default_join_type())
    }
}
