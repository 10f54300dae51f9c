//! Entity list filter expressions.
//!
//! Columns resolve through [`Entity::column_value`]: `name` is the entity id,
//! `label` the label, `__version` the decimal version, anything else a
//! property. Missing values compare as the empty string.

use crate::model::entity::Entity;

/// Filter applied when listing entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityQuery {
    Eq { column: String, value: String },
    NotEq { column: String, value: String },
    And(Box<EntityQuery>, Box<EntityQuery>),
    Or(Box<EntityQuery>, Box<EntityQuery>),
}

impl EntityQuery {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::NotEq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: EntityQuery) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: EntityQuery) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Evaluates this filter against one entity.
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Self::Eq { column, value } => entity.column_value(column) == *value,
            Self::NotEq { column, value } => entity.column_value(column) != *value,
            Self::And(left, right) => left.matches(entity) && right.matches(entity),
            Self::Or(left, right) => left.matches(entity) || right.matches(entity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EntityQuery;
    use crate::model::entity::Entity;

    #[test]
    fn combinators_follow_boolean_logic() {
        let entity = Entity::new("a", "Alpha").with_property("region", "north");

        assert!(EntityQuery::eq("region", "north").matches(&entity));
        assert!(!EntityQuery::not_eq("region", "north").matches(&entity));
        assert!(EntityQuery::eq("name", "a")
            .and(EntityQuery::eq("label", "Alpha"))
            .matches(&entity));
        assert!(EntityQuery::eq("name", "zzz")
            .or(EntityQuery::eq("__version", "1"))
            .matches(&entity));
    }

    #[test]
    fn missing_property_compares_as_empty() {
        let entity = Entity::new("a", "Alpha");
        assert!(EntityQuery::eq("region", "").matches(&entity));
        assert!(EntityQuery::not_eq("region", "north").matches(&entity));
    }
}
