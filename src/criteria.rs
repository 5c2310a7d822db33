//! Structured query filters sent to the catalog service.
//!
//! A [`Criteria`] value is a composite expression (AND/OR over field
//! predicates) built fresh for each search or removal call. It has no
//! identity beyond its structural value. The same representation is used
//! both for serializing queries to the remote service and for local
//! evaluation against units by the in-memory test catalog.

use serde::{Deserialize, Serialize};

use crate::unit::{Unit, UnitType};

/// A field value appearing in a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Number(i64),
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(v) => FieldValue::Text(v),
            None => FieldValue::Null,
        }
    }
}

/// Composite query/filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criteria {
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    FieldEq { field: String, value: FieldValue },
    FieldIn { field: String, values: Vec<FieldValue> },
    UnitTypeIs(UnitType),
}

impl Criteria {
    pub fn and(inner: Vec<Criteria>) -> Criteria {
        Criteria::And(inner)
    }

    pub fn or(inner: Vec<Criteria>) -> Criteria {
        Criteria::Or(inner)
    }

    pub fn with_field(field: &str, value: impl Into<FieldValue>) -> Criteria {
        Criteria::FieldEq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn with_field_in(field: &str, values: Vec<FieldValue>) -> Criteria {
        Criteria::FieldIn {
            field: field.to_string(),
            values,
        }
    }

    pub fn with_unit_type(unit_type: UnitType) -> Criteria {
        Criteria::UnitTypeIs(unit_type)
    }

    /// Filter by object id: used for repositories and advisories.
    pub fn with_id(ids: Vec<String>) -> Criteria {
        Criteria::FieldIn {
            field: "id".to_string(),
            values: ids.into_iter().map(FieldValue::Text).collect(),
        }
    }

    /// Evaluate this criteria against a unit.
    ///
    /// The remote service evaluates criteria server-side; this local
    /// evaluation exists for the in-memory catalog used in tests and must
    /// agree with the server semantics for the fields we query.
    pub fn matches_unit(&self, unit: &Unit) -> bool {
        match self {
            Criteria::And(inner) => inner.iter().all(|c| c.matches_unit(unit)),
            Criteria::Or(inner) => inner.iter().any(|c| c.matches_unit(unit)),
            Criteria::FieldEq { field, value } => unit
                .field_value(field)
                .map(|have| have == *value)
                .unwrap_or(false),
            Criteria::FieldIn { field, values } => unit
                .field_value(field)
                .map(|have| values.contains(&have))
                .unwrap_or(false),
            Criteria::UnitTypeIs(unit_type) => unit.unit_type() == *unit_type,
        }
    }
}
