//! Field predicates for document lookups

use std::cmp::Ordering;

use serde_json::Value;

/// A comparison applied to one document field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
}

impl Condition {
    /// Whether `field` satisfies this condition (a missing field is `null`)
    #[must_use]
    pub fn matches(&self, field: Option<&Value>) -> bool {
        let field = field.unwrap_or(&Value::Null);
        match self {
            Self::Eq(expected) => field == expected,
            Self::Ne(expected) => field != expected,
            Self::Lt(bound) => compare(field, bound) == Some(Ordering::Less),
            Self::Lte(bound) => matches!(
                compare(field, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt(bound) => compare(field, bound) == Some(Ordering::Greater),
            Self::Gte(bound) => matches!(
                compare(field, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

/// Order two values of the same kind; mixed kinds are unordered
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// Conjunction of field conditions; the empty query matches every document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<(String, Condition)>,
}

impl Query {
    /// Query that matches everything
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality condition
    #[must_use]
    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Eq(value.into()))
    }

    /// Add an arbitrary condition
    #[must_use]
    pub fn with(mut self, field: &str, condition: Condition) -> Self {
        self.conditions.push((field.to_string(), condition));
        self
    }

    /// Whether the document satisfies every condition
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(document.get(field)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_query_matches_anything() {
        assert!(Query::all().matches(&json!({"id": 1})));
    }

    #[test]
    fn equality_and_inequality() {
        let doc = json!({"id": 1, "name": "Test"});
        assert!(Query::all().eq("id", 1).matches(&doc));
        assert!(!Query::all().eq("id", 2).matches(&doc));
        assert!(Query::all().with("name", Condition::Ne(json!("Other"))).matches(&doc));
    }

    #[test]
    fn ordered_comparisons_on_numbers_and_strings() {
        let doc = json!({"value": 10, "name": "beta"});
        assert!(Query::all().with("value", Condition::Gt(json!(5))).matches(&doc));
        assert!(Query::all().with("value", Condition::Gte(json!(10))).matches(&doc));
        assert!(Query::all().with("value", Condition::Lte(json!(10.0))).matches(&doc));
        assert!(!Query::all().with("value", Condition::Lt(json!(10))).matches(&doc));
        assert!(Query::all().with("name", Condition::Lt(json!("gamma"))).matches(&doc));
    }

    #[test]
    fn mixed_types_never_order() {
        let doc = json!({"value": "10"});
        assert!(!Query::all().with("value", Condition::Gt(json!(5))).matches(&doc));
        assert!(!Query::all().with("value", Condition::Lte(json!(5))).matches(&doc));
    }

    #[test]
    fn missing_field_behaves_as_null() {
        let doc = json!({"id": 1});
        assert!(Query::all().eq("absent", Value::Null).matches(&doc));
        assert!(Query::all().with("absent", Condition::Ne(json!(3))).matches(&doc));
        assert!(!Query::all().with("absent", Condition::Gt(json!(0))).matches(&doc));
    }
}
