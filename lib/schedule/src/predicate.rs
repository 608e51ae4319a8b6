//! JSON predicates restricting which events count toward a trigger.
//!
//! Predicates are boolean combinations of field matchers:
//!
//! ```json
//! {"and": [
//!     {"key": "event_name", "value": {"equals": "purchase"}},
//!     {"scope": ["properties"], "key": "total", "value": {"at_least": 10}}
//! ]}
//! ```
//!
//! A matcher walks `scope` into nested objects, then selects `key`. With
//! neither set it applies to the attributes themselves, which is how a screen
//! trigger matches the screen name.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A predicate over event attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPredicate {
    /// Every child must match.
    And { and: Vec<EventPredicate> },
    /// At least one child must match.
    Or { or: Vec<EventPredicate> },
    /// The child must not match.
    Not { not: Box<EventPredicate> },
    /// A single field matcher.
    Field(FieldMatcher),
}

impl EventPredicate {
    /// Matches the attribute root against `value`.
    #[must_use]
    pub fn root(value: ValueMatcher) -> Self {
        Self::Field(FieldMatcher {
            key: None,
            scope: Vec::new(),
            value,
        })
    }

    /// Matches a top-level attribute field against `value`.
    #[must_use]
    pub fn key(key: impl Into<String>, value: ValueMatcher) -> Self {
        Self::Field(FieldMatcher {
            key: Some(key.into()),
            scope: Vec::new(),
            value,
        })
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn evaluate(&self, attributes: &JsonValue) -> bool {
        match self {
            Self::And { and } => and.iter().all(|p| p.evaluate(attributes)),
            Self::Or { or } => or.iter().any(|p| p.evaluate(attributes)),
            Self::Not { not } => !not.evaluate(attributes),
            Self::Field(matcher) => matcher.evaluate(attributes),
        }
    }
}

/// Selects a value from the attributes and matches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatcher {
    /// Field to select after walking the scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Nested object path walked before `key`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    /// Matcher applied to the selected value.
    pub value: ValueMatcher,
}

impl FieldMatcher {
    fn evaluate(&self, attributes: &JsonValue) -> bool {
        let mut current = Some(attributes);
        for segment in &self.scope {
            current = current.and_then(|v| v.get(segment));
        }
        if let Some(key) = &self.key {
            current = current.and_then(|v| v.get(key));
        }
        self.value.matches(current.filter(|v| !v.is_null()))
    }
}

/// Matches a single JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueMatcher {
    /// The value equals the given JSON. Numbers compare numerically.
    Equals { equals: JsonValue },
    /// The value is (or is not) present.
    Presence { is_present: bool },
    /// The value is a number inside an inclusive range.
    Range(NumberRange),
}

impl ValueMatcher {
    /// Creates an equality matcher.
    #[must_use]
    pub fn equals(value: impl Into<JsonValue>) -> Self {
        Self::Equals {
            equals: value.into(),
        }
    }

    fn matches(&self, value: Option<&JsonValue>) -> bool {
        match self {
            Self::Equals { equals } => value.is_some_and(|v| json_equals(v, equals)),
            Self::Presence { is_present } => value.is_some() == *is_present,
            Self::Range(range) => value
                .and_then(JsonValue::as_f64)
                .is_some_and(|n| range.contains(n)),
        }
    }
}

/// An inclusive numeric range. A missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumberRange {
    /// Lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_least: Option<f64>,
    /// Upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_most: Option<f64>,
}

impl NumberRange {
    fn contains(&self, n: f64) -> bool {
        self.at_least.is_none_or(|min| n >= min) && self.at_most.is_none_or(|max| n <= max)
    }
}

fn json_equals(left: &JsonValue, right: &JsonValue) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: JsonValue) -> EventPredicate {
        serde_json::from_value(value).expect("predicate should parse")
    }

    #[test]
    fn root_matcher_matches_screen_name() {
        let predicate = parse(json!({"value": {"equals": "home"}}));
        assert!(predicate.evaluate(&json!("home")));
        assert!(!predicate.evaluate(&json!("settings")));
    }

    #[test]
    fn scoped_range_matcher() {
        let predicate = parse(json!({
            "scope": ["properties"],
            "key": "total",
            "value": {"at_least": 10, "at_most": 20}
        }));
        assert!(predicate.evaluate(&json!({"properties": {"total": 10}})));
        assert!(predicate.evaluate(&json!({"properties": {"total": 20.0}})));
        assert!(!predicate.evaluate(&json!({"properties": {"total": 21}})));
        assert!(!predicate.evaluate(&json!({"properties": {"total": "15"}})));
        assert!(!predicate.evaluate(&json!({})));
    }

    #[test]
    fn presence_matcher_treats_null_as_absent() {
        let present = parse(json!({"key": "coupon", "value": {"is_present": true}}));
        let absent = parse(json!({"key": "coupon", "value": {"is_present": false}}));
        assert!(present.evaluate(&json!({"coupon": "X"})));
        assert!(!present.evaluate(&json!({"coupon": null})));
        assert!(absent.evaluate(&json!({})));
    }

    #[test]
    fn boolean_combinators() {
        let predicate = parse(json!({
            "and": [
                {"key": "event_name", "value": {"equals": "purchase"}},
                {"not": {"key": "event_value", "value": {"at_most": 0}}}
            ]
        }));
        assert!(predicate.evaluate(&json!({"event_name": "purchase", "event_value": 3})));
        assert!(!predicate.evaluate(&json!({"event_name": "purchase", "event_value": 0})));
        assert!(!predicate.evaluate(&json!({"event_name": "browse", "event_value": 3})));

        let either = parse(json!({"or": [
            {"value": {"equals": "a"}},
            {"value": {"equals": "b"}}
        ]}));
        assert!(either.evaluate(&json!("b")));
        assert!(!either.evaluate(&json!("c")));
    }

    #[test]
    fn numbers_compare_numerically() {
        let predicate = EventPredicate::key("count", ValueMatcher::equals(2));
        assert!(predicate.evaluate(&json!({"count": 2.0})));
    }

    #[test]
    fn unknown_shape_is_rejected() {
        let result: Result<EventPredicate, _> = serde_json::from_value(json!({"matches": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let wire = json!({"not": {"key": "a", "value": {"is_present": true}}});
        let predicate = parse(wire.clone());
        assert_eq!(serde_json::to_value(&predicate).expect("serialize"), wire);
    }
}
