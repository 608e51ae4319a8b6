//! Per-field decoding of untyped JSON definitions.
//!
//! Each field is deserialized on its own so a failure names exactly the
//! field that was wrong.

use crate::error::{ParseDomain, ParseError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

pub(crate) type JsonMap = Map<String, JsonValue>;

/// Requires `value` to be an object.
pub(crate) fn object<'a>(
    value: &'a JsonValue,
    domain: ParseDomain,
    field: &'static str,
) -> Result<&'a JsonMap, ParseError> {
    value
        .as_object()
        .ok_or_else(|| ParseError::invalid_format(domain, field, "expected an object"))
}

/// Decodes `field` if present. Presence with the wrong type is an error.
pub(crate) fn optional<T: DeserializeOwned>(
    map: &JsonMap,
    domain: ParseDomain,
    field: &'static str,
) -> Result<Option<T>, ParseError> {
    map.get(field)
        .map(|value| {
            T::deserialize(value)
                .map_err(|e| ParseError::invalid_format(domain, field, e.to_string()))
        })
        .transpose()
}

/// Decodes a field that must be present.
pub(crate) fn required<T: DeserializeOwned>(
    map: &JsonMap,
    domain: ParseDomain,
    field: &'static str,
) -> Result<T, ParseError> {
    optional(map, domain, field)?
        .ok_or_else(|| ParseError::invalid_format(domain, field, "required"))
}

/// Decodes a non-empty array whose elements are parsed by `parse`.
///
/// The first element that fails aborts decoding and its error is returned
/// unchanged.
pub(crate) fn array_of<T>(
    value: &JsonValue,
    domain: ParseDomain,
    field: &'static str,
    parse: impl Fn(&JsonValue) -> Result<T, ParseError>,
) -> Result<Vec<T>, ParseError> {
    value
        .as_array()
        .ok_or_else(|| ParseError::invalid_format(domain, field, "expected an array"))?
        .iter()
        .map(parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_distinguishes_absent_from_mistyped() {
        let value = json!({"limit": "x"});
        let map = object(&value, ParseDomain::Schedule, "definition").expect("object");

        let absent: Option<u32> =
            optional(map, ParseDomain::Schedule, "priority").expect("absent is fine");
        assert!(absent.is_none());

        let err = optional::<u32>(map, ParseDomain::Schedule, "limit").unwrap_err();
        assert_eq!(err.field, "limit");
    }

    #[test]
    fn array_of_stops_at_first_failure() {
        let value = json!([1, "two", "three"]);
        let err = array_of(&value, ParseDomain::Trigger, "items", |v| {
            v.as_u64()
                .ok_or_else(|| ParseError::invalid_format(ParseDomain::Trigger, "item", format!("{v}")))
        })
        .unwrap_err();
        assert_eq!(err.detail, "\"two\"");
    }
}
