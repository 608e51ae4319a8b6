//! Strongly-typed identifiers.
//!
//! IDs wrap a ULID so they are unique and sort by creation time. Each type
//! displays with its own prefix (`sch_01H...`) and parses with or without it.
//! The serialized form is the prefixed string, so ids in schedule
//! definitions and in persisted state look the same.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates an ID from a fresh ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from an existing ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ulid::from_string(raw).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        }
    };
}

define_id!(
    /// Unique identifier for an automation schedule.
    ScheduleId,
    "sch"
);

define_id!(
    /// Unique identifier for one authorized execution of a schedule.
    ExecutionId,
    "exec"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_id_display_format() {
        let id = ScheduleId::new();
        assert!(id.to_string().starts_with("sch_"));
    }

    #[test]
    fn execution_id_display_format() {
        let id = ExecutionId::new();
        assert!(id.to_string().starts_with("exec_"));
    }

    #[test]
    fn parse_with_prefix() {
        let id = ScheduleId::new();
        let parsed: ScheduleId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_without_prefix() {
        let ulid = Ulid::new();
        let id: ScheduleId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn parse_invalid_ulid() {
        let err = "sch_nope".parse::<ScheduleId>().unwrap_err();
        assert_eq!(err.id_type, "ScheduleId");
    }

    #[test]
    fn ids_order_by_creation() {
        let first = ScheduleId::from_ulid(Ulid::from_parts(1, 0));
        let second = ScheduleId::from_ulid(Ulid::from_parts(2, 0));
        assert!(first < second);
    }

    #[test]
    fn serde_uses_prefixed_form() {
        let id = ExecutionId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"exec_{}\"", id.as_ulid()));
        let parsed: ExecutionId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);

        let bare: ExecutionId =
            serde_json::from_str(&format!("\"{}\"", id.as_ulid())).expect("deserialize");
        assert_eq!(bare, id);
        assert!(serde_json::from_str::<ExecutionId>("\"exec_bogus\"").is_err());
    }
}
