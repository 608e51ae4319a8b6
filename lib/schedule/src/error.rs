//! Error types for the schedule crate.
//!
//! Two kinds of failure exist and are kept apart:
//! - `ParseError`: a definition has the wrong shape (missing, mistyped or
//!   malformed field). The definition is rejected.
//! - `ValidationIssue`: a well-formed schedule breaks a semantic rule. This is
//!   reported through `Schedule::is_valid` rather than as an error.

use std::fmt;

/// The part of a definition a parse error was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseDomain {
    /// Top-level schedule fields.
    Schedule,
    /// A trigger definition (including cancellation triggers).
    Trigger,
    /// The delay definition.
    Delay,
}

impl ParseDomain {
    /// Returns the tag used in error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Trigger => "trigger",
            Self::Delay => "delay",
        }
    }
}

impl fmt::Display for ParseDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A definition field was missing, mistyped or malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Where the offending field lives.
    pub domain: ParseDomain,
    /// The offending field name.
    pub field: &'static str,
    /// Human-readable detail.
    pub detail: String,
}

impl ParseError {
    /// Creates an invalid-format error.
    #[must_use]
    pub fn invalid_format(
        domain: ParseDomain,
        field: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            field,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} format: {}: {}",
            self.domain, self.field, self.detail
        )
    }
}

impl std::error::Error for ParseError {}

/// A semantic rule broken by an otherwise well-formed schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// The schedule has no triggers.
    NoTriggers,
    /// The schedule has more triggers than allowed.
    TooManyTriggers { count: usize, max: usize },
    /// A trigger has a goal that is not a positive number.
    InvalidTrigger { index: usize },
    /// The validity window ends before it starts.
    InvertedWindow,
    /// The delay has a negative wait or an invalid cancellation trigger.
    InvalidDelay,
    /// The interval between executions is negative or not finite.
    InvalidInterval,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTriggers => write!(f, "schedule has no triggers"),
            Self::TooManyTriggers { count, max } => {
                write!(f, "schedule has {count} triggers, at most {max} allowed")
            }
            Self::InvalidTrigger { index } => {
                write!(f, "trigger {index} must have a positive goal")
            }
            Self::InvertedWindow => write!(f, "schedule end is before its start"),
            Self::InvalidDelay => write!(f, "schedule delay is invalid"),
            Self::InvalidInterval => write!(f, "schedule interval must be non-negative"),
        }
    }
}

impl std::error::Error for ValidationIssue {}
