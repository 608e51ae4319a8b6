//! Error types for the runner.

use std::fmt;
use std::path::PathBuf;

/// Errors from loading schedule definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The definitions file could not be read.
    ReadFailed { path: PathBuf, reason: String },
    /// The file is not a JSON array.
    NotAnArray { reason: String },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed { path, reason } => {
                write!(f, "failed to read definitions from {}: {reason}", path.display())
            }
            Self::NotAnArray { reason } => {
                write!(f, "definitions must be a JSON array: {reason}")
            }
        }
    }
}

impl std::error::Error for DefinitionError {}
