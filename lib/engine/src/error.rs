//! Error types for the engine crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Persistence failures reported by a `ScheduleStore`
//! - `ExecutorError`: Failures reported by a `ScheduleExecutor`
//! - `EngineError`: Engine operations, returned inside a `Report`

use automation_core::ScheduleId;
use automation_schedule::ValidationIssue;
use std::fmt;

/// Result of an engine operation.
pub type EngineResult<T> = automation_core::Result<T, EngineError>;

/// Errors from schedule store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Reading persisted state failed.
    ReadFailed { reason: String },
    /// Writing state failed. Nothing was applied.
    WriteFailed { reason: String },
    /// Persisted state could not be decoded.
    Corrupt { reason: String },
    /// Persisted state uses a format version this build does not know.
    UnsupportedVersion { version: u32 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed { reason } => write!(f, "schedule store read failed: {reason}"),
            Self::WriteFailed { reason } => write!(f, "schedule store write failed: {reason}"),
            Self::Corrupt { reason } => write!(f, "schedule store is corrupt: {reason}"),
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported schedule store version: {version}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from executing a schedule's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The executor could not run the payload.
    Failed { schedule_id: ScheduleId, reason: String },
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed {
                schedule_id,
                reason,
            } => write!(f, "execution of {schedule_id} failed: {reason}"),
        }
    }
}

impl std::error::Error for ExecutorError {}

/// High-level engine errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The schedule breaks a semantic rule and was not activated.
    InvalidSchedule {
        schedule_id: ScheduleId,
        issue: ValidationIssue,
    },
    /// A schedule with the same identifier is already active.
    DuplicateSchedule { schedule_id: ScheduleId },
    /// A schedule with the identifier was retired or cancelled earlier.
    RetiredSchedule { schedule_id: ScheduleId },
    /// No active schedule has the identifier.
    ScheduleNotFound { schedule_id: ScheduleId },
    /// Loading or committing state failed.
    Persistence { reason: String },
    /// The runner task is no longer accepting commands.
    RunnerStopped,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSchedule { schedule_id, issue } => {
                write!(f, "schedule {schedule_id} is invalid: {issue}")
            }
            Self::DuplicateSchedule { schedule_id } => {
                write!(f, "schedule already exists: {schedule_id}")
            }
            Self::RetiredSchedule { schedule_id } => {
                write!(f, "schedule was already retired: {schedule_id}")
            }
            Self::ScheduleNotFound { schedule_id } => {
                write!(f, "schedule not found: {schedule_id}")
            }
            Self::Persistence { reason } => write!(f, "persistence failed: {reason}"),
            Self::RunnerStopped => write!(f, "engine runner has stopped"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Persistence {
            reason: e.to_string(),
        }
    }
}
