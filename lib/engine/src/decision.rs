//! Decisions emitted by a processing pass.

use automation_core::{ExecutionId, ScheduleId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A schedule execution handed to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique id for this execution.
    pub execution_id: ExecutionId,
    /// The schedule that executed.
    pub schedule_id: ScheduleId,
    /// The schedule's payload.
    pub payload: JsonValue,
    /// The schedule's priority.
    pub priority: i64,
    /// The schedule's execution count including this one.
    pub execution_count: u32,
}

/// Why a pending execution was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelReason {
    /// A delay cancellation trigger fired.
    DelayCancelled,
    /// Another schedule in the same group executed first.
    GroupPreempted { by: ScheduleId },
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DelayCancelled => write!(f, "delay cancelled"),
            Self::GroupPreempted { by } => write!(f, "preempted by {by}"),
        }
    }
}

/// Why a schedule left the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetireReason {
    /// The execution limit was reached.
    Finished,
    /// The validity window closed.
    Expired,
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => write!(f, "finished"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// The outcome of a processing pass for one schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Run the schedule's payload.
    Execute(Execution),
    /// A pending execution was dropped and the cycle reset.
    Cancel {
        schedule_id: ScheduleId,
        reason: CancelReason,
    },
    /// The schedule was removed from the engine.
    Retire {
        schedule_id: ScheduleId,
        reason: RetireReason,
    },
}

impl Decision {
    /// Returns the schedule the decision is about.
    #[must_use]
    pub fn schedule_id(&self) -> ScheduleId {
        match self {
            Self::Execute(execution) => execution.schedule_id,
            Self::Cancel { schedule_id, .. } | Self::Retire { schedule_id, .. } => *schedule_id,
        }
    }

    /// Returns the execution, if this is an execute decision.
    #[must_use]
    pub fn as_execution(&self) -> Option<&Execution> {
        match self {
            Self::Execute(execution) => Some(execution),
            _ => None,
        }
    }
}
