//! Loading schedule definitions from a JSON file.
//!
//! One bad definition never blocks the others. Definitions that fail to
//! parse or validate are reported and skipped.
//!
//! Every definition must carry an `id`. The file is registered again on each
//! start, and the id is what tells an already known schedule (active or
//! retired) from a new one.

use crate::error::DefinitionError;
use automation_engine::{ScheduleEngine, ScheduleStore};
use automation_schedule::{ParseError, Schedule, ScheduleBuilder, ValidationIssue};
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Why a definition was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The definition could not be decoded.
    Parse(ParseError),
    /// The definition decoded but breaks a semantic rule.
    Invalid(ValidationIssue),
    /// The definition has no `id`.
    MissingId,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Invalid(issue) => write!(f, "{issue}"),
            Self::MissingId => write!(f, "definition has no id"),
        }
    }
}

/// The outcome of decoding a definitions document.
#[derive(Debug, Default)]
pub struct DefinitionSet {
    /// Valid schedules, in document order.
    pub schedules: Vec<Schedule>,
    /// Skipped definitions by array index.
    pub rejected: Vec<(usize, Rejection)>,
}

impl DefinitionSet {
    /// Decodes a JSON array of schedule definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON array.
    pub fn parse(text: &str) -> Result<Self, Report<DefinitionError>> {
        let document: JsonValue =
            serde_json::from_str(text).map_err(|e| DefinitionError::NotAnArray {
                reason: e.to_string(),
            })?;
        let JsonValue::Array(definitions) = document else {
            return Err(DefinitionError::NotAnArray {
                reason: "top-level value is not an array".to_string(),
            }
            .into());
        };

        let mut set = Self::default();
        for (index, definition) in definitions.iter().enumerate() {
            let has_id = definition.get("id").is_some_and(|id| !id.is_null());
            match ScheduleBuilder::from_json(definition).map(ScheduleBuilder::build) {
                Ok(schedule) => match schedule.validation_issue() {
                    Some(issue) => set.rejected.push((index, Rejection::Invalid(issue))),
                    None if !has_id => set.rejected.push((index, Rejection::MissingId)),
                    None => set.schedules.push(schedule),
                },
                Err(e) => set.rejected.push((index, Rejection::Parse(e))),
            }
        }
        Ok(set)
    }

    /// Reads and decodes a definitions file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON array.
    pub async fn load(path: &Path) -> Result<Self, Report<DefinitionError>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DefinitionError::ReadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::parse(&text)
    }

    /// Registers every schedule the engine has not seen before.
    ///
    /// Schedules that are active or were retired are skipped. Returns how
    /// many were added.
    pub async fn register<S: ScheduleStore>(self, engine: &mut ScheduleEngine<S>) -> usize {
        for (index, rejection) in &self.rejected {
            warn!(index, %rejection, "skipping schedule definition");
        }

        let mut added = 0;
        for schedule in self.schedules {
            let schedule_id = schedule.id();
            if engine.contains(schedule_id) || engine.is_retired(schedule_id) {
                continue;
            }
            match engine.schedule(schedule).await {
                Ok(_) => added += 1,
                Err(report) => warn!(%schedule_id, error = %report, "failed to register schedule"),
            }
        }
        info!(added, active = engine.len(), "schedule definitions registered");
        added
    }
}
