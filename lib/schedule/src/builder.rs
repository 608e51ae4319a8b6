//! Construction of schedules from code or from untrusted JSON definitions.
//!
//! `ScheduleBuilder::from_json` checks the *shape* of a definition and stops
//! at the first malformed field. `build` then produces the schedule; the
//! *semantic* rules (trigger count, window order, delay validity) are left to
//! `Schedule::is_valid`, which callers must check before activating it.

use crate::decode;
use crate::delay::DelayCondition;
use crate::error::{ParseDomain, ParseError};
use crate::schedule::{Schedule, SchedulePhase};
use crate::trigger::Trigger;
use automation_core::ScheduleId;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// Mutable construction state for a [`Schedule`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleBuilder {
    id: Option<ScheduleId>,
    payload: JsonValue,
    priority: i64,
    triggers: Vec<Trigger>,
    limit: u32,
    group: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    delay: Option<DelayCondition>,
    interval: Option<f64>,
}

impl Default for ScheduleBuilder {
    fn default() -> Self {
        Self {
            id: None,
            payload: JsonValue::Null,
            priority: 0,
            triggers: Vec::new(),
            limit: 1,
            group: None,
            start: None,
            end: None,
            delay: None,
            interval: None,
        }
    }
}

impl ScheduleBuilder {
    /// Creates a builder with default values and no triggers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a fixed identifier instead of generating one.
    #[must_use]
    pub fn with_id(mut self, id: ScheduleId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Appends a trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Sets the execution limit.
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets the start of the validity window.
    #[must_use]
    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the end of the validity window.
    #[must_use]
    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Sets the delay.
    #[must_use]
    pub fn with_delay(mut self, delay: DelayCondition) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the minimum seconds between executions.
    #[must_use]
    pub fn with_interval(mut self, seconds: f64) -> Self {
        self.interval = Some(seconds);
        self
    }

    /// Parses a schedule definition.
    ///
    /// Fields are checked in a fixed order and the first malformed one is
    /// reported. Trigger and delay errors are passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] naming the malformed field.
    pub fn from_json(definition: &JsonValue) -> Result<Self, ParseError> {
        let domain = ParseDomain::Schedule;
        let map = decode::object(definition, domain, "definition")?;

        let priority = decode::optional(map, domain, "priority")?.unwrap_or(0);
        let limit = decode::optional(map, domain, "limit")?.unwrap_or(1);
        let start = timestamp(map, "start")?;
        let end = timestamp(map, "end")?;
        let group = decode::optional(map, domain, "group")?;

        let triggers = match map.get("triggers") {
            Some(value) => decode::array_of(value, domain, "triggers", Trigger::from_json)?,
            None => Vec::new(),
        };
        if triggers.is_empty() {
            return Err(ParseError::invalid_format(domain, "triggers", "at least 1 required"));
        }

        let delay = match map.get("delay") {
            None => None,
            Some(value @ JsonValue::Object(_)) => Some(DelayCondition::from_json(value)?),
            Some(_) => {
                return Err(ParseError::invalid_format(domain, "delay", "expected an object"));
            }
        };

        let id = decode::optional::<String>(map, domain, "id")?
            .map(|raw| {
                raw.parse::<ScheduleId>()
                    .map_err(|e| ParseError::invalid_format(domain, "id", e.to_string()))
            })
            .transpose()?;
        let interval = decode::optional(map, domain, "interval")?;
        let payload = map.get("data").cloned().unwrap_or(JsonValue::Null);

        Ok(Self {
            id,
            payload,
            priority,
            triggers,
            limit,
            group,
            start,
            end,
            delay,
            interval,
        })
    }

    /// Finishes construction.
    ///
    /// The result has zero progress and has not been checked; call
    /// [`Schedule::is_valid`] before activating it.
    #[must_use]
    pub fn build(self) -> Schedule {
        Schedule {
            id: self.id.unwrap_or_default(),
            payload: self.payload,
            priority: self.priority,
            triggers: self.triggers,
            limit: self.limit,
            group: self.group,
            start: self.start,
            end: self.end,
            delay: self.delay,
            interval: self.interval,
            execution_count: 0,
            phase: SchedulePhase::Idle,
            satisfied_triggers: BTreeSet::new(),
        }
    }
}

fn timestamp(map: &decode::JsonMap, field: &'static str) -> Result<Option<DateTime<Utc>>, ParseError> {
    decode::optional::<String>(map, ParseDomain::Schedule, field)?
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|e| ParseError::invalid_format(ParseDomain::Schedule, field, e.to_string()))
        })
        .transpose()
}
