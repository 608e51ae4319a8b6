//! Triggers accumulate progress from matching events toward a goal.
//!
//! A trigger listens to one event class, optionally narrowed by a predicate.
//! Count-style triggers add one per matching event; `custom_event_value`
//! adds the event's value. Reaching the goal satisfies the trigger and
//! resets its progress in the same step, so no event counts twice.

use crate::decode;
use crate::error::{ParseDomain, ParseError};
use crate::event::{AutomationEvent, EventClass};
use crate::predicate::EventPredicate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

/// The kind of event a trigger counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// App launches.
    AppInit,
    /// Foreground transitions.
    Foreground,
    /// Background transitions.
    Background,
    /// Screen views.
    Screen,
    /// App version updates.
    Version,
    /// Region entries.
    RegionEnter,
    /// Region exits.
    RegionExit,
    /// Number of custom events.
    CustomEventCount,
    /// Summed value of custom events.
    CustomEventValue,
    /// Active sessions.
    ActiveSession,
}

impl TriggerType {
    /// Returns the event class this trigger listens to.
    #[must_use]
    pub const fn event_class(&self) -> EventClass {
        match self {
            Self::AppInit => EventClass::AppInit,
            Self::Foreground => EventClass::Foreground,
            Self::Background => EventClass::Background,
            Self::Screen => EventClass::ScreenView,
            Self::Version => EventClass::VersionUpdate,
            Self::RegionEnter => EventClass::RegionEnter,
            Self::RegionExit => EventClass::RegionExit,
            Self::CustomEventCount | Self::CustomEventValue => EventClass::CustomEvent,
            Self::ActiveSession => EventClass::ActiveSession,
        }
    }

    /// Returns true if progress is the sum of event values rather than a count.
    #[must_use]
    pub const fn accumulates_value(&self) -> bool {
        matches!(self, Self::CustomEventValue)
    }
}

/// Result of offering an event to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The event did not match.
    NoMatch,
    /// The event matched but the goal is not reached yet.
    Progressed,
    /// The goal was reached. Progress has been reset.
    Satisfied,
}

/// A trigger and its progress in the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    trigger_type: TriggerType,
    goal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    predicate: Option<EventPredicate>,
    #[serde(default)]
    progress: f64,
}

impl Trigger {
    /// Creates a trigger with zero progress.
    #[must_use]
    pub fn new(trigger_type: TriggerType, goal: f64) -> Self {
        Self {
            trigger_type,
            goal,
            predicate: None,
            progress: 0.0,
        }
    }

    /// Restricts matching events with a predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: EventPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Parses a trigger definition.
    ///
    /// # Errors
    ///
    /// Returns an error naming `type`, `goal` or `predicate` when that field
    /// is missing or malformed.
    pub fn from_json(value: &JsonValue) -> Result<Self, ParseError> {
        let map = decode::object(value, ParseDomain::Trigger, "trigger")?;
        let trigger_type = decode::required(map, ParseDomain::Trigger, "type")?;
        let goal = decode::required(map, ParseDomain::Trigger, "goal")?;
        let predicate = decode::optional(map, ParseDomain::Trigger, "predicate")?;

        Ok(Self {
            trigger_type,
            goal,
            predicate,
            progress: 0.0,
        })
    }

    /// Encodes the trigger definition, without progress.
    #[must_use]
    pub fn to_definition(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert("type".into(), json!(self.trigger_type));
        map.insert("goal".into(), self.goal.into());
        if let Some(predicate) = &self.predicate {
            map.insert("predicate".into(), json!(predicate));
        }
        JsonValue::Object(map)
    }

    /// Returns the trigger type.
    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        self.trigger_type
    }

    /// Returns the goal.
    #[must_use]
    pub fn goal(&self) -> f64 {
        self.goal
    }

    /// Returns the predicate, if any.
    #[must_use]
    pub fn predicate(&self) -> Option<&EventPredicate> {
        self.predicate.as_ref()
    }

    /// Returns progress accumulated in the current cycle.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Returns true if the goal is a positive, finite number.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.goal.is_finite() && self.goal > 0.0
    }

    /// Offers an event to the trigger.
    pub fn record_event(&mut self, event: &AutomationEvent) -> TriggerOutcome {
        if event.class != self.trigger_type.event_class() {
            return TriggerOutcome::NoMatch;
        }
        if let Some(predicate) = &self.predicate
            && !predicate.evaluate(&event.attributes)
        {
            return TriggerOutcome::NoMatch;
        }

        let increment = if self.trigger_type.accumulates_value() {
            event.value.unwrap_or(1.0)
        } else {
            1.0
        };
        if !increment.is_finite() || increment <= 0.0 {
            return TriggerOutcome::NoMatch;
        }

        self.progress += increment;
        if self.progress >= self.goal {
            self.progress = 0.0;
            TriggerOutcome::Satisfied
        } else {
            TriggerOutcome::Progressed
        }
    }

    /// Zeroes progress.
    pub fn reset(&mut self) {
        self.progress = 0.0;
    }
}
