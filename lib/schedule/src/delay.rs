//! Delay conditions gate an execution after a schedule's triggers fire.
//!
//! Once armed, a delay waits at least `seconds`, then allows execution only
//! while its screen, region and app-state conditions hold. The conditions
//! are checked when execution is attempted, never cached. Any cancellation
//! trigger reaching its goal first aborts the pending execution.

use crate::decode;
use crate::error::{ParseDomain, ParseError};
use crate::event::{AppContext, AppState, AutomationEvent};
use crate::trigger::{Trigger, TriggerOutcome};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue, json};

/// The app state a delay requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStateCondition {
    /// No requirement.
    #[default]
    Any,
    /// The app must be in the foreground.
    Foreground,
    /// The app must be in the background.
    Background,
}

impl AppStateCondition {
    /// Returns true if `state` satisfies the condition.
    #[must_use]
    pub fn holds(&self, state: AppState) -> bool {
        match self {
            Self::Any => true,
            Self::Foreground => state == AppState::Foreground,
            Self::Background => state == AppState::Background,
        }
    }
}

/// Status of a pending delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayStatus {
    /// Still waiting on time or conditions.
    Waiting,
    /// Execution may proceed.
    Ready,
    /// A cancellation trigger fired.
    Cancelled,
}

/// A post-trigger gate on execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayCondition {
    seconds: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    screens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    region_id: Option<String>,
    #[serde(default)]
    app_state: AppStateCondition,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cancellation_triggers: Vec<Trigger>,
}

impl DelayCondition {
    /// Creates a delay that waits `seconds` with no other conditions.
    #[must_use]
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds,
            ..Self::default()
        }
    }

    /// Adds a screen the app must be showing.
    #[must_use]
    pub fn with_screen(mut self, screen: impl Into<String>) -> Self {
        self.screens.push(screen.into());
        self
    }

    /// Requires the device to be inside a region.
    #[must_use]
    pub fn with_region(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }

    /// Requires an app state.
    #[must_use]
    pub fn with_app_state(mut self, app_state: AppStateCondition) -> Self {
        self.app_state = app_state;
        self
    }

    /// Adds a cancellation trigger.
    #[must_use]
    pub fn with_cancellation_trigger(mut self, trigger: Trigger) -> Self {
        self.cancellation_triggers.push(trigger);
        self
    }

    /// Parses a delay definition.
    ///
    /// # Errors
    ///
    /// Returns the first malformed field. Errors from cancellation triggers
    /// are returned unchanged.
    pub fn from_json(value: &JsonValue) -> Result<Self, ParseError> {
        let map = decode::object(value, ParseDomain::Delay, "delay")?;
        let seconds = decode::optional(map, ParseDomain::Delay, "seconds")?.unwrap_or(0.0);
        let screens = decode::optional::<ScreenList>(map, ParseDomain::Delay, "screen")?
            .map(|list| list.0)
            .unwrap_or_default();
        let region_id = decode::optional(map, ParseDomain::Delay, "region_id")?;
        let app_state = decode::optional(map, ParseDomain::Delay, "app_state")?.unwrap_or_default();
        let cancellation_triggers = match map.get("cancellation_triggers") {
            Some(value) => decode::array_of(
                value,
                ParseDomain::Delay,
                "cancellation_triggers",
                Trigger::from_json,
            )?,
            None => Vec::new(),
        };

        Ok(Self {
            seconds,
            screens,
            region_id,
            app_state,
            cancellation_triggers,
        })
    }

    /// Encodes the delay definition, without cancellation progress.
    #[must_use]
    pub fn to_definition(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert("seconds".into(), self.seconds.into());
        if !self.screens.is_empty() {
            map.insert("screen".into(), self.screens.clone().into());
        }
        if let Some(region_id) = &self.region_id {
            map.insert("region_id".into(), region_id.clone().into());
        }
        if self.app_state != AppStateCondition::Any {
            map.insert("app_state".into(), json!(self.app_state));
        }
        if !self.cancellation_triggers.is_empty() {
            map.insert(
                "cancellation_triggers".into(),
                self.cancellation_triggers
                    .iter()
                    .map(Trigger::to_definition)
                    .collect(),
            );
        }
        JsonValue::Object(map)
    }

    /// Returns the minimum wait in seconds.
    #[must_use]
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    /// Returns the screens one of which must be showing.
    #[must_use]
    pub fn screens(&self) -> &[String] {
        &self.screens
    }

    /// Returns the required region.
    #[must_use]
    pub fn region_id(&self) -> Option<&str> {
        self.region_id.as_deref()
    }

    /// Returns the required app state.
    #[must_use]
    pub fn app_state(&self) -> AppStateCondition {
        self.app_state
    }

    /// Returns the cancellation triggers.
    #[must_use]
    pub fn cancellation_triggers(&self) -> &[Trigger] {
        &self.cancellation_triggers
    }

    /// Returns true if the wait is non-negative and every cancellation
    /// trigger is valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.seconds.is_finite()
            && self.seconds >= 0.0
            && self.cancellation_triggers.iter().all(Trigger::is_valid)
    }

    /// Returns when the wait armed at `armed_at` elapses.
    #[must_use]
    pub fn deadline(&self, armed_at: DateTime<Utc>) -> DateTime<Utc> {
        armed_at
            .checked_add_signed(seconds_to_duration(self.seconds))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Offers an event to the cancellation triggers.
    ///
    /// If any of them is satisfied the delay is cancelled and every
    /// cancellation trigger is reset.
    pub fn offer_event(&mut self, event: &AutomationEvent) -> DelayStatus {
        let mut cancelled = false;
        for trigger in &mut self.cancellation_triggers {
            if trigger.record_event(event) == TriggerOutcome::Satisfied {
                cancelled = true;
            }
        }
        if cancelled {
            self.reset();
            DelayStatus::Cancelled
        } else {
            DelayStatus::Waiting
        }
    }

    /// Returns true if the screen, region and app-state conditions hold.
    #[must_use]
    pub fn conditions_hold(&self, context: &AppContext) -> bool {
        let screen_ok = self.screens.is_empty()
            || context
                .screen
                .as_ref()
                .is_some_and(|screen| self.screens.contains(screen));
        let region_ok = self
            .region_id
            .as_ref()
            .is_none_or(|region| context.regions.contains(region));
        screen_ok && region_ok && self.app_state.holds(context.app_state)
    }

    /// Evaluates the delay armed at `armed_at` as of `now`.
    #[must_use]
    pub fn evaluate(
        &self,
        armed_at: DateTime<Utc>,
        now: DateTime<Utc>,
        context: &AppContext,
    ) -> DelayStatus {
        if now >= self.deadline(armed_at) && self.conditions_hold(context) {
            DelayStatus::Ready
        } else {
            DelayStatus::Waiting
        }
    }

    /// Zeroes every cancellation trigger.
    pub fn reset(&mut self) {
        for trigger in &mut self.cancellation_triggers {
            trigger.reset();
        }
    }
}

/// Converts fractional seconds to a duration with millisecond precision.
#[must_use]
pub fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::try_milliseconds((seconds * 1000.0).round() as i64).unwrap_or(Duration::MAX)
}

/// `screen` accepts a single name or a list of names.
struct ScreenList(Vec<String>);

impl<'de> Deserialize<'de> for ScreenList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(screen) => Self(vec![screen]),
            Raw::Many(screens) => Self(screens),
        })
    }
}
