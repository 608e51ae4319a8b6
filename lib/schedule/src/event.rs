//! Normalized application events and the app context derived from them.
//!
//! The host surfaces one event at a time. Each event has a class, a JSON
//! attribute payload that trigger predicates match against, an optional
//! numeric value and the time it happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeSet;
use std::fmt;

/// The class of a normalized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    /// The application process started.
    AppInit,
    /// The application moved to the foreground.
    Foreground,
    /// The application moved to the background.
    Background,
    /// A screen was displayed.
    ScreenView,
    /// The application version changed since the last launch.
    VersionUpdate,
    /// The device entered a region.
    RegionEnter,
    /// The device left a region.
    RegionExit,
    /// A custom analytics event was recorded.
    CustomEvent,
    /// A session became active.
    ActiveSession,
}

impl EventClass {
    /// Returns the wire name of this class.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AppInit => "app_init",
            Self::Foreground => "foreground",
            Self::Background => "background",
            Self::ScreenView => "screen_view",
            Self::VersionUpdate => "version_update",
            Self::RegionEnter => "region_enter",
            Self::RegionExit => "region_exit",
            Self::CustomEvent => "custom_event",
            Self::ActiveSession => "active_session",
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized event as consumed by triggers and the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationEvent {
    /// The event class.
    pub class: EventClass,
    /// Attributes predicates are evaluated against.
    #[serde(default)]
    pub attributes: JsonValue,
    /// Numeric value carried by the event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

impl AutomationEvent {
    /// Creates an event with no attributes or value.
    #[must_use]
    pub fn new(class: EventClass, timestamp: DateTime<Utc>) -> Self {
        Self {
            class,
            attributes: JsonValue::Null,
            value: None,
            timestamp,
        }
    }

    /// Creates an app launch event.
    #[must_use]
    pub fn app_init(timestamp: DateTime<Utc>) -> Self {
        Self::new(EventClass::AppInit, timestamp)
    }

    /// Creates a foreground transition event.
    #[must_use]
    pub fn foreground(timestamp: DateTime<Utc>) -> Self {
        Self::new(EventClass::Foreground, timestamp)
    }

    /// Creates a background transition event.
    #[must_use]
    pub fn background(timestamp: DateTime<Utc>) -> Self {
        Self::new(EventClass::Background, timestamp)
    }

    /// Creates an active session event.
    #[must_use]
    pub fn active_session(timestamp: DateTime<Utc>) -> Self {
        Self::new(EventClass::ActiveSession, timestamp)
    }

    /// Creates a screen view event. The attributes are the screen name.
    #[must_use]
    pub fn screen_view(screen: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(EventClass::ScreenView, timestamp).with_attributes(JsonValue::String(screen.into()))
    }

    /// Creates a version update event.
    #[must_use]
    pub fn version_update(version: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(EventClass::VersionUpdate, timestamp)
            .with_attributes(json!({ "version": version.into() }))
    }

    /// Creates a region enter event.
    #[must_use]
    pub fn region_enter(region_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(EventClass::RegionEnter, timestamp)
            .with_attributes(json!({ "region_id": region_id.into() }))
    }

    /// Creates a region exit event.
    #[must_use]
    pub fn region_exit(region_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(EventClass::RegionExit, timestamp)
            .with_attributes(json!({ "region_id": region_id.into() }))
    }

    /// Creates a custom event.
    ///
    /// The attributes carry `event_name`, `properties` and `event_value` so
    /// predicates can match on any of them.
    #[must_use]
    pub fn custom_event(
        name: impl Into<String>,
        value: Option<f64>,
        properties: JsonValue,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut event = Self::new(EventClass::CustomEvent, timestamp).with_attributes(json!({
            "event_name": name.into(),
            "properties": properties,
            "event_value": value,
        }));
        event.value = value;
        event
    }

    /// Replaces the attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: JsonValue) -> Self {
        self.attributes = attributes;
        self
    }

    /// Sets the numeric value.
    #[must_use]
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Returns the region id of a region event.
    #[must_use]
    pub fn region_id(&self) -> Option<&str> {
        self.attributes.get("region_id").and_then(JsonValue::as_str)
    }
}

/// Whether the application is visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    /// The application is in the foreground.
    Foreground,
    /// The application is in the background.
    #[default]
    Background,
}

/// What the engine currently knows about the application.
///
/// Delay conditions are checked against this at the moment an execution is
/// attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppContext {
    /// Current app state.
    pub app_state: AppState,
    /// The most recently viewed screen.
    pub screen: Option<String>,
    /// Regions the device is currently inside.
    pub regions: BTreeSet<String>,
}

impl AppContext {
    /// Updates the context from an event.
    pub fn observe(&mut self, event: &AutomationEvent) {
        match event.class {
            EventClass::Foreground => self.app_state = AppState::Foreground,
            EventClass::Background => self.app_state = AppState::Background,
            EventClass::ScreenView => {
                self.screen = event.attributes.as_str().map(str::to_owned);
            }
            EventClass::RegionEnter => {
                if let Some(region) = event.region_id() {
                    self.regions.insert(region.to_owned());
                }
            }
            EventClass::RegionExit => {
                if let Some(region) = event.region_id() {
                    self.regions.remove(region);
                }
            }
            EventClass::AppInit
            | EventClass::VersionUpdate
            | EventClass::CustomEvent
            | EventClass::ActiveSession => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_event_carries_value_and_name() {
        let event = AutomationEvent::custom_event("purchase", Some(9.5), json!({"sku": "a"}), Utc::now());
        assert_eq!(event.value, Some(9.5));
        assert_eq!(event.attributes["event_name"], "purchase");
        assert_eq!(event.attributes["properties"]["sku"], "a");
    }

    #[test]
    fn context_tracks_app_state_screen_and_regions() {
        let now = Utc::now();
        let mut context = AppContext::default();
        assert_eq!(context.app_state, AppState::Background);

        context.observe(&AutomationEvent::foreground(now));
        context.observe(&AutomationEvent::screen_view("home", now));
        context.observe(&AutomationEvent::region_enter("store", now));
        assert_eq!(context.app_state, AppState::Foreground);
        assert_eq!(context.screen.as_deref(), Some("home"));
        assert!(context.regions.contains("store"));

        context.observe(&AutomationEvent::region_exit("store", now));
        context.observe(&AutomationEvent::background(now));
        assert!(context.regions.is_empty());
        assert_eq!(context.app_state, AppState::Background);
    }

    #[test]
    fn event_deserializes_from_wire_json() {
        let event: AutomationEvent = serde_json::from_value(json!({
            "class": "screen_view",
            "attributes": "settings",
            "timestamp": "2026-01-01T00:00:00Z"
        }))
        .expect("deserialize");
        assert_eq!(event.class, EventClass::ScreenView);
        assert_eq!(event.attributes, json!("settings"));
        assert_eq!(event.value, None);
    }
}
