//! Schedule model for in-app automation.
//!
//! This crate provides:
//!
//! - **Events**: the normalized event stream and the app context derived from it
//! - **Triggers**: goal-based counters over matching events, with JSON predicates
//! - **Delays**: post-trigger waits with state conditions and cancellation triggers
//! - **Schedules**: validated definitions plus their per-cycle runtime state
//! - **Builder**: parsing of untrusted JSON definitions with per-field errors

mod decode;

pub mod builder;
pub mod delay;
pub mod error;
pub mod event;
pub mod predicate;
pub mod schedule;
pub mod trigger;

pub use builder::ScheduleBuilder;
pub use delay::{AppStateCondition, DelayCondition, DelayStatus};
pub use error::{ParseDomain, ParseError, ValidationIssue};
pub use event::{AppContext, AppState, AutomationEvent, EventClass};
pub use predicate::{EventPredicate, FieldMatcher, NumberRange, ValueMatcher};
pub use schedule::{
    ExecutionAttempt, MAX_TRIGGERS, Schedule, ScheduleOutcome, SchedulePhase, TriggerPolicy,
};
pub use trigger::{Trigger, TriggerOutcome, TriggerType};
