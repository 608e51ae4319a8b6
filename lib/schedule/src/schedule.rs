//! Schedules pair triggers with a payload to execute.
//!
//! The definition part of a schedule (payload, triggers, limit, window,
//! delay) never changes after `ScheduleBuilder::build`. The runtime part
//! (trigger progress, execution count, current phase) is only changed by
//! the engine through `record_event`, `attempt_execution` and `reset_cycle`.
//!
//! A cycle runs from the last reset until the schedule executes or its
//! pending execution is cancelled:
//!
//! ```text
//! Idle --triggers satisfied--> Triggered --ready--> executed --> Idle | Paused
//!                                  |
//!                                  +--cancellation trigger / group--> Idle
//! ```

use crate::delay::{DelayCondition, DelayStatus, seconds_to_duration};
use crate::error::ValidationIssue;
use crate::event::{AppContext, AutomationEvent};
use crate::trigger::{Trigger, TriggerOutcome};
use automation_core::ScheduleId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;

/// Maximum number of triggers a schedule may have.
pub const MAX_TRIGGERS: usize = 10;

/// How a schedule's triggers combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// The first satisfied trigger arms the schedule.
    #[default]
    Any,
    /// Every trigger must be satisfied within the same cycle.
    All,
}

/// Where a schedule is in its cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulePhase {
    /// Accumulating trigger progress.
    #[default]
    Idle,
    /// Triggers fired; waiting for the delay to resolve or for execution.
    Triggered { at: DateTime<Utc> },
    /// Executed recently; ignoring events until the interval passes.
    Paused { until: DateTime<Utc> },
}

/// Result of offering an event to a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The schedule is finished, outside its window, or paused.
    Ignored,
    /// No trigger matched.
    NoMatch,
    /// At least one trigger progressed.
    Progressed,
    /// The triggers fired and the schedule is now pending execution.
    Triggered,
    /// The schedule is pending and the event did not cancel it.
    Pending,
    /// A cancellation trigger fired; the cycle was reset.
    Cancelled,
}

/// Result of attempting an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionAttempt {
    /// The execution was authorized and counted.
    Executed {
        /// True if the schedule reached its limit.
        finished: bool,
    },
    /// The schedule is not ready to execute.
    NotReady,
}

/// A validated automation schedule and its runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub(crate) id: ScheduleId,
    #[serde(default)]
    pub(crate) payload: JsonValue,
    #[serde(default)]
    pub(crate) priority: i64,
    pub(crate) triggers: Vec<Trigger>,
    pub(crate) limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) delay: Option<DelayCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) interval: Option<f64>,
    #[serde(default)]
    pub(crate) execution_count: u32,
    #[serde(default)]
    pub(crate) phase: SchedulePhase,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub(crate) satisfied_triggers: BTreeSet<usize>,
}

impl Schedule {
    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> ScheduleId {
        self.id
    }

    /// Returns the opaque payload.
    #[must_use]
    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    /// Returns the priority. Lower executes first.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Returns the triggers.
    #[must_use]
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Returns the execution limit.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the group, if any.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Returns the start of the validity window.
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns the end of the validity window.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.end.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns the delay, if any.
    #[must_use]
    pub fn delay(&self) -> Option<&DelayCondition> {
        self.delay.as_ref()
    }

    /// Returns the minimum seconds between executions, if any.
    #[must_use]
    pub fn interval(&self) -> Option<f64> {
        self.interval
    }

    /// Returns how many times the schedule has executed.
    #[must_use]
    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SchedulePhase {
        self.phase
    }

    /// Returns true once the execution count reaches the limit.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.execution_count >= self.limit
    }

    /// Returns true if `now` is inside the validity window.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start() <= now && now <= self.end()
    }

    /// Returns true if the window has closed before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.end()
    }

    /// Returns true if the triggers fired and execution is pending.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        matches!(self.phase, SchedulePhase::Triggered { .. })
    }

    /// Returns true if any trigger has progress in the current cycle.
    #[must_use]
    pub fn has_progress(&self) -> bool {
        !self.satisfied_triggers.is_empty() || self.triggers.iter().any(|t| t.progress() > 0.0)
    }

    /// Returns the first semantic rule this schedule breaks, if any.
    #[must_use]
    pub fn validation_issue(&self) -> Option<ValidationIssue> {
        if self.triggers.is_empty() {
            return Some(ValidationIssue::NoTriggers);
        }
        if self.triggers.len() > MAX_TRIGGERS {
            return Some(ValidationIssue::TooManyTriggers {
                count: self.triggers.len(),
                max: MAX_TRIGGERS,
            });
        }
        if let Some(index) = self.triggers.iter().position(|t| !t.is_valid()) {
            return Some(ValidationIssue::InvalidTrigger { index });
        }
        if self.start() > self.end() {
            return Some(ValidationIssue::InvertedWindow);
        }
        if self.delay.as_ref().is_some_and(|d| !d.is_valid()) {
            return Some(ValidationIssue::InvalidDelay);
        }
        if self.interval.is_some_and(|i| !i.is_finite() || i < 0.0) {
            return Some(ValidationIssue::InvalidInterval);
        }
        None
    }

    /// Returns true if the schedule satisfies every semantic rule.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validation_issue().is_none()
    }

    /// Offers an event to the schedule.
    ///
    /// While idle the event goes to the triggers; once they fire under
    /// `policy` the schedule becomes triggered. While triggered the event
    /// goes to the delay's cancellation triggers.
    pub fn record_event(&mut self, event: &AutomationEvent, policy: TriggerPolicy) -> ScheduleOutcome {
        if self.is_finished() || !self.is_active_at(event.timestamp) {
            return ScheduleOutcome::Ignored;
        }

        match self.phase {
            SchedulePhase::Paused { until } if event.timestamp < until => {
                return ScheduleOutcome::Ignored;
            }
            SchedulePhase::Paused { .. } => self.phase = SchedulePhase::Idle,
            SchedulePhase::Triggered { .. } => {
                let Some(delay) = self.delay.as_mut() else {
                    return ScheduleOutcome::Pending;
                };
                if delay.offer_event(event) == DelayStatus::Cancelled {
                    self.reset_cycle();
                    return ScheduleOutcome::Cancelled;
                }
                return ScheduleOutcome::Pending;
            }
            SchedulePhase::Idle => {}
        }

        let mut progressed = false;
        for (index, trigger) in self.triggers.iter_mut().enumerate() {
            if policy == TriggerPolicy::All && self.satisfied_triggers.contains(&index) {
                continue;
            }
            match trigger.record_event(event) {
                TriggerOutcome::NoMatch => {}
                TriggerOutcome::Progressed => progressed = true,
                TriggerOutcome::Satisfied => {
                    progressed = true;
                    self.satisfied_triggers.insert(index);
                }
            }
        }

        let fired = match policy {
            TriggerPolicy::Any => !self.satisfied_triggers.is_empty(),
            TriggerPolicy::All => self.satisfied_triggers.len() == self.triggers.len(),
        };
        if fired {
            self.phase = SchedulePhase::Triggered {
                at: event.timestamp,
            };
            ScheduleOutcome::Triggered
        } else if progressed {
            ScheduleOutcome::Progressed
        } else {
            ScheduleOutcome::NoMatch
        }
    }

    /// Returns true if a pending execution may proceed at `now`.
    #[must_use]
    pub fn is_ready(&self, now: DateTime<Utc>, context: &AppContext) -> bool {
        let SchedulePhase::Triggered { at } = self.phase else {
            return false;
        };
        self.delay
            .as_ref()
            .is_none_or(|delay| delay.evaluate(at, now, context) == DelayStatus::Ready)
    }

    /// Attempts to execute at `now`.
    ///
    /// Readiness is re-checked against `context`. On success the execution
    /// count goes up by one and a new cycle begins, paused for the interval
    /// when one is set.
    pub fn attempt_execution(&mut self, now: DateTime<Utc>, context: &AppContext) -> ExecutionAttempt {
        if self.is_finished() || !self.is_active_at(now) || !self.is_ready(now, context) {
            return ExecutionAttempt::NotReady;
        }

        self.execution_count = self.execution_count.saturating_add(1);
        self.reset_cycle();

        let finished = self.is_finished();
        if !finished
            && let Some(interval) = self.interval
            && interval > 0.0
        {
            self.phase = SchedulePhase::Paused {
                until: now
                    .checked_add_signed(seconds_to_duration(interval))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            };
        }
        ExecutionAttempt::Executed { finished }
    }

    /// Ends the current cycle without executing.
    pub fn reset_cycle(&mut self) {
        for trigger in &mut self.triggers {
            trigger.reset();
        }
        if let Some(delay) = self.delay.as_mut() {
            delay.reset();
        }
        self.satisfied_triggers.clear();
        self.phase = SchedulePhase::Idle;
    }

    /// Returns the next instant after `now` at which a pending delay's wait
    /// elapses.
    #[must_use]
    pub fn next_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let SchedulePhase::Triggered { at } = self.phase else {
            return None;
        };
        let deadline = self.delay.as_ref()?.deadline(at);
        (deadline > now).then_some(deadline)
    }

    /// Encodes the definition fields, leaving out runtime state.
    #[must_use]
    pub fn to_definition(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert("id".into(), self.id.to_string().into());
        if !self.payload.is_null() {
            map.insert("data".into(), self.payload.clone());
        }
        map.insert("priority".into(), self.priority.into());
        map.insert("limit".into(), self.limit.into());
        if let Some(group) = &self.group {
            map.insert("group".into(), group.clone().into());
        }
        if let Some(start) = self.start {
            map.insert("start".into(), start.to_rfc3339_opts(SecondsFormat::AutoSi, true).into());
        }
        if let Some(end) = self.end {
            map.insert("end".into(), end.to_rfc3339_opts(SecondsFormat::AutoSi, true).into());
        }
        map.insert(
            "triggers".into(),
            self.triggers.iter().map(Trigger::to_definition).collect(),
        );
        if let Some(delay) = &self.delay {
            map.insert("delay".into(), delay.to_definition());
        }
        if let Some(interval) = self.interval {
            map.insert("interval".into(), interval.into());
        }
        JsonValue::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ScheduleBuilder;
    use crate::trigger::TriggerType;
    use chrono::{Duration, TimeZone};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
            + Duration::seconds(seconds)
    }

    fn foreground_schedule(goal: f64) -> ScheduleBuilder {
        ScheduleBuilder::new().with_trigger(Trigger::new(TriggerType::Foreground, goal))
    }

    #[test]
    fn builder_defaults() {
        let schedule = foreground_schedule(1.0).build();
        assert_eq!(schedule.priority(), 0);
        assert_eq!(schedule.limit(), 1);
        assert_eq!(schedule.start(), DateTime::<Utc>::MIN_UTC);
        assert_eq!(schedule.end(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(schedule.execution_count(), 0);
        assert!(schedule.is_valid());
    }

    #[test]
    fn validation_issues() {
        assert_eq!(
            ScheduleBuilder::new().build().validation_issue(),
            Some(ValidationIssue::NoTriggers)
        );

        let eleven = (0..11).fold(ScheduleBuilder::new(), |builder, _| {
            builder.with_trigger(Trigger::new(TriggerType::AppInit, 1.0))
        });
        assert_eq!(
            eleven.build().validation_issue(),
            Some(ValidationIssue::TooManyTriggers { count: 11, max: 10 })
        );

        let inverted = foreground_schedule(1.0).with_start(t(10)).with_end(t(0)).build();
        assert_eq!(inverted.validation_issue(), Some(ValidationIssue::InvertedWindow));

        let bad_delay = foreground_schedule(1.0).with_delay(DelayCondition::new(-5.0)).build();
        assert_eq!(bad_delay.validation_issue(), Some(ValidationIssue::InvalidDelay));

        let zero_goal = foreground_schedule(0.0).build();
        assert_eq!(
            zero_goal.validation_issue(),
            Some(ValidationIssue::InvalidTrigger { index: 0 })
        );

        let bad_interval = foreground_schedule(1.0).with_interval(-1.0).build();
        assert_eq!(bad_interval.validation_issue(), Some(ValidationIssue::InvalidInterval));
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let mut schedule = foreground_schedule(2.0).with_start(t(100)).with_end(t(200)).build();

        let before = schedule.record_event(&AutomationEvent::foreground(t(50)), TriggerPolicy::Any);
        let after = schedule.record_event(&AutomationEvent::foreground(t(250)), TriggerPolicy::Any);
        assert_eq!(before, ScheduleOutcome::Ignored);
        assert_eq!(after, ScheduleOutcome::Ignored);
        assert!(!schedule.has_progress());

        let inside = schedule.record_event(&AutomationEvent::foreground(t(150)), TriggerPolicy::Any);
        assert_eq!(inside, ScheduleOutcome::Progressed);
    }

    #[test]
    fn any_policy_fires_on_first_trigger() {
        let mut schedule = ScheduleBuilder::new()
            .with_trigger(Trigger::new(TriggerType::Foreground, 1.0))
            .with_trigger(Trigger::new(TriggerType::AppInit, 1.0))
            .build();
        let outcome = schedule.record_event(&AutomationEvent::app_init(t(0)), TriggerPolicy::Any);
        assert_eq!(outcome, ScheduleOutcome::Triggered);
        assert_eq!(schedule.phase(), SchedulePhase::Triggered { at: t(0) });
    }

    #[test]
    fn all_policy_waits_for_every_trigger() {
        let mut schedule = ScheduleBuilder::new()
            .with_trigger(Trigger::new(TriggerType::Foreground, 1.0))
            .with_trigger(Trigger::new(TriggerType::AppInit, 1.0))
            .build();
        let policy = TriggerPolicy::All;

        assert_eq!(
            schedule.record_event(&AutomationEvent::app_init(t(0)), policy),
            ScheduleOutcome::Progressed
        );
        assert_eq!(
            schedule.record_event(&AutomationEvent::app_init(t(1)), policy),
            ScheduleOutcome::NoMatch
        );
        assert_eq!(
            schedule.record_event(&AutomationEvent::foreground(t(2)), policy),
            ScheduleOutcome::Triggered
        );
    }

    #[test]
    fn execution_without_delay() {
        let mut schedule = foreground_schedule(1.0).with_limit(2).build();
        let context = AppContext::default();

        assert_eq!(schedule.attempt_execution(t(0), &context), ExecutionAttempt::NotReady);

        schedule.record_event(&AutomationEvent::foreground(t(1)), TriggerPolicy::Any);
        assert!(schedule.is_ready(t(1), &context));
        assert_eq!(
            schedule.attempt_execution(t(1), &context),
            ExecutionAttempt::Executed { finished: false }
        );
        assert_eq!(schedule.phase(), SchedulePhase::Idle);

        schedule.record_event(&AutomationEvent::foreground(t(2)), TriggerPolicy::Any);
        assert_eq!(
            schedule.attempt_execution(t(2), &context),
            ExecutionAttempt::Executed { finished: true }
        );
        assert!(schedule.is_finished());
        assert_eq!(
            schedule.record_event(&AutomationEvent::foreground(t(3)), TriggerPolicy::Any),
            ScheduleOutcome::Ignored
        );
        assert_eq!(schedule.execution_count(), 2);
    }

    #[test]
    fn delay_cancellation_resets_cycle() {
        let mut schedule = foreground_schedule(1.0)
            .with_delay(
                DelayCondition::new(60.0)
                    .with_cancellation_trigger(Trigger::new(TriggerType::Background, 1.0)),
            )
            .build();
        let context = AppContext::default();

        schedule.record_event(&AutomationEvent::foreground(t(0)), TriggerPolicy::Any);
        assert_eq!(schedule.next_deadline(t(0)), Some(t(60)));
        assert_eq!(
            schedule.record_event(&AutomationEvent::background(t(10)), TriggerPolicy::Any),
            ScheduleOutcome::Cancelled
        );
        assert_eq!(schedule.phase(), SchedulePhase::Idle);
        assert_eq!(schedule.attempt_execution(t(70), &context), ExecutionAttempt::NotReady);
        assert_eq!(schedule.execution_count(), 0);
    }

    #[test]
    fn delay_executes_after_wait() {
        let mut schedule = foreground_schedule(1.0)
            .with_delay(
                DelayCondition::new(60.0)
                    .with_cancellation_trigger(Trigger::new(TriggerType::Background, 1.0)),
            )
            .build();
        let context = AppContext::default();

        schedule.record_event(&AutomationEvent::foreground(t(0)), TriggerPolicy::Any);
        assert_eq!(schedule.attempt_execution(t(59), &context), ExecutionAttempt::NotReady);
        assert_eq!(
            schedule.attempt_execution(t(60), &context),
            ExecutionAttempt::Executed { finished: true }
        );
        assert_eq!(schedule.attempt_execution(t(61), &context), ExecutionAttempt::NotReady);
        assert_eq!(schedule.execution_count(), 1);
    }

    #[test]
    fn interval_pauses_between_executions() {
        let mut schedule = foreground_schedule(1.0).with_limit(5).with_interval(30.0).build();
        let context = AppContext::default();

        schedule.record_event(&AutomationEvent::foreground(t(0)), TriggerPolicy::Any);
        schedule.attempt_execution(t(0), &context);
        assert_eq!(schedule.phase(), SchedulePhase::Paused { until: t(30) });

        assert_eq!(
            schedule.record_event(&AutomationEvent::foreground(t(10)), TriggerPolicy::Any),
            ScheduleOutcome::Ignored
        );
        assert_eq!(
            schedule.record_event(&AutomationEvent::foreground(t(30)), TriggerPolicy::Any),
            ScheduleOutcome::Triggered
        );
    }

    #[test]
    fn reset_cycle_clears_progress() {
        let mut schedule = foreground_schedule(3.0).build();
        schedule.record_event(&AutomationEvent::foreground(t(0)), TriggerPolicy::Any);
        assert!(schedule.has_progress());
        schedule.reset_cycle();
        assert!(!schedule.has_progress());
    }

    #[test]
    fn persisted_form_keeps_runtime_state() {
        let mut schedule = foreground_schedule(3.0).build();
        schedule.record_event(&AutomationEvent::foreground(t(0)), TriggerPolicy::Any);

        let json = serde_json::to_string(&schedule).expect("serialize");
        let restored: Schedule = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, schedule);
        assert_eq!(restored.triggers()[0].progress(), 1.0);
    }
}
