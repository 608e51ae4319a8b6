//! The schedule engine.
//!
//! The engine owns every active schedule and turns the event stream into
//! decisions. Each call to `handle_event` or `handle_timer` is one pass:
//!
//! 1. Offer the event to every unfinished schedule inside its window.
//! 2. Execute ready schedules in `(priority, insertion)` order. The first
//!    schedule of a group to execute resets all of its siblings.
//! 3. Retire schedules that are finished or whose window has closed.
//! 4. Commit every changed record in one `ChangeSet`.
//!
//! Removed schedules are remembered by id and can never be registered again.
//!
//! A pass works on a copy of the engine state. The copy is adopted only
//! after the store accepted the commit, so a failed commit leaves the engine
//! exactly as it was and the same event can be offered again.

use crate::config::EngineConfig;
use crate::decision::{CancelReason, Decision, Execution, RetireReason};
use crate::error::{EngineError, EngineResult};
use crate::store::{ChangeSet, ScheduleRecord, ScheduleStore};
use automation_core::{ExecutionId, ScheduleId};
use automation_schedule::{
    AppContext, AutomationEvent, ExecutionAttempt, Schedule, ScheduleOutcome,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

/// Event-driven evaluator for a set of schedules.
#[derive(Debug)]
pub struct ScheduleEngine<S> {
    store: S,
    config: EngineConfig,
    records: BTreeMap<ScheduleId, ScheduleRecord>,
    context: AppContext,
    next_insertion: u64,
    high_water: Option<u64>,
    retired: BTreeSet<ScheduleId>,
}

/// Working state for one pass.
struct Pass {
    records: BTreeMap<ScheduleId, ScheduleRecord>,
    changed: BTreeSet<ScheduleId>,
    removals: Vec<ScheduleId>,
    decisions: Vec<Decision>,
}

impl Pass {
    fn new(records: BTreeMap<ScheduleId, ScheduleRecord>) -> Self {
        Self {
            records,
            changed: BTreeSet::new(),
            removals: Vec::new(),
            decisions: Vec::new(),
        }
    }

    fn offer(&mut self, sequence: u64, event: &AutomationEvent, config: EngineConfig) {
        for (id, record) in &mut self.records {
            if record.has_consumed(sequence) {
                continue;
            }
            let outcome = record.schedule.record_event(event, config.trigger_policy);
            match outcome {
                ScheduleOutcome::Ignored | ScheduleOutcome::NoMatch | ScheduleOutcome::Pending => {}
                ScheduleOutcome::Progressed => {
                    debug!(schedule_id = %id, "trigger progressed");
                }
                ScheduleOutcome::Triggered => {
                    debug!(schedule_id = %id, "schedule triggered");
                }
                ScheduleOutcome::Cancelled => {
                    info!(schedule_id = %id, "pending execution cancelled by delay");
                    self.decisions.push(Decision::Cancel {
                        schedule_id: *id,
                        reason: CancelReason::DelayCancelled,
                    });
                }
            }
        }
    }

    fn resolve(&mut self, now: DateTime<Utc>, context: &AppContext, sequence: Option<u64>) {
        let mut ready: Vec<(i64, u64, ScheduleId)> = self
            .records
            .values()
            .filter(|r| sequence.is_none_or(|s| !r.has_consumed(s)))
            .filter(|r| r.schedule.is_ready(now, context))
            .map(|r| (r.schedule.priority(), r.insertion, r.schedule.id()))
            .collect();
        ready.sort_unstable();

        for (_, _, id) in ready {
            let Some(record) = self.records.get_mut(&id) else {
                continue;
            };
            let ExecutionAttempt::Executed { .. } = record.schedule.attempt_execution(now, context)
            else {
                // Preempted by a sibling earlier in this pass.
                continue;
            };

            let schedule = &record.schedule;
            info!(
                schedule_id = %id,
                execution_count = schedule.execution_count(),
                "executing schedule"
            );
            self.decisions.push(Decision::Execute(Execution {
                execution_id: ExecutionId::new(),
                schedule_id: id,
                payload: schedule.payload().clone(),
                priority: schedule.priority(),
                execution_count: schedule.execution_count(),
            }));
            self.changed.insert(id);

            if let Some(group) = schedule.group().map(str::to_owned) {
                self.preempt_group(&group, id);
            }
        }
    }

    fn preempt_group(&mut self, group: &str, winner: ScheduleId) {
        for (id, record) in &mut self.records {
            let sibling = &mut record.schedule;
            if *id == winner || sibling.group() != Some(group) || sibling.is_finished() {
                continue;
            }
            let was_pending = sibling.is_triggered();
            if !was_pending && !sibling.has_progress() {
                continue;
            }
            sibling.reset_cycle();
            self.changed.insert(*id);
            if was_pending {
                info!(schedule_id = %id, by = %winner, group, "pending execution preempted by group");
                self.decisions.push(Decision::Cancel {
                    schedule_id: *id,
                    reason: CancelReason::GroupPreempted { by: winner },
                });
            } else {
                debug!(schedule_id = %id, by = %winner, group, "group sibling reset");
            }
        }
    }

    fn retire(&mut self, now: DateTime<Utc>) {
        let retiring: Vec<(ScheduleId, RetireReason)> = self
            .records
            .values()
            .filter_map(|r| {
                if r.schedule.is_finished() {
                    Some((r.schedule.id(), RetireReason::Finished))
                } else if r.schedule.is_expired_at(now) {
                    Some((r.schedule.id(), RetireReason::Expired))
                } else {
                    None
                }
            })
            .collect();

        for (id, reason) in retiring {
            info!(schedule_id = %id, %reason, "retiring schedule");
            self.records.remove(&id);
            self.changed.remove(&id);
            self.removals.push(id);
            self.decisions.push(Decision::Retire {
                schedule_id: id,
                reason,
            });
        }
    }

    fn change_set(&self) -> ChangeSet {
        ChangeSet {
            upserts: self
                .changed
                .iter()
                .filter_map(|id| self.records.get(id).cloned())
                .collect(),
            removals: self.removals.clone(),
        }
    }
}

/// Marks records whose state differs from `before` as changed by `sequence`.
fn mark_changed(
    pass: &mut Pass,
    before: &BTreeMap<ScheduleId, ScheduleRecord>,
    sequence: u64,
) {
    for (id, record) in &mut pass.records {
        let touched = pass.changed.contains(id)
            || before.get(id).is_none_or(|old| old.schedule != record.schedule);
        if touched {
            record.last_sequence = Some(sequence);
            pass.changed.insert(*id);
        }
    }
}

impl<S: ScheduleStore> ScheduleEngine<S> {
    /// Creates an engine from the records persisted in `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be loaded.
    #[instrument(skip(store))]
    pub async fn load(store: S, config: EngineConfig) -> EngineResult<Self> {
        let (records, retired) = store.load().await.map_err(EngineError::from)?.into_parts();

        let next_insertion = records
            .values()
            .map(|r| r.insertion.saturating_add(1))
            .max()
            .unwrap_or(0);
        let high_water = records.values().filter_map(|r| r.last_sequence).max();

        info!(
            schedules = records.len(),
            retired = retired.len(),
            "schedule engine loaded"
        );
        Ok(Self {
            store,
            config,
            records,
            context: AppContext::default(),
            next_insertion,
            high_water,
            retired,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Returns the app context built from the events seen so far.
    #[must_use]
    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the number of active schedules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no schedule is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if a schedule with `id` is active.
    #[must_use]
    pub fn contains(&self, id: ScheduleId) -> bool {
        self.records.contains_key(&id)
    }

    /// Returns true if a schedule with `id` was retired or cancelled.
    #[must_use]
    pub fn is_retired(&self, id: ScheduleId) -> bool {
        self.retired.contains(&id)
    }

    /// Returns an active schedule.
    #[must_use]
    pub fn get(&self, id: ScheduleId) -> Option<&Schedule> {
        self.records.get(&id).map(|r| &r.schedule)
    }

    /// Returns active schedules in execution order.
    #[must_use]
    pub fn schedules(&self) -> Vec<&Schedule> {
        let mut records: Vec<&ScheduleRecord> = self.records.values().collect();
        records.sort_by_key(|r| (r.schedule.priority(), r.insertion));
        records.into_iter().map(|r| &r.schedule).collect()
    }

    /// Returns the highest event sequence the engine has processed.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.high_water
    }

    /// Registers a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule is invalid, its id is active or was
    /// removed before, or the store rejects the commit.
    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.id()))]
    pub async fn schedule(&mut self, schedule: Schedule) -> EngineResult<ScheduleId> {
        let schedule_id = schedule.id();
        if let Some(issue) = schedule.validation_issue() {
            return Err(EngineError::InvalidSchedule { schedule_id, issue }.into());
        }
        if self.records.contains_key(&schedule_id) {
            return Err(EngineError::DuplicateSchedule { schedule_id }.into());
        }
        if self.retired.contains(&schedule_id) {
            return Err(EngineError::RetiredSchedule { schedule_id }.into());
        }

        let record = ScheduleRecord {
            schedule,
            insertion: self.next_insertion,
            last_sequence: self.high_water,
        };
        self.store
            .commit(ChangeSet {
                upserts: vec![record.clone()],
                removals: Vec::new(),
            })
            .await
            .map_err(EngineError::from)?;

        self.records.insert(schedule_id, record);
        self.next_insertion += 1;
        info!("schedule registered");
        Ok(schedule_id)
    }

    /// Removes an active schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if no schedule has `id` or the store rejects the
    /// commit.
    #[instrument(skip(self))]
    pub async fn cancel_schedule(&mut self, id: ScheduleId) -> EngineResult<()> {
        if !self.records.contains_key(&id) {
            return Err(EngineError::ScheduleNotFound { schedule_id: id }.into());
        }
        self.store
            .commit(ChangeSet {
                upserts: Vec::new(),
                removals: vec![id],
            })
            .await
            .map_err(EngineError::from)?;

        self.records.remove(&id);
        self.retired.insert(id);
        info!("schedule removed");
        Ok(())
    }

    /// Processes one event.
    ///
    /// Schedules that already applied `sequence` are left alone, so offering
    /// the same event twice has no further effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the commit. The engine state
    /// is unchanged in that case.
    #[instrument(skip(self, event), fields(class = %event.class))]
    pub async fn handle_event(
        &mut self,
        sequence: u64,
        event: &AutomationEvent,
    ) -> EngineResult<Vec<Decision>> {
        let mut context = self.context.clone();
        context.observe(event);

        let now = event.timestamp;
        let mut pass = Pass::new(self.records.clone());
        pass.offer(sequence, event, self.config);
        pass.resolve(now, &context, Some(sequence));
        mark_changed(&mut pass, &self.records, sequence);
        pass.retire(now);

        self.commit(&pass).await?;
        self.retired.extend(pass.removals.iter().copied());
        self.records = pass.records;
        self.context = context;
        self.high_water = self.high_water.max(Some(sequence));
        Ok(pass.decisions)
    }

    /// Executes schedules whose delay elapsed by `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the commit. The engine state
    /// is unchanged in that case.
    #[instrument(skip(self))]
    pub async fn handle_timer(
        &mut self,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Decision>> {
        let mut pass = Pass::new(self.records.clone());
        pass.resolve(now, &self.context, None);
        pass.retire(now);

        self.commit(&pass).await?;
        self.retired.extend(pass.removals.iter().copied());
        self.records = pass.records;
        Ok(pass.decisions)
    }

    /// Returns when `handle_timer` should next run.
    ///
    /// That is the earliest pending delay deadline after `now`, or `now`
    /// itself when a pending execution is already overdue and could run.
    /// Overdue schedules whose delay conditions do not hold are left to the
    /// next event.
    #[must_use]
    pub fn next_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.records
            .values()
            .filter_map(|r| {
                let schedule = &r.schedule;
                schedule.next_deadline(now).or_else(|| {
                    let overdue = !schedule.is_finished()
                        && schedule.is_active_at(now)
                        && schedule.is_ready(now, &self.context);
                    overdue.then_some(now)
                })
            })
            .min()
    }

    async fn commit(&self, pass: &Pass) -> EngineResult<()> {
        let changes = pass.change_set();
        if changes.is_empty() {
            return Ok(());
        }
        debug!(
            upserts = changes.upserts.len(),
            removals = changes.removals.len(),
            "committing pass"
        );
        self.store.commit(changes).await.map_err(EngineError::from)?;
        Ok(())
    }
}
