//! Single-task driver for a `ScheduleEngine`.
//!
//! The runner owns the engine inside one tokio task. Commands arrive over an
//! mpsc channel from any number of `EngineHandle`s, and the task sleeps until
//! the next delay deadline in between. Events, registrations and timer
//! firings are therefore applied strictly one after another.
//!
//! On start the runner executes anything whose delay already elapsed while
//! it was not running.

use crate::clock::Clock;
use crate::decision::Decision;
use crate::engine::ScheduleEngine;
use crate::error::{EngineError, EngineResult};
use crate::executor::ScheduleExecutor;
use crate::store::ScheduleStore;
use automation_core::ScheduleId;
use automation_schedule::{AutomationEvent, Schedule};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 256;

/// Minimum wait before retrying a timer pass that failed.
const TIMER_RETRY: Duration = Duration::from_secs(1);

type Reply<T> = oneshot::Sender<EngineResult<T>>;

enum Command {
    Event {
        sequence: Option<u64>,
        event: AutomationEvent,
        reply: Option<Reply<Vec<Decision>>>,
    },
    Schedule {
        schedule: Box<Schedule>,
        reply: Reply<ScheduleId>,
    },
    Cancel {
        schedule_id: ScheduleId,
        reply: Reply<()>,
    },
    Shutdown,
}

/// Cloneable handle for sending commands to a running `EngineRunner`.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
}

impl EngineHandle {
    async fn send(&self, command: Command) -> EngineResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::RunnerStopped)?;
        Ok(())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> EngineResult<T> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply)).await?;
        response.await.map_err(|_| EngineError::RunnerStopped)?
    }

    /// Queues an event without waiting for it to be processed.
    ///
    /// Delivery is at most once. If the pass fails the event is logged and
    /// dropped, and its sequence number goes to the next event. Use
    /// `process` to learn about failures and retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner has stopped.
    pub async fn submit(&self, event: AutomationEvent) -> EngineResult<()> {
        self.send(Command::Event {
            sequence: None,
            event,
            reply: None,
        })
        .await
    }

    /// Processes an event and returns the decisions it produced.
    ///
    /// A failed pass does not use up a sequence number, so calling this
    /// again with the same event applies it exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner has stopped or the pass failed.
    pub async fn process(
        &self,
        event: AutomationEvent,
    ) -> EngineResult<Vec<Decision>> {
        self.request(|reply| Command::Event {
            sequence: None,
            event,
            reply: Some(reply),
        })
        .await
    }

    /// Re-offers an event under the sequence number it was first given.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner has stopped or the pass failed.
    pub async fn replay(
        &self,
        sequence: u64,
        event: AutomationEvent,
    ) -> EngineResult<Vec<Decision>> {
        self.request(|reply| Command::Event {
            sequence: Some(sequence),
            event,
            reply: Some(reply),
        })
        .await
    }

    /// Registers a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner has stopped or the engine rejected
    /// the schedule.
    pub async fn schedule(&self, schedule: Schedule) -> EngineResult<ScheduleId> {
        self.request(|reply| Command::Schedule {
            schedule: Box::new(schedule),
            reply,
        })
        .await
    }

    /// Removes a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner has stopped or no schedule has `id`.
    pub async fn cancel(&self, schedule_id: ScheduleId) -> EngineResult<()> {
        self.request(|reply| Command::Cancel { schedule_id, reply })
            .await
    }

    /// Asks the runner to stop after the commands already queued.
    pub async fn shutdown(&self) {
        // A closed channel means the runner already stopped.
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

/// Drives an engine from commands and delay deadlines.
pub struct EngineRunner<S, E, C> {
    engine: ScheduleEngine<S>,
    executor: E,
    clock: C,
    commands: mpsc::Receiver<Command>,
    next_sequence: u64,
    timer_failed: bool,
}

impl<S, E, C> EngineRunner<S, E, C>
where
    S: ScheduleStore,
    E: ScheduleExecutor,
    C: Clock,
{
    /// Creates a runner and a handle for it.
    #[must_use]
    pub fn new(engine: ScheduleEngine<S>, executor: E, clock: C) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let next_sequence = engine.last_sequence().map_or(0, |s| s.saturating_add(1));
        let runner = Self {
            engine,
            executor,
            clock,
            commands: rx,
            next_sequence,
            timer_failed: false,
        };
        (runner, EngineHandle { commands: tx })
    }

    /// Runs until shutdown is requested or every handle is dropped.
    ///
    /// Returns the engine so its final state can be inspected.
    pub async fn run(mut self) -> ScheduleEngine<S> {
        info!(
            schedules = self.engine.len(),
            next_sequence = self.next_sequence,
            "engine runner started"
        );
        self.fire_timer().await;

        loop {
            let wait = self.time_until_deadline();
            let timer = async move {
                match wait {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                () = timer => self.fire_timer().await,
            }
        }

        info!("engine runner stopped");
        self.engine
    }

    fn time_until_deadline(&self) -> Option<Duration> {
        let now = self.clock.now();
        let deadline = self.engine.next_deadline(now)?;
        let wait = (deadline - now).to_std().unwrap_or(Duration::ZERO);
        if self.timer_failed {
            Some(wait.max(TIMER_RETRY))
        } else {
            Some(wait)
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Event {
                sequence,
                event,
                reply,
            } => {
                let sequence = sequence.unwrap_or(self.next_sequence);
                let result = self.engine.handle_event(sequence, &event).await;
                match &result {
                    Ok(decisions) => {
                        self.next_sequence = self.next_sequence.max(sequence.saturating_add(1));
                        self.dispatch(decisions).await;
                    }
                    Err(report) => warn!(sequence, error = %report, "failed to process event"),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Command::Schedule { schedule, reply } => {
                let _ = reply.send(self.engine.schedule(*schedule).await);
            }
            Command::Cancel { schedule_id, reply } => {
                let _ = reply.send(self.engine.cancel_schedule(schedule_id).await);
            }
            Command::Shutdown => {}
        }
    }

    async fn fire_timer(&mut self) {
        let now = self.clock.now();
        debug!(%now, "delay deadline reached");
        match self.engine.handle_timer(now).await {
            Ok(decisions) => {
                self.timer_failed = false;
                self.dispatch(&decisions).await;
            }
            Err(report) => {
                self.timer_failed = true;
                warn!(error = %report, "failed to process timer");
            }
        }
    }

    async fn dispatch(&self, decisions: &[Decision]) {
        for execution in decisions.iter().filter_map(Decision::as_execution) {
            if let Err(e) = self.executor.execute(execution).await {
                warn!(
                    schedule_id = %execution.schedule_id,
                    execution_id = %execution.execution_id,
                    error = %e,
                    "executor failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::config::EngineConfig;
    use crate::decision::Execution;
    use crate::error::{ExecutorError, StoreError};
    use crate::store::{ChangeSet, InMemoryScheduleStore, StoreSnapshot};
    use async_trait::async_trait;
    use automation_schedule::{DelayCondition, ScheduleBuilder, Trigger, TriggerType};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
            + chrono::Duration::seconds(seconds)
    }

    struct RecordingExecutor {
        executions: mpsc::UnboundedSender<Execution>,
    }

    #[async_trait]
    impl ScheduleExecutor for RecordingExecutor {
        async fn execute(&self, execution: &Execution) -> Result<(), ExecutorError> {
            self.executions
                .send(execution.clone())
                .map_err(|e| ExecutorError::Failed {
                    schedule_id: execution.schedule_id,
                    reason: e.to_string(),
                })
        }
    }

    /// Accepts commits until told to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryScheduleStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ScheduleStore for FlakyStore {
        async fn load(&self) -> Result<StoreSnapshot, StoreError> {
            self.inner.load().await
        }

        async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::WriteFailed {
                    reason: "disk full".to_string(),
                });
            }
            self.inner.commit(changes).await
        }
    }

    fn spawn<S, C>(
        engine: ScheduleEngine<S>,
        clock: C,
    ) -> (
        EngineHandle,
        mpsc::UnboundedReceiver<Execution>,
        tokio::task::JoinHandle<ScheduleEngine<S>>,
    )
    where
        S: ScheduleStore + 'static,
        C: Clock + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (runner, handle) = EngineRunner::new(engine, RecordingExecutor { executions: tx }, clock);
        (handle, rx, tokio::spawn(runner.run()))
    }

    async fn start() -> (
        EngineHandle,
        mpsc::UnboundedReceiver<Execution>,
        tokio::task::JoinHandle<ScheduleEngine<Arc<InMemoryScheduleStore>>>,
    ) {
        let engine = ScheduleEngine::load(Arc::new(InMemoryScheduleStore::new()), EngineConfig::default())
            .await
            .expect("load");
        spawn(engine, SystemClock)
    }

    async fn next_execution(executions: &mut mpsc::UnboundedReceiver<Execution>) -> Execution {
        tokio::time::timeout(Duration::from_secs(2), executions.recv())
            .await
            .expect("execution in time")
            .expect("execution")
    }

    fn delayed_on_foreground(seconds: f64) -> Schedule {
        ScheduleBuilder::new()
            .with_trigger(Trigger::new(TriggerType::Foreground, 1.0))
            .with_delay(DelayCondition::new(seconds))
            .build()
    }

    #[tokio::test]
    async fn events_reach_the_executor() {
        let (handle, mut executions, task) = start().await;
        let id = handle
            .schedule(
                ScheduleBuilder::new()
                    .with_trigger(Trigger::new(TriggerType::AppInit, 1.0))
                    .with_payload(serde_json::json!({"banner": "welcome"}))
                    .build(),
            )
            .await
            .expect("schedule");

        let decisions = handle
            .process(AutomationEvent::app_init(Utc::now()))
            .await
            .expect("process");
        assert_eq!(decisions[0].schedule_id(), id);

        let execution = executions.recv().await.expect("execution");
        assert_eq!(execution.schedule_id, id);
        assert_eq!(execution.payload["banner"], "welcome");

        handle.shutdown().await;
        let engine = task.await.expect("runner");
        assert!(engine.is_empty());
        assert_eq!(engine.last_sequence(), Some(0));
    }

    #[tokio::test]
    async fn delay_deadline_fires_without_events() {
        let (handle, mut executions, task) = start().await;
        let id = handle
            .schedule(
                ScheduleBuilder::new()
                    .with_trigger(Trigger::new(TriggerType::Foreground, 1.0))
                    .with_delay(DelayCondition::new(0.05))
                    .build(),
            )
            .await
            .expect("schedule");

        let decisions = handle
            .process(AutomationEvent::foreground(Utc::now()))
            .await
            .expect("process");
        assert!(decisions.is_empty());

        let execution = tokio::time::timeout(Duration::from_secs(5), executions.recv())
            .await
            .expect("deadline fired")
            .expect("execution");
        assert_eq!(execution.schedule_id, id);

        handle.shutdown().await;
        task.await.expect("runner");
    }

    #[tokio::test]
    async fn replay_is_idempotent_through_the_handle() {
        let (handle, _executions, task) = start().await;
        let id = handle
            .schedule(
                ScheduleBuilder::new()
                    .with_trigger(Trigger::new(TriggerType::Foreground, 2.0))
                    .build(),
            )
            .await
            .expect("schedule");

        let event = AutomationEvent::foreground(Utc::now());
        handle.replay(4, event.clone()).await.expect("replay");
        handle.replay(4, event.clone()).await.expect("replay");

        handle.shutdown().await;
        let engine = task.await.expect("runner");
        assert_eq!(engine.get(id).expect("active").triggers()[0].progress(), 1.0);
    }

    #[tokio::test]
    async fn handle_errors_after_shutdown() {
        let (handle, _executions, task) = start().await;
        handle.shutdown().await;
        task.await.expect("runner");

        assert!(handle.submit(AutomationEvent::app_init(Utc::now())).await.is_err());
        assert!(handle.cancel(ScheduleId::new()).await.is_err());
    }

    #[tokio::test]
    async fn overdue_delay_fires_when_the_event_lags_the_clock() {
        let engine = ScheduleEngine::load(Arc::new(InMemoryScheduleStore::new()), EngineConfig::default())
            .await
            .expect("load");
        let (handle, mut executions, task) = spawn(engine, ManualClock::new(t(100)));
        let id = handle
            .schedule(delayed_on_foreground(60.0))
            .await
            .expect("schedule");

        let decisions = handle
            .process(AutomationEvent::foreground(t(0)))
            .await
            .expect("process");
        assert!(decisions.is_empty());

        assert_eq!(next_execution(&mut executions).await.schedule_id, id);

        handle.shutdown().await;
        assert!(task.await.expect("runner").is_empty());
    }

    #[tokio::test]
    async fn pending_delay_resumes_after_restart() {
        let store = Arc::new(InMemoryScheduleStore::new());
        let mut engine = ScheduleEngine::load(Arc::clone(&store), EngineConfig::default())
            .await
            .expect("load");
        let id = engine
            .schedule(delayed_on_foreground(60.0))
            .await
            .expect("schedule");
        engine
            .handle_event(0, &AutomationEvent::foreground(t(0)))
            .await
            .expect("event");
        assert!(engine.get(id).expect("active").is_triggered());
        drop(engine);

        let restored = ScheduleEngine::load(Arc::clone(&store), EngineConfig::default())
            .await
            .expect("load");
        let (handle, mut executions, task) = spawn(restored, ManualClock::new(t(3600)));

        assert_eq!(next_execution(&mut executions).await.schedule_id, id);

        handle.shutdown().await;
        let engine = task.await.expect("runner");
        assert!(engine.is_empty());
        assert!(store.is_retired(id).await);
    }

    #[tokio::test]
    async fn failed_event_does_not_use_up_a_sequence() {
        let store = Arc::new(FlakyStore::default());
        let engine = ScheduleEngine::load(Arc::clone(&store), EngineConfig::default())
            .await
            .expect("load");
        let (handle, mut executions, task) = spawn(engine, SystemClock);
        let id = handle
            .schedule(
                ScheduleBuilder::new()
                    .with_trigger(Trigger::new(TriggerType::AppInit, 1.0))
                    .build(),
            )
            .await
            .expect("schedule");

        store.failing.store(true, Ordering::SeqCst);
        assert!(handle.process(AutomationEvent::app_init(Utc::now())).await.is_err());

        store.failing.store(false, Ordering::SeqCst);
        handle
            .process(AutomationEvent::app_init(Utc::now()))
            .await
            .expect("retry");
        assert_eq!(next_execution(&mut executions).await.schedule_id, id);

        handle.shutdown().await;
        let engine = task.await.expect("runner");
        assert_eq!(engine.last_sequence(), Some(0));
    }
}
