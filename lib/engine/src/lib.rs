//! Event-driven engine for in-app automation schedules.
//!
//! This crate provides:
//!
//! - **Engine**: fans events out to schedules, resolves executions and
//!   group exclusivity, and retires finished or expired schedules
//! - **Runner**: a single tokio task that serializes events, registrations
//!   and delay timers for an engine
//! - **Stores**: the `ScheduleStore` seam with in-memory and file backends
//! - **Executor**: the `ScheduleExecutor` seam that receives executions

pub mod clock;
pub mod config;
pub mod decision;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod file_store;
pub mod runner;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use decision::{CancelReason, Decision, Execution, RetireReason};
pub use engine::ScheduleEngine;
pub use envelope::{CURRENT_VERSION, Envelope, RawEnvelope};
pub use error::{EngineError, EngineResult, ExecutorError, StoreError};
pub use executor::ScheduleExecutor;
pub use file_store::FileScheduleStore;
pub use runner::{EngineHandle, EngineRunner};
pub use store::{ChangeSet, InMemoryScheduleStore, ScheduleRecord, ScheduleStore, StoreSnapshot};
