//! Seam for running schedule payloads.

use crate::decision::Execution;
use crate::error::ExecutorError;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs the payload of an executed schedule.
///
/// The engine has already counted the execution when this is called, so a
/// failure is reported but never rolls the schedule back.
#[async_trait]
pub trait ScheduleExecutor: Send + Sync {
    /// Executes a schedule's payload.
    async fn execute(&self, execution: &Execution) -> Result<(), ExecutorError>;
}

#[async_trait]
impl<E: ScheduleExecutor + ?Sized> ScheduleExecutor for Arc<E> {
    async fn execute(&self, execution: &Execution) -> Result<(), ExecutorError> {
        (**self).execute(execution).await
    }
}
