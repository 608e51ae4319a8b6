//! Executor that reports executions to the log and stdout.

use async_trait::async_trait;
use automation_engine::{Execution, ExecutorError, ScheduleExecutor};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// Writes each execution as one JSON line.
pub struct JsonLinesExecutor<W> {
    output: Mutex<W>,
}

impl<W> JsonLinesExecutor<W> {
    /// Creates an executor writing to `output`.
    #[must_use]
    pub fn new(output: W) -> Self {
        Self {
            output: Mutex::new(output),
        }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.output.into_inner()
    }
}

#[async_trait]
impl<W> ScheduleExecutor for JsonLinesExecutor<W>
where
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    async fn execute(&self, execution: &Execution) -> Result<(), ExecutorError> {
        info!(
            schedule_id = %execution.schedule_id,
            execution_id = %execution.execution_id,
            execution_count = execution.execution_count,
            "schedule executed"
        );

        let failed = |reason: String| ExecutorError::Failed {
            schedule_id: execution.schedule_id,
            reason,
        };
        let mut line = serde_json::to_vec(execution).map_err(|e| failed(e.to_string()))?;
        line.push(b'\n');

        let mut output = self.output.lock().await;
        output.write_all(&line).await.map_err(|e| failed(e.to_string()))?;
        output.flush().await.map_err(|e| failed(e.to_string()))?;
        Ok(())
    }
}
