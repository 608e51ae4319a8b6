//! Reading the event stream.

use automation_schedule::AutomationEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// Reads JSON-lines events, skipping blank and undecodable lines.
pub struct EventReader<R> {
    lines: tokio::io::Lines<R>,
    line_number: usize,
}

impl<R: AsyncBufRead + Unpin> EventReader<R> {
    /// Creates a reader over `input`.
    pub fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
            line_number: 0,
        }
    }

    /// Returns the next event, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the input fails.
    pub async fn next_event(&mut self) -> std::io::Result<Option<AutomationEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => warn!(line = self.line_number, error = %e, "skipping undecodable event"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automation_schedule::EventClass;

    #[tokio::test]
    async fn skips_bad_lines() {
        let input: &[u8] = br#"{"class": "foreground", "timestamp": "2026-03-01T12:00:00Z"}

not an event
{"class": "custom_event", "attributes": {"event_name": "purchase"}, "value": 4.5, "timestamp": "2026-03-01T12:00:01Z"}
"#;
        let mut reader = EventReader::new(input);

        let first = reader.next_event().await.expect("read").expect("event");
        assert_eq!(first.class, EventClass::Foreground);

        let second = reader.next_event().await.expect("read").expect("event");
        assert_eq!(second.class, EventClass::CustomEvent);
        assert_eq!(second.value, Some(4.5));

        assert!(reader.next_event().await.expect("read").is_none());
    }
}
