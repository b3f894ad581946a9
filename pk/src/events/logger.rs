//! Event Logger - persists telemetry events to a JSONL file
//!
//! Subscribes to the [`EventBus`] and appends every event, timestamped, to
//! `<dir>/events.jsonl`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, TelemetryEvent};

const LOG_FILE_NAME: &str = "events.jsonl";

/// Event logger that writes events to a JSONL file
pub struct EventLogger {
    log_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl EventLogger {
    /// Create a new event logger writing under `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let log_path = dir.as_ref().join(LOG_FILE_NAME);
        debug!(?log_path, "EventLogger::new: creating logger");
        Self { log_path, writer: None }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append one event
    pub fn write_event(&mut self, event: &TelemetryEvent) -> eyre::Result<()> {
        debug!(event_type = event.event_type(), "EventLogger::write_event");

        if self.writer.is_none() {
            if let Some(parent) = self.log_path.parent() {
                fs::create_dir_all(parent)?;
            }
            debug!(log_path = ?self.log_path, "EventLogger: opening log file");
            let file = OpenOptions::new().create(true).append(true).open(&self.log_path)?;
            self.writer = Some(BufWriter::new(file));
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(eyre::eyre!("event log writer unavailable"));
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Run the logger, consuming events from the bus until it closes
    ///
    /// Meant to be spawned as a background task.
    pub async fn run(mut self, mut rx: broadcast::Receiver<TelemetryEvent>) {
        debug!("EventLogger::run: starting event logger");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(error = %e, "EventLogger: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        if let Err(e) = self.close() {
            error!(error = %e, "EventLogger: failed to flush event log on shutdown");
        }
    }

    /// Flush and release the log file; the next write reopens it
    pub fn close(&mut self) -> eyre::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Read events back from a log directory
pub fn read_events(dir: impl AsRef<Path>) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = dir.as_ref().join(LOG_FILE_NAME);
    debug!(?log_path, "read_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_events: loaded entries");
    Ok(entries)
}

/// Spawn an event logger for `bus` as a background task
///
/// Subscribes before spawning, so no event emitted after this returns is missed.
pub fn spawn_event_logger(bus: &Arc<EventBus>, dir: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let logger = EventLogger::new(dir);
    let rx = bus.subscribe();
    tokio::spawn(async move {
        logger.run(rx).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ReplayStatus, TelemetrySink};
    use tempfile::tempdir;

    fn summary(delta: i64) -> TelemetryEvent {
        TelemetryEvent::ReplaySummary {
            trace_id: "t-1".to_string(),
            status: ReplayStatus::Ok,
            token_delta: delta,
        }
    }

    #[test]
    fn test_write_and_read_events() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());
        logger.write_event(&summary(1)).unwrap();
        logger.write_event(&summary(2)).unwrap();

        let entries = read_events(temp.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].event, summary(2));
    }

    #[test]
    fn test_read_missing_log_is_empty() {
        let temp = tempdir().unwrap();
        assert!(read_events(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_read_skips_garbage_lines() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());
        logger.write_event(&summary(1)).unwrap();
        let mut file = OpenOptions::new().append(true).open(logger.log_path()).unwrap();
        writeln!(file, "not json").unwrap();

        assert_eq!(read_events(temp.path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_logger_follows_bus_until_closed() {
        let temp = tempdir().unwrap();
        let bus = Arc::new(EventBus::with_default_capacity());
        let handle = spawn_event_logger(&bus, temp.path());

        bus.emit(summary(7));
        drop(bus);
        handle.await.unwrap();

        let entries = read_events(temp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, summary(7));
    }

    #[test]
    fn test_close_then_write_appends() {
        let temp = tempdir().unwrap();
        let mut logger = EventLogger::new(temp.path());
        logger.write_event(&summary(1)).unwrap();
        logger.close().unwrap();
        logger.close().unwrap();
        logger.write_event(&summary(2)).unwrap();

        let deltas: Vec<_> = read_events(temp.path())
            .unwrap()
            .into_iter()
            .map(|entry| entry.event)
            .collect();
        assert_eq!(deltas, vec![summary(1), summary(2)]);
    }

    #[tokio::test]
    async fn test_unwritable_log_dir_does_not_stop_logger() {
        let temp = tempdir().unwrap();
        let blocked = temp.path().join("not-a-dir");
        fs::write(&blocked, "").unwrap();

        let mut logger = EventLogger::new(&blocked);
        assert!(logger.write_event(&summary(1)).is_err());

        let bus = Arc::new(EventBus::with_default_capacity());
        let handle = spawn_event_logger(&bus, &blocked);
        bus.emit(summary(2));
        bus.emit(summary(3));
        drop(bus);
        handle.await.unwrap();
    }
}
