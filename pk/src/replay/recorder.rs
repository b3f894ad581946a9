//! Trace Recorder - writes model-client traffic to JSONL rollout files
//!
//! Wraps any [`ModelClient`]. Every call becomes one trace: the request at
//! step 0, one row per answer message, and an `error` row if the call fails.
//! Rows are appended to `<dir>/rollout-<YYYY-MM-DD>-<session_id>.jsonl`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use eyre::Context;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::client::ModelClient;
use super::error::ModelError;
use super::row::{Direction, ReplayRow, TraceMeta};
use crate::domain::{Message, MessageKind};

/// Recording wrapper around a model client
pub struct TraceRecorder {
    inner: Arc<dyn ModelClient>,
    session_id: String,
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl TraceRecorder {
    pub fn new(inner: Arc<dyn ModelClient>, session_id: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        let session_id = session_id.into();
        let dir = dir.as_ref().to_path_buf();
        debug!(%session_id, ?dir, "TraceRecorder::new: called");
        Self {
            inner,
            session_id,
            dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// File the current day's rows go to
    pub fn log_path(&self) -> PathBuf {
        let date = Utc::now().date_naive().format("%Y-%m-%d");
        self.dir.join(format!("rollout-{}-{}.jsonl", date, self.session_id))
    }

    async fn append(&self, rows: &[ReplayRow]) -> eyre::Result<()> {
        let mut buf = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.log_path();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context(format!("Failed to open {}", path.display()))?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    async fn record(&self, rows: &[ReplayRow]) {
        if let Err(e) = self.append(rows).await {
            warn!(session_id = %self.session_id, error = %e, "TraceRecorder: failed to write trace rows");
        }
    }
}

/// Per-trace row builder with strictly increasing timestamps
struct TraceWriter<'a> {
    session_id: &'a str,
    trace_id: String,
    meta: &'a TraceMeta,
    step: u64,
    last_ts: i64,
}

impl<'a> TraceWriter<'a> {
    fn new(session_id: &'a str, meta: &'a TraceMeta) -> Self {
        Self {
            session_id,
            trace_id: Uuid::now_v7().to_string(),
            meta,
            step: 0,
            last_ts: i64::MIN,
        }
    }

    fn row(&mut self, direction: Direction, payload: serde_json::Value) -> ReplayRow {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let timestamp = now.max(self.last_ts.saturating_add(1));
        self.last_ts = timestamp;

        let row = ReplayRow {
            session_id: self.session_id.to_string(),
            trace_id: self.trace_id.clone(),
            step: self.step,
            direction,
            timestamp,
            payload,
            meta: self.meta.clone(),
        };
        self.step += 1;
        row
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| serde_json::json!({ "unserializable": e.to_string() }))
}

#[async_trait]
impl ModelClient for TraceRecorder {
    async fn complete(&self, messages: &[Message], meta: &TraceMeta) -> Result<Vec<Message>, ModelError> {
        let mut trace = TraceWriter::new(&self.session_id, meta);
        debug!(trace_id = %trace.trace_id, "TraceRecorder::complete: called");

        let request = trace.row(Direction::Request, to_payload(&messages));
        self.record(&[request]).await;

        match self.inner.complete(messages, meta).await {
            Ok(answer) => {
                let rows: Vec<ReplayRow> = answer
                    .iter()
                    .map(|message| {
                        let direction = match message.kind {
                            MessageKind::ToolUse => Direction::Delta,
                            _ => Direction::Response,
                        };
                        trace.row(direction, to_payload(message))
                    })
                    .collect();
                self.record(&rows).await;
                Ok(answer)
            }
            Err(e) => {
                let row = trace.row(Direction::Error, serde_json::json!({ "error": e.to_string() }));
                self.record(&[row]).await;
                Err(e)
            }
        }
    }
}

/// Load a rollout file, grouping rows by trace id
///
/// Unparseable lines are skipped with a warning.
pub fn read_trace_file(path: impl AsRef<Path>) -> eyre::Result<BTreeMap<String, Vec<ReplayRow>>> {
    let path = path.as_ref();
    debug!(?path, "read_trace_file: called");
    let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;

    let mut traces: BTreeMap<String, Vec<ReplayRow>> = BTreeMap::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ReplayRow>(line) {
            Ok(row) => traces.entry(row.trace_id.clone()).or_default().push(row),
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "read_trace_file: skipping unparseable line");
            }
        }
    }

    debug!(traces = traces.len(), "read_trace_file: loaded traces");
    Ok(traces)
}
