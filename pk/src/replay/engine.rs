//! Replay Engine
//!
//! Re-drives a recorded trace. Request rows are reissued to a live model
//! client (optionally with a patched payload); every other row is handed
//! back verbatim, so only patched requests can change the output.
//!
//! ```text
//!   rows (sorted by step)
//!     request      ──> ModelClient ──> Live outputs
//!     delta/response/tool_result   ──> Recorded output (as-is)
//!     error                        ──> ReplayError::Recorded, halt
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::Stream;
use tracing::{debug, info, warn};

use super::client::ModelClient;
use super::error::ReplayError;
use super::row::{Direction, ReplayRow};
use crate::domain::Message;
use crate::events::{ReplayStatus, TelemetryEvent, TelemetrySink};

/// Builds a model client for a provider name
pub type ClientFactory = dyn Fn(&str) -> Arc<dyn ModelClient> + Send + Sync;

/// Knobs for one replay
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Stop after this step
    pub up_to_step: Option<u64>,
    /// Replacement request messages by step
    pub patch: BTreeMap<u64, Vec<Message>>,
}

impl ReplayOptions {
    pub fn up_to(mut self, step: u64) -> Self {
        self.up_to_step = Some(step);
        self
    }

    pub fn with_patch(mut self, step: u64, messages: Vec<Message>) -> Self {
        self.patch.insert(step, messages);
        self
    }
}

/// One item produced by a replay
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutput {
    /// A message the live model returned for a reissued request
    Live { step: u64, message: Message },
    /// A recorded row handed back unchanged
    Recorded {
        step: u64,
        direction: Direction,
        payload: serde_json::Value,
    },
}

impl ReplayOutput {
    pub fn step(&self) -> u64 {
        match self {
            ReplayOutput::Live { step, .. } | ReplayOutput::Recorded { step, .. } => *step,
        }
    }
}

/// Replays recorded traces against live model clients
pub struct ReplayEngine {
    factory: Box<ClientFactory>,
    clients: Mutex<HashMap<String, Arc<dyn ModelClient>>>,
    telemetry: Arc<dyn TelemetrySink>,
    failures: AtomicU64,
}

impl ReplayEngine {
    pub fn new(
        factory: impl Fn(&str) -> Arc<dyn ModelClient> + Send + Sync + 'static,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        debug!("ReplayEngine::new: called");
        Self {
            factory: Box::new(factory),
            clients: Mutex::new(HashMap::new()),
            telemetry,
            failures: AtomicU64::new(0),
        }
    }

    /// Runs that ended on a recorded error or a client failure
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    fn client_for(&self, provider: &str) -> Arc<dyn ModelClient> {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            clients
                .entry(provider.to_string())
                .or_insert_with(|| {
                    debug!(%provider, "ReplayEngine::client_for: creating client");
                    (self.factory)(provider)
                }),
        )
    }

    /// Validate `rows` as one trace and start a lazy replay over them
    pub fn replay(&self, rows: Vec<ReplayRow>, options: ReplayOptions) -> Result<ReplayRun<'_>, ReplayError> {
        debug!(rows = rows.len(), up_to_step = ?options.up_to_step, patched = options.patch.len(), "ReplayEngine::replay: called");
        let rows = validate(rows)?;
        let trace_id = rows[0].trace_id.clone();
        let recorded_answers = recorded_answers(&rows);

        for step in options.patch.keys() {
            let is_request = rows.iter().any(|r| r.step == *step && r.direction == Direction::Request);
            if !is_request {
                warn!(%trace_id, %step, "ReplayEngine::replay: patch targets no request row, ignored");
            }
        }

        Ok(ReplayRun {
            engine: self,
            trace_id,
            rows: rows.into(),
            options,
            recorded_answers,
            pending: VecDeque::new(),
            diverged: false,
            token_delta: 0,
            finished: false,
        })
    }
}

/// Sort by step and check the rows form one gap-free trace
fn validate(mut rows: Vec<ReplayRow>) -> Result<Vec<ReplayRow>, ReplayError> {
    let Some(first) = rows.first() else {
        return Err(ReplayError::MalformedTrace("no rows".to_string()));
    };
    let trace_id = first.trace_id.clone();
    if let Some(other) = rows.iter().find(|r| r.trace_id != trace_id) {
        return Err(ReplayError::MalformedTrace(format!(
            "rows from traces {} and {}",
            trace_id, other.trace_id
        )));
    }

    rows.sort_by_key(|r| r.step);
    for pair in rows.windows(2) {
        if pair[0].step.checked_add(1) != Some(pair[1].step) {
            return Err(ReplayError::MalformedTrace(format!(
                "step {} follows step {}",
                pair[1].step, pair[0].step
            )));
        }
    }
    Ok(rows)
}

/// Text of the recorded answer rows that follow each request, keyed by request step
fn recorded_answers(rows: &[ReplayRow]) -> HashMap<u64, String> {
    let mut answers = HashMap::new();
    let mut current: Option<(u64, Vec<&str>)> = None;

    for row in rows {
        match row.direction {
            Direction::Request => {
                if let Some((step, parts)) = current.take() {
                    answers.insert(step, parts.concat());
                }
                current = Some((row.step, Vec::new()));
            }
            Direction::Delta | Direction::Response => {
                if let Some((_, parts)) = current.as_mut() {
                    parts.push(row.payload.get("content").and_then(|c| c.as_str()).unwrap_or_default());
                }
            }
            Direction::ToolResult | Direction::Error => {}
        }
    }
    if let Some((step, parts)) = current {
        answers.insert(step, parts.concat());
    }
    answers
}

fn token_count(text: &str) -> i64 {
    i64::try_from(text.split_whitespace().count()).unwrap_or(i64::MAX)
}

/// A replay in progress
///
/// Pull items with [`ReplayRun::next`] or turn it into a stream. It cannot be
/// restarted; dropping it stops the replay.
pub struct ReplayRun<'e> {
    engine: &'e ReplayEngine,
    trace_id: String,
    rows: VecDeque<ReplayRow>,
    options: ReplayOptions,
    recorded_answers: HashMap<u64, String>,
    pending: VecDeque<ReplayOutput>,
    diverged: bool,
    token_delta: i64,
    finished: bool,
}

impl<'e> ReplayRun<'e> {
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Next output, `None` once the trace is exhausted or has failed
    pub async fn next(&mut self) -> Option<Result<ReplayOutput, ReplayError>> {
        loop {
            if let Some(output) = self.pending.pop_front() {
                return Some(Ok(output));
            }
            if self.finished {
                return None;
            }

            let Some(row) = self.rows.pop_front() else {
                let status = if self.diverged { ReplayStatus::Diff } else { ReplayStatus::Ok };
                self.finish(status);
                return None;
            };

            if self.options.up_to_step.is_some_and(|limit| row.step > limit) {
                debug!(step = row.step, "ReplayRun::next: reached up_to_step");
                self.rows.clear();
                continue;
            }

            if row.direction.is_recorded_output() {
                return Some(Ok(ReplayOutput::Recorded {
                    step: row.step,
                    direction: row.direction,
                    payload: row.payload,
                }));
            }

            if row.direction == Direction::Request {
                if let Err(e) = self.reissue(&row).await {
                    self.fail();
                    return Some(Err(e));
                }
                continue;
            }

            warn!(trace_id = %self.trace_id, step = row.step, "ReplayRun::next: recorded error row");
            self.fail();
            return Some(Err(ReplayError::Recorded {
                trace_id: self.trace_id.clone(),
                step: row.step,
                payload: row.payload,
            }));
        }
    }

    async fn reissue(&mut self, row: &ReplayRow) -> Result<(), ReplayError> {
        let step = row.step;
        let messages = match self.options.patch.get(&step) {
            Some(patched) => {
                debug!(%step, "ReplayRun::reissue: using patched request");
                patched.clone()
            }
            None => serde_json::from_value::<Vec<Message>>(row.payload.clone()).map_err(|e| {
                ReplayError::InvalidPayload {
                    step,
                    message: e.to_string(),
                }
            })?,
        };

        let client = self.engine.client_for(&row.meta.provider);
        let answer = client
            .complete(&messages, &row.meta)
            .await
            .map_err(|source| ReplayError::Client { step, source })?;

        let live: String = answer.iter().map(|m| m.content.as_str()).collect();
        let recorded = self.recorded_answers.get(&step).map(String::as_str).unwrap_or_default();
        if live != recorded {
            debug!(%step, "ReplayRun::reissue: live answer differs from recording");
            self.diverged = true;
        }
        self.token_delta += token_count(&live) - token_count(recorded);

        self.pending
            .extend(answer.into_iter().map(|message| ReplayOutput::Live { step, message }));
        Ok(())
    }

    fn fail(&mut self) {
        self.engine.failures.fetch_add(1, Ordering::SeqCst);
        self.pending.clear();
        self.rows.clear();
        self.finish(ReplayStatus::Fail);
    }

    fn finish(&mut self, status: ReplayStatus) {
        if self.finished {
            return;
        }
        self.finished = true;
        info!(trace_id = %self.trace_id, status = status.as_str(), token_delta = self.token_delta, "ReplayRun: finished");
        self.engine.telemetry.emit(TelemetryEvent::ReplaySummary {
            trace_id: self.trace_id.clone(),
            status,
            token_delta: self.token_delta,
        });
    }

    /// Drain the replay, stopping at the first error
    pub async fn collect(mut self) -> Result<Vec<ReplayOutput>, ReplayError> {
        let mut outputs = Vec::new();
        while let Some(item) = self.next().await {
            outputs.push(item?);
        }
        Ok(outputs)
    }

    /// The replay as a `Stream`; ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<ReplayOutput, ReplayError>> + 'e {
        futures::stream::unfold(self, |mut run| async move { run.next().await.map(|item| (item, run)) })
    }
}
