//! Trace recording and replay
//!
//! [`TraceRecorder`] captures model-client traffic as JSONL rows;
//! [`ReplayEngine`] plays those rows back, optionally with patched requests.

mod client;
mod engine;
mod error;
mod recorder;
mod row;

pub use client::ModelClient;
pub use engine::{ClientFactory, ReplayEngine, ReplayOptions, ReplayOutput, ReplayRun};
pub use error::{ModelError, ReplayError};
pub use recorder::{TraceRecorder, read_trace_file};
pub use row::{Direction, ReplayRow, TraceMeta};

#[cfg(test)]
pub use client::mock;
