//! Telemetry event types
//!
//! The vocabulary handed to telemetry collaborators:
//! - fallback stage outcomes from the controller
//! - replay summaries from the replay engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraint::Version;
use crate::fallback::Tier;

/// Outcome class of one replay run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStatus {
    /// Every reissued request matched what was recorded
    Ok,
    /// At least one reissued request produced different content
    Diff,
    /// The trace hit a recorded error or the model client failed
    Fail,
}

impl ReplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Diff => "diff",
            Self::Fail => "fail",
        }
    }
}

/// Core event enum
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TelemetryEvent {
    /// One fallback tier was attempted
    FallbackStage {
        stage: Tier,
        name: String,
        version: Option<Version>,
        label: Option<String>,
        latency_ms: u64,
        succeeded: bool,
        error: Option<String>,
    },
    /// A replay run finished
    ReplaySummary {
        trace_id: String,
        status: ReplayStatus,
        token_delta: i64,
    },
}

impl TelemetryEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            TelemetryEvent::FallbackStage { .. } => "FallbackStage",
            TelemetryEvent::ReplaySummary { .. } => "ReplaySummary",
        }
    }

    /// Template name or trace id the event is about
    pub fn subject(&self) -> &str {
        match self {
            TelemetryEvent::FallbackStage { name, .. } => name,
            TelemetryEvent::ReplaySummary { trace_id, .. } => trace_id,
        }
    }
}

/// A timestamped event, as written by sinks that persist events
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: TelemetryEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: TelemetryEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
