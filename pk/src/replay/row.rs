//! Recorded trace rows

use serde::{Deserialize, Serialize};

/// What a recorded row represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Messages sent to the model
    #[serde(alias = "req")]
    Request,
    /// A streamed fragment of the model's answer
    Delta,
    /// A complete answer message
    #[serde(alias = "res")]
    Response,
    /// Output of a tool invoked during the trace
    ToolResult,
    /// The upstream call failed
    Error,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Delta => "delta",
            Direction::Response => "response",
            Direction::ToolResult => "tool_result",
            Direction::Error => "error",
        }
    }

    /// Rows replayed verbatim rather than reissued
    pub fn is_recorded_output(&self) -> bool {
        matches!(self, Direction::Delta | Direction::Response | Direction::ToolResult)
    }
}

/// Provider and model a row was recorded against, plus anything else the recorder kept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMeta {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TraceMeta {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// One line of a recorded trace file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRow {
    pub session_id: String,
    pub trace_id: String,
    pub step: u64,
    pub direction: Direction,
    /// Nanoseconds since the Unix epoch
    pub timestamp: i64,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub meta: TraceMeta,
}
