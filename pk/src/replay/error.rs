//! Replay error types

use thiserror::Error;

/// Errors at the model-client boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(String),

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("no client for provider '{0}'")]
    UnknownProvider(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::Request(_))
    }
}

/// Reasons a replay stops
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    /// The trace itself recorded an upstream failure
    #[error("trace {trace_id} recorded an error at step {step}: {payload}")]
    Recorded {
        trace_id: String,
        step: u64,
        payload: serde_json::Value,
    },

    /// The model client failed while reissuing a request
    #[error("model client failed at step {step}: {source}")]
    Client {
        step: u64,
        #[source]
        source: ModelError,
    },

    /// A request row's payload is not a list of messages
    #[error("invalid request payload at step {step}: {message}")]
    InvalidPayload { step: u64, message: String },

    /// The rows do not form one gap-free trace
    #[error("malformed trace: {0}")]
    MalformedTrace(String),
}

impl ReplayError {
    /// Step the replay stopped at, when known
    pub fn step(&self) -> Option<u64> {
        match self {
            ReplayError::Recorded { step, .. }
            | ReplayError::Client { step, .. }
            | ReplayError::InvalidPayload { step, .. } => Some(*step),
            ReplayError::MalformedTrace(_) => None,
        }
    }
}
