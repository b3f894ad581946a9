//! Experiment registry
//!
//! Supplies the traffic split, if any, that applies to a prompt for a given
//! caller.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::bucket::bucket;

/// Allowed distance of a split table's total from 1.0
const SPLIT_TOLERANCE: f64 = 1e-3;

/// Errors from experiment lookups
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExperimentError {
    #[error("invalid traffic split for '{experiment_id}': {reason}")]
    InvalidSplit { experiment_id: String, reason: String },

    #[error("experiment registry unavailable: {0}")]
    Unavailable(String),
}

/// A running experiment on one prompt
///
/// Either carries a traffic split that callers are bucketed over, or a
/// variant the registry has already decided for this caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSplit {
    pub experiment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default)]
    pub traffic_split: Vec<(String, f64)>,
}

impl ExperimentSplit {
    /// Build a split, checking proportions are non-negative and total ~1.0
    pub fn new(experiment_id: impl Into<String>, traffic_split: Vec<(String, f64)>) -> Result<Self, ExperimentError> {
        let experiment_id = experiment_id.into();
        debug!(%experiment_id, variants = traffic_split.len(), "ExperimentSplit::new: called");

        let invalid = |reason: String| ExperimentError::InvalidSplit {
            experiment_id: experiment_id.clone(),
            reason,
        };

        if traffic_split.is_empty() {
            return Err(invalid("no variants".to_string()));
        }
        if let Some((variant, p)) = traffic_split.iter().find(|(_, p)| !p.is_finite() || *p < 0.0) {
            return Err(invalid(format!("variant '{}' has proportion {}", variant, p)));
        }
        let total: f64 = traffic_split.iter().map(|(_, p)| p).sum();
        if (total - 1.0).abs() > SPLIT_TOLERANCE {
            return Err(invalid(format!("proportions sum to {}", total)));
        }

        Ok(Self {
            experiment_id,
            variant: None,
            traffic_split,
        })
    }

    /// A split whose variant the registry already chose
    pub fn decided(experiment_id: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            variant: Some(variant.into()),
            traffic_split: Vec::new(),
        }
    }

    /// Hash key for a caller: `<experiment_id>:<user_id>`
    pub fn hash_key(&self, user_id: &str) -> String {
        format!("{}:{}", self.experiment_id, user_id)
    }

    /// Variant assigned to `user_id`: the decided variant if there is one, else its bucket
    pub fn assign(&self, user_id: &str) -> Option<&str> {
        match &self.variant {
            Some(variant) => Some(variant.as_str()),
            None => bucket(&self.hash_key(user_id), &self.traffic_split),
        }
    }
}

/// Where experiment splits come from
#[async_trait]
pub trait ExperimentRegistry: Send + Sync {
    /// The split that applies to `prompt` for `user_id`, if any
    async fn get_split(&self, prompt: &str, user_id: &str) -> Result<Option<ExperimentSplit>, ExperimentError>;
}

/// Fixed in-memory registry keyed by prompt name
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    splits: HashMap<String, ExperimentSplit>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split(mut self, prompt: impl Into<String>, split: ExperimentSplit) -> Self {
        self.splits.insert(prompt.into(), split);
        self
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }
}

#[async_trait]
impl ExperimentRegistry for StaticRegistry {
    async fn get_split(&self, prompt: &str, user_id: &str) -> Result<Option<ExperimentSplit>, ExperimentError> {
        debug!(%prompt, %user_id, "StaticRegistry::get_split: called");
        Ok(self.splits.get(prompt).cloned())
    }
}
