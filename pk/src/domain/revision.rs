//! Immutable template revisions

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constraint::Version;

/// Variables supplied to a render call
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// One published, immutable version of a named template
///
/// Built once through the `with_*` methods and then shared as `Arc<Revision>`;
/// there are no mutating accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    name: String,
    version: Version,
    #[serde(default)]
    labels: BTreeSet<String>,
    content: String,
    #[serde(default)]
    required_variables: BTreeSet<String>,
    created_at: DateTime<Utc>,
}

impl Revision {
    /// Create a revision stamped with the current time
    pub fn new(name: impl Into<String>, version: Version, content: impl Into<String>) -> Self {
        let name = name.into();
        debug!(%name, %version, "Revision::new: called");
        Self {
            name,
            version,
            labels: BTreeSet::new(),
            content: content.into(),
            required_variables: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_required_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_variables.extend(variables.into_iter().map(Into::into));
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn required_variables(&self) -> &BTreeSet<String> {
        &self.required_variables
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Required variables absent from `variables`, in sorted order
    pub fn missing_variables(&self, variables: &Variables) -> Vec<String> {
        self.required_variables
            .iter()
            .filter(|v| !variables.contains_key(v.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_sets_fields() {
        let rev = Revision::new("greet", Version::new(1, 2, 0), "body")
            .with_label("prod")
            .with_labels(["canary", "prod"])
            .with_required_variables(["name"]);
        assert_eq!(rev.name(), "greet");
        assert_eq!(rev.version(), Version::new(1, 2, 0));
        assert_eq!(rev.labels().len(), 2);
        assert!(rev.has_label("prod"));
        assert!(!rev.has_label("dev"));
        assert_eq!(rev.content(), "body");
    }

    #[test]
    fn test_missing_variables() {
        let rev = Revision::new("greet", Version::new(1, 0, 0), "").with_required_variables(["name", "issue"]);
        let mut vars = Variables::new();
        vars.insert("name".to_string(), json!("Bob"));
        assert_eq!(rev.missing_variables(&vars), vec!["issue".to_string()]);
        vars.insert("issue".to_string(), json!("login"));
        assert!(rev.missing_variables(&vars).is_empty());
    }

    #[test]
    fn test_serde_round_trip_keeps_labels() {
        let rev = Revision::new("greet", Version::new(1, 0, 0), "hi").with_label("prod");
        let json = serde_json::to_string(&rev).unwrap();
        assert!(json.contains("\"version\":\"1.0.0\""));
        let parsed: Revision = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rev);
    }
}
