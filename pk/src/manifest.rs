//! Prompt manifests
//!
//! A manifest declares the prompts an application depends on:
//!
//! ```yaml
//! support_reply: "^1#prod"
//! greet: "~2.1"
//! summarize: ""
//! ```
//!
//! [`check_manifest`] resolves every entry against a catalog ahead of
//! deployment and reports the ones that would not resolve.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::constraint::{Constraint, ConstraintError, Selector};
use crate::resolver::ResolveError;

/// Declared prompt names and their constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path, "Manifest::load: called");
        let content = fs::read_to_string(path).context(format!("Failed to read manifest {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document is an empty manifest
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse manifest")
    }

    pub fn with_entry(mut self, name: impl Into<String>, constraint: impl Into<String>) -> Self {
        self.entries.insert(name.into(), constraint.into());
        self
    }

    /// Entries in name order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A manifest entry that does not resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestIssue {
    pub name: String,
    pub constraint: String,
    pub error: ResolveError,
}

fn parse_entry(name: &str, constraint: &str) -> Result<Constraint, ConstraintError> {
    let selector = Selector::parse(name)?;
    if selector.name != name {
        return Err(ConstraintError::InvalidName(name.to_string()));
    }
    Constraint::parse(constraint)
}

/// Resolve every entry against `catalog`, returning the failures in name order
pub async fn check_manifest(manifest: &Manifest, catalog: &Catalog) -> Vec<ManifestIssue> {
    debug!(entries = manifest.len(), "check_manifest: called");
    let mut issues = Vec::new();

    for (name, text) in manifest.entries() {
        let result = match parse_entry(name, text) {
            Ok(constraint) => catalog.resolve(name, &constraint).await.map(|_| ()),
            Err(e) => Err(ResolveError::from(e)),
        };
        if let Err(error) = result {
            warn!(%name, constraint = %text, %error, "check_manifest: entry does not resolve");
            issues.push(ManifestIssue {
                name: name.to_string(),
                constraint: text.to_string(),
                error,
            });
        }
    }

    debug!(issues = issues.len(), "check_manifest: done");
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{LoaderError, MemoryLoader, mock::CountingLoader};
    use crate::constraint::Version;
    use crate::domain::Revision;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn catalog() -> Catalog {
        Catalog::new(Arc::new(MemoryLoader::from_revisions([
            Revision::new("greet", Version::new(1, 4, 0), "x").with_label("prod"),
            Revision::new("support_reply", Version::new(2, 1, 3), "x"),
        ])))
    }

    #[test]
    fn test_from_yaml() {
        let manifest = Manifest::from_yaml("greet: \"^1#prod\"\nsupport_reply: \"~2.1\"\n").unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.entries().collect::<Vec<_>>(),
            vec![("greet", "^1#prod"), ("support_reply", "~2.1")]
        );
        assert!(Manifest::from_yaml("").unwrap().is_empty());
        assert!(Manifest::from_yaml("- not\n- a map\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("prompts.yml");
        fs::write(&path, "greet: \"1.x\"\n").unwrap();
        assert_eq!(Manifest::load(&path).unwrap(), Manifest::new().with_entry("greet", "1.x"));
        assert!(Manifest::load(temp.path().join("missing.yml")).is_err());
    }

    #[tokio::test]
    async fn test_check_reports_only_failures_in_order() {
        let manifest = Manifest::new()
            .with_entry("support_reply", "~2.1")
            .with_entry("greet", "^2")
            .with_entry("bad name", "")
            .with_entry("absent", "")
            .with_entry("broken", ">>1");

        let issues = check_manifest(&manifest, &catalog()).await;
        let names: Vec<_> = issues.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["absent", "bad name", "broken", "greet"]);

        assert!(matches!(issues[0].error, ResolveError::NotFound { .. }));
        assert!(matches!(issues[1].error, ResolveError::Syntax(ConstraintError::InvalidName(_))));
        assert!(matches!(issues[2].error, ResolveError::Syntax(_)));
        assert!(matches!(issues[3].error, ResolveError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_check_surfaces_loader_errors() {
        let loader = CountingLoader::new([Revision::new("greet", Version::new(1, 0, 0), "x")]);
        loader.fail_with(Some(LoaderError::Transient("down".to_string()))).await;
        let catalog = Catalog::new(Arc::new(loader));

        let issues = check_manifest(&Manifest::new().with_entry("greet", ""), &catalog).await;
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0].error, ResolveError::Loader(_)));
    }
}
