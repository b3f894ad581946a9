//! In-memory loader
//!
//! Serves revisions from a map held in process. Useful for embedding a fixed
//! template set and as the reference loader in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Loader, LoaderError};
use crate::domain::Revision;

/// Loader backed by an in-memory map of name -> revisions
#[derive(Default)]
pub struct MemoryLoader {
    revisions: RwLock<HashMap<String, Vec<Revision>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a loader pre-populated with the given revisions
    pub fn from_revisions(revisions: impl IntoIterator<Item = Revision>) -> Self {
        let mut map: HashMap<String, Vec<Revision>> = HashMap::new();
        for rev in revisions {
            map.entry(rev.name().to_string()).or_default().push(rev);
        }
        debug!(names = map.len(), "MemoryLoader::from_revisions: called");
        Self {
            revisions: RwLock::new(map),
        }
    }

    /// Publish a new revision
    pub async fn publish(&self, revision: Revision) {
        debug!(name = %revision.name(), version = %revision.version(), "MemoryLoader::publish: called");
        self.revisions
            .write()
            .await
            .entry(revision.name().to_string())
            .or_default()
            .push(revision);
    }

    /// Remove every revision of a name
    pub async fn retire(&self, name: &str) {
        debug!(%name, "MemoryLoader::retire: called");
        self.revisions.write().await.remove(name);
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn list_revisions(&self, name: &str) -> Result<Vec<Revision>, LoaderError> {
        debug!(%name, "MemoryLoader::list_revisions: called");
        self.revisions
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(name.to_string()))
    }
}
