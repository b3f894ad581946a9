//! Revision Catalog
//!
//! Wraps an external [`Loader`] and turns its answers into immutable
//! [`CatalogSnapshot`]s the resolver can work against.

use std::sync::Arc;

use tracing::debug;

mod error;
mod loader;
mod memory;

pub use error::LoaderError;
pub use loader::Loader;
pub use memory::MemoryLoader;

use crate::constraint::Constraint;
use crate::domain::Revision;
use crate::resolver::{self, ResolveError};

/// All revisions known for one name at one moment
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    name: String,
    revisions: Vec<Arc<Revision>>,
}

impl CatalogSnapshot {
    pub fn new(name: impl Into<String>, revisions: impl IntoIterator<Item = Revision>) -> Self {
        Self {
            name: name.into(),
            revisions: revisions.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revisions(&self) -> &[Arc<Revision>] {
        &self.revisions
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

/// Catalog accessor shared by the cache and the manifest checker
#[derive(Clone)]
pub struct Catalog {
    loader: Arc<dyn Loader>,
}

impl Catalog {
    pub fn new(loader: Arc<dyn Loader>) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &Arc<dyn Loader> {
        &self.loader
    }

    /// Query the loader for the current revisions of `name`
    ///
    /// A loader reporting `NotFound` yields an empty snapshot, so "unknown name"
    /// and "no matching revision" both surface as a resolver not-found.
    pub async fn snapshot(&self, name: &str) -> Result<CatalogSnapshot, LoaderError> {
        debug!(%name, "Catalog::snapshot: called");
        match self.loader.list_revisions(name).await {
            Ok(revisions) => {
                debug!(%name, count = revisions.len(), "Catalog::snapshot: loaded");
                Ok(CatalogSnapshot::new(name, revisions))
            }
            Err(LoaderError::NotFound(_)) => {
                debug!(%name, "Catalog::snapshot: loader has no such name");
                Ok(CatalogSnapshot::new(name, Vec::new()))
            }
            Err(e) => Err(e),
        }
    }

    /// Snapshot the name and pick the best revision for the constraint
    pub async fn resolve(&self, name: &str, constraint: &Constraint) -> Result<Arc<Revision>, ResolveError> {
        debug!(%name, %constraint, "Catalog::resolve: called");
        let snapshot = self.snapshot(name).await?;
        resolver::resolve(constraint, &snapshot).cloned()
    }
}
