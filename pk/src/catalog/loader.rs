//! Loader trait definition

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{CatalogSnapshot, LoaderError};
use crate::constraint::Constraint;
use crate::domain::Revision;
use crate::resolver;

/// Read-only access to a template registry
///
/// Implementations must be idempotent and side-effect free as seen by the
/// resolver: listing the same name twice against an unchanged registry returns
/// the same revisions.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Every known revision of `name`, with the labels currently pointing at it
    ///
    /// An unknown name may be reported either as an empty list or as `NotFound`.
    async fn list_revisions(&self, name: &str) -> Result<Vec<Revision>, LoaderError>;

    /// The revision a label points at, or the newest revision when no label is given
    async fn fetch(&self, name: &str, label: Option<&str>) -> Result<Arc<Revision>, LoaderError> {
        debug!(%name, ?label, "Loader::fetch: called");
        let constraint = match label {
            Some(label) => Constraint::with_label(label),
            None => Constraint::any(),
        };
        let snapshot = CatalogSnapshot::new(name, self.list_revisions(name).await?);
        resolver::resolve(&constraint, &snapshot)
            .cloned()
            .map_err(|_| LoaderError::NotFound(name.to_string()))
    }
}
