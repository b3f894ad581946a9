//! Resolver
//!
//! Picks the best revision for a constraint out of a catalog snapshot. This is
//! a pure function of its inputs: the same constraint against the same
//! snapshot always selects the same revision, whatever order the loader
//! listed them in.
//!
//! Selection order among candidates:
//! 1. highest version (numeric major, minor, patch)
//! 2. most recent `created_at`
//! 3. lexicographically smallest label set, then content

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::catalog::{CatalogSnapshot, LoaderError};
use crate::constraint::{Constraint, ConstraintError};
use crate::domain::Revision;

/// Reasons a resolution can fail
///
/// `Clone` so one collapsed cache refresh can hand the same error to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("constraint syntax error: {0}")]
    Syntax(#[from] ConstraintError),

    #[error("no revision of '{name}' matches '{constraint}'")]
    NotFound { name: String, constraint: String },

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("resolution timed out after {0:?}")]
    Timeout(Duration),

    #[error("resolution task aborted: {0}")]
    Aborted(String),
}

impl ResolveError {
    /// Syntax errors are final for the request; everything else may succeed on a later call
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::Syntax(_) => false,
            ResolveError::NotFound { .. } => true,
            ResolveError::Loader(e) => e.is_retryable(),
            ResolveError::Timeout(_) => true,
            ResolveError::Aborted(_) => true,
        }
    }
}

/// Select the best revision in `snapshot` satisfying `constraint`
pub fn resolve<'a>(constraint: &Constraint, snapshot: &'a CatalogSnapshot) -> Result<&'a Arc<Revision>, ResolveError> {
    debug!(name = %snapshot.name(), %constraint, candidates = snapshot.revisions().len(), "resolve: called");

    let best = snapshot
        .revisions()
        .iter()
        .filter(|rev| rev.name() == snapshot.name())
        .filter(|rev| constraint.matches(&rev.version(), rev.labels()))
        .max_by(|a, b| preference(a, b));

    match best {
        Some(rev) => {
            debug!(version = %rev.version(), "resolve: selected");
            Ok(rev)
        }
        None => {
            debug!("resolve: no candidate");
            Err(ResolveError::NotFound {
                name: snapshot.name().to_string(),
                constraint: constraint.to_string(),
            })
        }
    }
}

/// Total order where `Greater` means "preferred"
fn preference(a: &Revision, b: &Revision) -> Ordering {
    a.version()
        .cmp(&b.version())
        .then_with(|| a.created_at().cmp(&b.created_at()))
        .then_with(|| b.labels().cmp(a.labels()))
        .then_with(|| b.content().cmp(a.content()))
}
