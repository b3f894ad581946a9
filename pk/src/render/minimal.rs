//! Built-in minimal revision
//!
//! The last fallback tier. Compiled into the binary, variable free, and
//! renderable by the built-in renderer without any input.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::constraint::Version;
use crate::domain::Revision;

/// Name carried by the minimal revision
pub const MINIMAL_NAME: &str = "__minimal__";

/// Label carried by the minimal revision
pub const MINIMAL_LABEL: &str = "minimal";

/// Raw template of the minimal revision
pub const MINIMAL_TEMPLATE: &str = include_str!("../../prompts/minimal.yml");

static MINIMAL: LazyLock<Arc<Revision>> = LazyLock::new(|| {
    Arc::new(
        Revision::new(MINIMAL_NAME, Version::new(0, 0, 0), MINIMAL_TEMPLATE)
            .with_label(MINIMAL_LABEL)
            .with_created_at(DateTime::<Utc>::UNIX_EPOCH),
    )
});

/// The shared minimal revision
pub fn minimal_revision() -> Arc<Revision> {
    debug!("minimal_revision: called");
    Arc::clone(&MINIMAL)
}
