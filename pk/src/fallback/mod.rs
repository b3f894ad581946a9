//! Fallback Controller
//!
//! Three-tier degradation path (primary, previous prod, minimal) that always
//! yields a renderable result.

mod controller;
mod state;
mod tier;

pub use controller::{
    DEFAULT_PRIMARY_TIMEOUT, DEFAULT_PROD_LABEL, FallbackController, FallbackError, Resolution, ResolveRequest,
    TierFailure,
};
pub use state::FallbackState;
pub use tier::Tier;
