//! PromptKeep - versioned prompt resolution and trace replay
//!
//! PromptKeep turns a selector such as `support_reply@^1#prod` into rendered
//! messages, and never leaves a caller without a prompt: when the catalog is
//! down, a constraint is broken, or a render fails, it serves the last known
//! production revision or a built-in minimal one.
//!
//! # Core Concepts
//!
//! - **Immutable revisions**: every published version of a template is frozen
//! - **Deterministic resolution**: same snapshot and constraint, same revision
//! - **Single-flight caching**: one loader fetch per key, however many callers
//! - **Guaranteed output**: primary, previous prod, minimal
//! - **Reproducible traces**: recorded model traffic can be replayed and patched
//!
//! # Modules
//!
//! - [`constraint`] - Selector and constraint parsing
//! - [`catalog`] - Loader boundary and catalog snapshots
//! - [`resolver`] - Best-match selection
//! - [`cache`] - TTL cache with single-flight refresh
//! - [`fallback`] - Three-tier fallback controller
//! - [`experiment`] - Deterministic variant bucketing
//! - [`replay`] - Trace recording and replay
//! - [`engine`] - Caller-facing facade
//! - [`config`] - Configuration types and loading

pub mod cache;
pub mod catalog;
pub mod config;
pub mod constraint;
pub mod domain;
pub mod engine;
pub mod events;
pub mod experiment;
pub mod fallback;
pub mod logging;
pub mod manifest;
pub mod render;
pub mod replay;
pub mod resolver;

pub use cache::RevisionCache;
pub use catalog::{Catalog, CatalogSnapshot, Loader, LoaderError, MemoryLoader};
pub use config::Config;
pub use constraint::{Constraint, ConstraintError, Selector, Version, VersionRange};
pub use domain::{Message, MessageKind, Revision, Role, Variables};
pub use engine::{Assignment, FormatRequest, Formatted, PromptEngine};
pub use events::{EventBus, NullSink, TelemetryEvent, TelemetrySink, TracingSink};
pub use experiment::{ExperimentRegistry, ExperimentSplit, StaticRegistry, bucket};
pub use fallback::{FallbackController, FallbackError, FallbackState, Resolution, ResolveRequest, Tier};
pub use manifest::{Manifest, ManifestIssue, check_manifest};
pub use render::{HandlebarsRenderer, RenderError, Renderer};
pub use replay::{ModelClient, ModelError, ReplayEngine, ReplayError, ReplayOptions, ReplayOutput, ReplayRow};
pub use resolver::{ResolveError, resolve};
