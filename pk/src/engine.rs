//! PromptEngine - the caller-facing entry point
//!
//! Ties the pieces together: experiment assignment picks a variant label,
//! the fallback controller resolves and renders, and model clients handed
//! out by the engine are recorded when recording is enabled.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::RevisionCache;
use crate::catalog::{Catalog, Loader};
use crate::config::Config;
use crate::constraint::name_of;
use crate::domain::Variables;
use crate::events::TelemetrySink;
use crate::experiment::{ExperimentRegistry, StaticRegistry};
use crate::fallback::{FallbackController, FallbackError, FallbackState, Resolution, ResolveRequest};
use crate::render::{HandlebarsRenderer, Renderer};
use crate::replay::{ModelClient, TraceRecorder};

/// A request to format a prompt
#[derive(Debug, Clone, Default)]
pub struct FormatRequest {
    /// `name[@range][#labels]`
    pub selector: String,
    pub variables: Variables,
    /// Caller identity used for experiment bucketing
    pub identity: Option<String>,
}

impl FormatRequest {
    pub fn new(selector: impl Into<String>, variables: Variables) -> Self {
        Self {
            selector: selector.into(),
            variables,
            identity: None,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.identity = Some(user_id.into());
        self
    }
}

/// The experiment variant a caller was bucketed into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub experiment_id: String,
    pub variant: String,
}

/// Formatted prompt plus how it was obtained
#[derive(Debug, Clone)]
pub struct Formatted {
    pub resolution: Resolution,
    pub experiment: Option<Assignment>,
}

/// Resolution, rendering and experiment assignment behind one call
pub struct PromptEngine {
    controller: FallbackController,
    registry: Arc<dyn ExperimentRegistry>,
    recording_dir: Option<PathBuf>,
    session_id: String,
}

impl PromptEngine {
    pub fn new(controller: FallbackController) -> Self {
        debug!("PromptEngine::new: called");
        Self {
            controller,
            registry: Arc::new(StaticRegistry::new()),
            recording_dir: None,
            session_id: Uuid::now_v7().to_string(),
        }
    }

    /// Build the whole stack from configuration
    pub fn from_config(config: &Config, loader: Arc<dyn Loader>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        debug!(?config, "PromptEngine::from_config: called");
        let cache = RevisionCache::with_ttl(Catalog::new(loader), config.cache.ttl());
        let state = match &config.fallback.state_dir {
            Some(dir) => FallbackState::persistent(dir),
            None => FallbackState::new(),
        };
        let renderer: Arc<dyn Renderer> = Arc::new(HandlebarsRenderer::new());

        let controller = FallbackController::new(cache, renderer, telemetry)
            .with_state(Arc::new(state))
            .with_primary_timeout(config.fallback.primary_timeout())
            .with_prod_label(config.fallback.prod_label.clone());

        let mut engine = Self::new(controller);
        if config.recording.enabled {
            engine.recording_dir = Some(config.recording.dir.clone());
        }
        engine
    }

    pub fn with_registry(mut self, registry: Arc<dyn ExperimentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Record model traffic under `dir`
    pub fn with_recording(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recording_dir = Some(dir.into());
        self
    }

    pub fn controller(&self) -> &FallbackController {
        &self.controller
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Resolve and render a prompt, applying any experiment for the caller
    pub async fn format(&self, request: &FormatRequest) -> Result<Formatted, FallbackError> {
        debug!(selector = %request.selector, identity = ?request.identity, "PromptEngine::format: called");
        let name = name_of(&request.selector);
        let experiment = match &request.identity {
            Some(user_id) => self.assign(name, user_id).await,
            None => None,
        };

        let mut resolve = ResolveRequest::parse(&request.selector, request.variables.clone());
        if let Some(assignment) = &experiment {
            resolve = resolve.require_label(assignment.variant.clone());
        }

        let resolution = self.controller.resolve(&resolve).await?;
        Ok(Formatted { resolution, experiment })
    }

    async fn assign(&self, prompt: &str, user_id: &str) -> Option<Assignment> {
        let split = match self.registry.get_split(prompt, user_id).await {
            Ok(split) => split?,
            Err(e) => {
                warn!(%prompt, error = %e, "PromptEngine: experiment lookup failed, serving without variant");
                return None;
            }
        };
        let variant = split.assign(user_id)?.to_string();
        debug!(%prompt, experiment_id = %split.experiment_id, %variant, "PromptEngine::assign: bucketed");
        Some(Assignment {
            experiment_id: split.experiment_id,
            variant,
        })
    }

    /// Drop cached resolutions for `name`
    pub async fn invalidate(&self, name: &str) {
        self.controller.invalidate(name).await;
    }

    /// Wrap `client` for recording when recording is enabled
    pub fn model_client(&self, client: Arc<dyn ModelClient>) -> Arc<dyn ModelClient> {
        match &self.recording_dir {
            Some(dir) => Arc::new(TraceRecorder::new(client, self.session_id.clone(), dir)),
            None => client,
        }
    }
}
