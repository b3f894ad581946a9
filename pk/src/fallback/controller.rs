//! Fallback Controller
//!
//! Drives a request through the tiers until one produces rendered messages:
//!
//! ```text
//!   Primary ──fail──> PreviousProd ──fail──> Minimal
//!      │                   │                    │
//!    render              render              render (cannot fail
//!                                            unless misconfigured)
//! ```
//!
//! Every attempt, successful or not, is reported as a
//! [`TelemetryEvent::FallbackStage`]. Callers only ever see an error when the
//! built-in minimal revision itself cannot be rendered.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::state::FallbackState;
use super::tier::Tier;
use crate::cache::RevisionCache;
use crate::constraint::{Constraint, ConstraintError, Selector, name_of};
use crate::domain::{Message, Revision, Variables};
use crate::events::{TelemetryEvent, TelemetrySink};
use crate::render::{RenderError, Renderer, minimal_revision};
use crate::resolver::ResolveError;

/// Default upper bound on a primary resolution
pub const DEFAULT_PRIMARY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default label that marks production revisions
pub const DEFAULT_PROD_LABEL: &str = "prod";

/// The only resolution error a caller can observe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackError {
    /// The built-in minimal revision did not render; a configuration bug
    #[error("minimal tier failed: {0}")]
    MinimalTierFailed(String),
}

/// One request to resolve and render
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub name: String,
    /// Parse errors are kept so the primary tier can fail on them and the
    /// lower tiers can still serve the name
    pub constraint: Result<Constraint, ConstraintError>,
    pub variables: Variables,
}

impl ResolveRequest {
    pub fn new(name: impl Into<String>, constraint: Constraint, variables: Variables) -> Self {
        Self {
            name: name.into(),
            constraint: Ok(constraint),
            variables,
        }
    }

    /// Build a request from selector text such as `greet@^1#prod`
    pub fn parse(selector: &str, variables: Variables) -> Self {
        debug!(%selector, "ResolveRequest::parse: called");
        match Selector::parse(selector) {
            Ok(selector) => Self::new(selector.name, selector.constraint, variables),
            Err(e) => {
                debug!(error = %e, "ResolveRequest::parse: keeping syntax error for primary tier");
                Self {
                    name: name_of(selector).to_string(),
                    constraint: Err(e),
                    variables,
                }
            }
        }
    }

    /// Additionally require `label` on the primary revision
    pub fn require_label(mut self, label: impl Into<String>) -> Self {
        self.constraint = self.constraint.map(|c| c.and_label(label));
        self
    }
}

/// Why one tier did not produce a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierFailure {
    pub tier: Tier,
    pub reason: String,
}

/// Outcome of a resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Tier that produced the messages
    pub tier: Tier,
    pub revision: Arc<Revision>,
    pub messages: Vec<Message>,
    /// Failures of the tiers tried before `tier`, in order
    pub failures: Vec<TierFailure>,
}

impl Resolution {
    pub fn is_degraded(&self) -> bool {
        self.tier != Tier::Primary
    }
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("no previous prod revision recorded")]
    NoPreviousProd,
}

/// A failed step, with the revision it got as far as (if any)
struct StepFailure {
    revision: Option<Arc<Revision>>,
    error: StepError,
}

impl StepFailure {
    fn before_revision(error: impl Into<StepError>) -> Self {
        Self {
            revision: None,
            error: error.into(),
        }
    }

    fn at(revision: Arc<Revision>, error: impl Into<StepError>) -> Self {
        Self {
            revision: Some(revision),
            error: error.into(),
        }
    }
}

type StepResult = Result<(Arc<Revision>, Vec<Message>), StepFailure>;

/// Three-tier resolution with guaranteed output
pub struct FallbackController {
    cache: RevisionCache,
    state: Arc<FallbackState>,
    renderer: Arc<dyn Renderer>,
    telemetry: Arc<dyn TelemetrySink>,
    primary_timeout: Duration,
    prod_label: String,
    minimal: Arc<Revision>,
}

impl FallbackController {
    pub fn new(cache: RevisionCache, renderer: Arc<dyn Renderer>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        debug!("FallbackController::new: called");
        Self {
            cache,
            state: Arc::new(FallbackState::new()),
            renderer,
            telemetry,
            primary_timeout: DEFAULT_PRIMARY_TIMEOUT,
            prod_label: DEFAULT_PROD_LABEL.to_string(),
            minimal: minimal_revision(),
        }
    }

    pub fn with_state(mut self, state: Arc<FallbackState>) -> Self {
        self.state = state;
        self
    }

    pub fn with_primary_timeout(mut self, timeout: Duration) -> Self {
        self.primary_timeout = timeout;
        self
    }

    pub fn with_prod_label(mut self, label: impl Into<String>) -> Self {
        self.prod_label = label.into();
        self
    }

    /// Replace the built-in minimal revision
    pub fn with_minimal(mut self, minimal: Arc<Revision>) -> Self {
        self.minimal = minimal;
        self
    }

    pub fn cache(&self) -> &RevisionCache {
        &self.cache
    }

    pub fn state(&self) -> &Arc<FallbackState> {
        &self.state
    }

    pub fn prod_label(&self) -> &str {
        &self.prod_label
    }

    /// Drop cached resolutions for `name`; the previous-prod record is kept
    pub async fn invalidate(&self, name: &str) {
        debug!(%name, "FallbackController::invalidate: called");
        self.cache.invalidate(name).await;
    }

    /// Resolve and render, escalating through the tiers as needed
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<Resolution, FallbackError> {
        debug!(name = %request.name, "FallbackController::resolve: called");
        let mut failures = Vec::new();
        let mut tier = Tier::START;

        loop {
            let started = Instant::now();
            let outcome = match tier {
                Tier::Primary => self.try_primary(request).await,
                Tier::PreviousProd => self.try_previous_prod(request).await,
                Tier::Minimal => self.try_minimal().await,
            };
            let latency = started.elapsed();

            match outcome {
                Ok((revision, messages)) => {
                    self.emit_stage(tier, request, Some(&revision), latency, None);
                    if tier != Tier::Primary {
                        info!(name = %request.name, %tier, version = %revision.version(), "FallbackController: served degraded revision");
                    }
                    return Ok(Resolution {
                        tier,
                        revision,
                        messages,
                        failures,
                    });
                }
                Err(failure) => {
                    let reason = failure.error.to_string();
                    self.emit_stage(tier, request, failure.revision.as_ref(), latency, Some(reason.clone()));
                    failures.push(TierFailure {
                        tier,
                        reason: reason.clone(),
                    });

                    match tier.next() {
                        Some(next) => {
                            warn!(name = %request.name, %tier, %next, %reason, "FallbackController: escalating");
                            tier = next;
                        }
                        None => {
                            error!(name = %request.name, %reason, "FallbackController: minimal revision failed to render");
                            return Err(FallbackError::MinimalTierFailed(reason));
                        }
                    }
                }
            }
        }
    }

    async fn try_primary(&self, request: &ResolveRequest) -> StepResult {
        debug!(name = %request.name, "FallbackController::try_primary: called");
        let constraint = request
            .constraint
            .clone()
            .map_err(|e| StepFailure::before_revision(ResolveError::from(e)))?;

        let revision = match tokio::time::timeout(self.primary_timeout, self.cache.get(&request.name, &constraint)).await {
            Ok(Ok(revision)) => revision,
            Ok(Err(e)) => return Err(StepFailure::before_revision(e)),
            Err(_) => return Err(StepFailure::before_revision(ResolveError::Timeout(self.primary_timeout))),
        };

        let messages = match self.render(&revision, &request.variables).await {
            Ok(messages) => messages,
            Err(e) => return Err(StepFailure::at(revision, e)),
        };

        // Only a revision that rendered becomes last-known-good
        if revision.has_label(&self.prod_label) {
            self.state.record_prod(&request.name, Arc::clone(&revision)).await;
        }
        Ok((revision, messages))
    }

    async fn try_previous_prod(&self, request: &ResolveRequest) -> StepResult {
        debug!(name = %request.name, "FallbackController::try_previous_prod: called");
        let Some(revision) = self.state.get(&request.name).await else {
            return Err(StepFailure::before_revision(StepError::NoPreviousProd));
        };

        match self.render(&revision, &request.variables).await {
            Ok(messages) => Ok((revision, messages)),
            Err(e) => Err(StepFailure::at(revision, e)),
        }
    }

    async fn try_minimal(&self) -> StepResult {
        debug!("FallbackController::try_minimal: called");
        let revision = Arc::clone(&self.minimal);
        match self.render(&revision, &Variables::new()).await {
            Ok(messages) => Ok((revision, messages)),
            Err(e) => Err(StepFailure::at(revision, e)),
        }
    }

    async fn render(&self, revision: &Revision, variables: &Variables) -> Result<Vec<Message>, RenderError> {
        let missing = revision.missing_variables(variables);
        if !missing.is_empty() {
            return Err(RenderError::MissingVariable(missing));
        }
        self.renderer.render(revision.content(), variables).await
    }

    fn emit_stage(
        &self,
        stage: Tier,
        request: &ResolveRequest,
        revision: Option<&Arc<Revision>>,
        latency: Duration,
        error: Option<String>,
    ) {
        let label = match revision {
            Some(revision) if !revision.labels().is_empty() => {
                Some(revision.labels().iter().cloned().collect::<Vec<_>>().join("+"))
            }
            Some(_) => None,
            None => request.constraint.as_ref().ok().and_then(|c| c.label()),
        };

        self.telemetry.emit(TelemetryEvent::FallbackStage {
            stage,
            name: request.name.clone(),
            version: revision.map(|r| r.version()),
            label,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            succeeded: error.is_none(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock::CountingLoader;
    use crate::catalog::{Catalog, LoaderError};
    use crate::constraint::Version;
    use crate::events::mock::RecordingSink;
    use crate::render::HandlebarsRenderer;
    use crate::render::minimal::MINIMAL_NAME;
    use serde_json::json;
    use tempfile::tempdir;

    const GREETING: &str = "messages:\n  - role: user\n    content: \"Hello {{name}}\"\n";
    const PLAIN: &str = "messages:\n  - role: system\n    content: Be brief.\n";

    struct Harness {
        loader: Arc<CountingLoader>,
        sink: Arc<RecordingSink>,
        controller: FallbackController,
    }

    fn harness(revisions: Vec<Revision>, state: Arc<FallbackState>) -> Harness {
        let loader = Arc::new(CountingLoader::new(revisions));
        let sink = Arc::new(RecordingSink::new());
        let cache = RevisionCache::new(Catalog::new(loader.clone()));
        let controller =
            FallbackController::new(cache, Arc::new(HandlebarsRenderer::new()), sink.clone()).with_state(state);
        Harness {
            loader,
            sink,
            controller,
        }
    }

    fn vars(value: serde_json::Value) -> Variables {
        value.as_object().cloned().unwrap_or_default()
    }

    fn stages(sink: &RecordingSink) -> Vec<(Tier, bool)> {
        sink.events()
            .into_iter()
            .filter_map(|event| match event {
                TelemetryEvent::FallbackStage { stage, succeeded, .. } => Some((stage, succeeded)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_primary_success_records_prod() {
        let h = harness(
            vec![Revision::new("greet", Version::new(1, 2, 0), GREETING).with_label("prod")],
            Arc::new(FallbackState::new()),
        );

        let resolution = h
            .controller
            .resolve(&ResolveRequest::parse("greet@^1#prod", vars(json!({"name": "Ada"}))))
            .await
            .unwrap();

        assert_eq!(resolution.tier, Tier::Primary);
        assert!(!resolution.is_degraded());
        assert_eq!(resolution.messages, vec![Message::user("Hello Ada")]);
        assert!(resolution.failures.is_empty());
        assert_eq!(
            h.controller.state().get("greet").await.unwrap().version(),
            Version::new(1, 2, 0)
        );
        assert_eq!(stages(&h.sink), vec![(Tier::Primary, true)]);
    }

    #[tokio::test]
    async fn test_non_prod_revision_is_not_recorded() {
        let h = harness(
            vec![Revision::new("greet", Version::new(1, 0, 0), PLAIN).with_label("canary")],
            Arc::new(FallbackState::new()),
        );
        h.controller
            .resolve(&ResolveRequest::parse("greet#canary", Variables::new()))
            .await
            .unwrap();
        assert!(h.controller.state().is_empty().await);
    }

    #[tokio::test]
    async fn test_loader_outage_serves_previous_prod() {
        let h = harness(
            vec![Revision::new("greet", Version::new(1, 2, 0), GREETING).with_label("prod")],
            Arc::new(FallbackState::new()),
        );
        let request = ResolveRequest::parse("greet#prod", vars(json!({"name": "Ada"})));
        h.controller.resolve(&request).await.unwrap();

        h.loader
            .fail_with(Some(LoaderError::Transient("registry down".to_string())))
            .await;
        h.controller.invalidate("greet").await;

        let resolution = h.controller.resolve(&request).await.unwrap();
        assert_eq!(resolution.tier, Tier::PreviousProd);
        assert_eq!(resolution.revision, h.controller.state().get("greet").await.unwrap());
        assert_eq!(resolution.messages, vec![Message::user("Hello Ada")]);
        assert_eq!(resolution.failures.len(), 1);
        assert_eq!(resolution.failures[0].tier, Tier::Primary);

        let events = h.sink.events();
        let Some(TelemetryEvent::FallbackStage {
            stage,
            version,
            succeeded,
            ..
        }) = events.last()
        else {
            panic!("expected a fallback stage event");
        };
        assert_eq!(*stage, Tier::PreviousProd);
        assert_eq!(*version, Some(Version::new(1, 2, 0)));
        assert!(*succeeded);
    }

    #[tokio::test]
    async fn test_missing_variable_escalates_to_previous_prod() {
        let h = harness(
            vec![Revision::new("greet", Version::new(1, 0, 0), PLAIN).with_label("prod")],
            Arc::new(FallbackState::new()),
        );
        h.controller
            .resolve(&ResolveRequest::parse("greet#prod", Variables::new()))
            .await
            .unwrap();

        h.loader
            .publish(
                Revision::new("greet", Version::new(2, 0, 0), GREETING)
                    .with_label("prod")
                    .with_required_variables(["name"]),
            )
            .await;

        let resolution = h
            .controller
            .resolve(&ResolveRequest::parse("greet@2.0", Variables::new()))
            .await
            .unwrap();
        assert_eq!(resolution.tier, Tier::PreviousProd);
        assert_eq!(resolution.revision.version(), Version::new(1, 0, 0));
        assert!(resolution.failures[0].reason.contains("name"));
        assert_eq!(
            h.controller.state().get("greet").await.unwrap().version(),
            Version::new(1, 0, 0)
        );
    }

    #[tokio::test]
    async fn test_unrenderable_prod_does_not_replace_previous_prod() {
        let h = harness(
            vec![Revision::new("greet", Version::new(1, 0, 0), PLAIN).with_label("prod")],
            Arc::new(FallbackState::new()),
        );
        let request = ResolveRequest::parse("greet#prod", Variables::new());
        h.controller.resolve(&request).await.unwrap();

        h.loader
            .publish(Revision::new("greet", Version::new(1, 1, 0), "messages: [").with_label("prod"))
            .await;
        h.controller.invalidate("greet").await;

        for _ in 0..2 {
            let resolution = h.controller.resolve(&request).await.unwrap();
            assert_eq!(resolution.tier, Tier::PreviousProd);
            assert_eq!(resolution.revision.version(), Version::new(1, 0, 0));
            assert_eq!(resolution.failures.len(), 1);
        }
        assert_eq!(
            h.controller.state().get("greet").await.unwrap().version(),
            Version::new(1, 0, 0)
        );
    }

    #[tokio::test]
    async fn test_syntax_error_still_serves_previous_prod() {
        let h = harness(
            vec![Revision::new("greet", Version::new(1, 0, 0), PLAIN).with_label("prod")],
            Arc::new(FallbackState::new()),
        );
        h.controller
            .resolve(&ResolveRequest::parse("greet#prod", Variables::new()))
            .await
            .unwrap();
        let calls = h.loader.calls();

        let resolution = h
            .controller
            .resolve(&ResolveRequest::parse("greet@>>1", Variables::new()))
            .await
            .unwrap();
        assert_eq!(resolution.tier, Tier::PreviousProd);
        assert!(resolution.failures[0].reason.contains("syntax"));
        assert_eq!(h.loader.calls(), calls);
    }

    #[tokio::test]
    async fn test_unknown_name_reaches_minimal() {
        let h = harness(vec![], Arc::new(FallbackState::new()));
        let resolution = h
            .controller
            .resolve(&ResolveRequest::parse("nobody", vars(json!({"x": 1}))))
            .await
            .unwrap();

        assert_eq!(resolution.tier, Tier::Minimal);
        assert_eq!(resolution.revision.name(), MINIMAL_NAME);
        assert_eq!(resolution.messages.len(), 1);
        assert_eq!(resolution.failures.len(), 2);
        assert_eq!(
            stages(&h.sink),
            vec![(Tier::Primary, false), (Tier::PreviousProd, false), (Tier::Minimal, true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_primary_times_out() {
        let loader = Arc::new(
            CountingLoader::new([Revision::new("greet", Version::new(1, 0, 0), PLAIN)])
                .with_delay(Duration::from_secs(30)),
        );
        let cache = RevisionCache::new(Catalog::new(loader));
        let sink = Arc::new(RecordingSink::new());
        let controller = FallbackController::new(cache, Arc::new(HandlebarsRenderer::new()), sink)
            .with_primary_timeout(Duration::from_millis(200));

        let resolution = controller
            .resolve(&ResolveRequest::parse("greet", Variables::new()))
            .await
            .unwrap();
        assert_eq!(resolution.tier, Tier::Minimal);
        assert!(resolution.failures[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_broken_minimal_is_fatal() {
        let h = harness(vec![], Arc::new(FallbackState::new()));
        let controller = h
            .controller
            .with_minimal(Arc::new(Revision::new(MINIMAL_NAME, Version::new(0, 0, 0), "not: [valid")));

        let err = controller
            .resolve(&ResolveRequest::parse("greet", Variables::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, FallbackError::MinimalTierFailed(_)));
    }

    #[tokio::test]
    async fn test_previous_prod_survives_restart() {
        let temp = tempdir().unwrap();
        let revision = Revision::new("greet", Version::new(3, 1, 0), PLAIN).with_label("prod");

        let h = harness(vec![revision], Arc::new(FallbackState::persistent(temp.path())));
        h.controller
            .resolve(&ResolveRequest::parse("greet#prod", Variables::new()))
            .await
            .unwrap();

        // New process, empty catalog
        let h = harness(vec![], Arc::new(FallbackState::persistent(temp.path())));
        let resolution = h
            .controller
            .resolve(&ResolveRequest::parse("greet#prod", Variables::new()))
            .await
            .unwrap();
        assert_eq!(resolution.tier, Tier::PreviousProd);
        assert_eq!(resolution.revision.version(), Version::new(3, 1, 0));
    }

    #[test]
    fn test_require_label_extends_constraint() {
        let request = ResolveRequest::parse("greet@^1", Variables::new()).require_label("treatment");
        assert_eq!(request.constraint.unwrap().to_string(), "^1#treatment");

        let broken = ResolveRequest::parse("greet@!", Variables::new()).require_label("treatment");
        assert_eq!(broken.name, "greet");
        assert!(broken.constraint.is_err());
    }
}
