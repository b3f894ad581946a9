//! Cache Layer
//!
//! TTL-memoizes `(name, constraint) -> revision` with single-flight refresh.
//!
//! A miss spawns one detached refresh task per key. Every concurrent caller
//! for that key awaits the same shared handle, so the loader sees exactly one
//! fetch. Because the task is detached, a caller that gives up (timeout or
//! cancellation) does not stop the refresh; the result is still cached for
//! the next caller.
//!
//! `invalidate(name)` bumps a per-name generation. A refresh that started
//! under an older generation still answers its own waiters but never writes
//! into the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::constraint::Constraint;
use crate::domain::Revision;
use crate::resolver::ResolveError;

/// Default time-to-live per entry
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

type SharedRefresh = Shared<BoxFuture<'static, Result<Arc<Revision>, ResolveError>>>;

/// Cache key: template name plus canonical constraint text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub selector: String,
}

impl CacheKey {
    pub fn new(name: &str, constraint: &Constraint) -> Self {
        Self {
            name: name.to_string(),
            selector: constraint.to_string(),
        }
    }
}

/// A cached resolution
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub revision: Arc<Revision>,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    inflight: HashMap<CacheKey, SharedRefresh>,
    generations: HashMap<String, u64>,
}

impl CacheState {
    fn generation(&self, name: &str) -> u64 {
        self.generations.get(name).copied().unwrap_or(0)
    }
}

/// Process-wide revision cache
#[derive(Clone)]
pub struct RevisionCache {
    catalog: Catalog,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl RevisionCache {
    pub fn new(catalog: Catalog) -> Self {
        Self::with_ttl(catalog, DEFAULT_TTL)
    }

    pub fn with_ttl(catalog: Catalog, ttl: Duration) -> Self {
        debug!(?ttl, "RevisionCache::with_ttl: called");
        Self {
            catalog,
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Return the cached revision for the key, refreshing it if absent or expired
    pub async fn get(&self, name: &str, constraint: &Constraint) -> Result<Arc<Revision>, ResolveError> {
        let key = CacheKey::new(name, constraint);
        debug!(name = %key.name, selector = %key.selector, "RevisionCache::get: called");

        let refresh = {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.entries.get(&key) {
                if entry.is_fresh(Instant::now()) {
                    debug!("RevisionCache::get: hit");
                    return Ok(Arc::clone(&entry.revision));
                }
                debug!("RevisionCache::get: expired");
            }

            match state.inflight.get(&key) {
                Some(refresh) => {
                    debug!("RevisionCache::get: joining in-flight refresh");
                    refresh.clone()
                }
                None => {
                    let generation = state.generation(name);
                    let refresh = self.spawn_refresh(key.clone(), constraint.clone(), generation);
                    state.inflight.insert(key, refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    fn spawn_refresh(&self, key: CacheKey, constraint: Constraint, generation: u64) -> SharedRefresh {
        debug!(name = %key.name, selector = %key.selector, %generation, "RevisionCache::spawn_refresh: called");
        let catalog = self.catalog.clone();
        let task_state = Arc::clone(&self.state);
        let ttl = self.ttl;

        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let key = task_key;
            let result = catalog.resolve(&key.name, &constraint).await;

            // The spawning caller still holds the lock while registering this task,
            // so the in-flight entry is always visible here.
            let mut state = task_state.lock().await;
            if state.generation(&key.name) != generation {
                debug!(name = %key.name, "RevisionCache: invalidated during refresh, not caching");
                return result;
            }
            state.inflight.remove(&key);
            if let Ok(revision) = &result {
                info!(name = %key.name, selector = %key.selector, version = %revision.version(), "Cache refreshed");
                state.entries.insert(
                    key,
                    CacheEntry {
                        revision: Arc::clone(revision),
                        fetched_at: Instant::now(),
                        ttl,
                    },
                );
            }
            result
        });

        let state = Arc::clone(&self.state);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    // The task died before it could clear its own in-flight entry
                    let mut state = state.lock().await;
                    if state.generation(&key.name) == generation {
                        state.inflight.remove(&key);
                    }
                    warn!(name = %key.name, selector = %key.selector, error = %e, "RevisionCache: refresh task aborted");
                    Err(ResolveError::Aborted(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Drop every entry for `name` and detach in-flight refreshes from the cache
    pub async fn invalidate(&self, name: &str) {
        let mut state = self.state.lock().await;
        *state.generations.entry(name.to_string()).or_insert(0) += 1;
        let before = state.entries.len();
        state.entries.retain(|key, _| key.name != name);
        state.inflight.retain(|key, _| key.name != name);
        info!(%name, dropped = before - state.entries.len(), "Cache invalidated");
    }

    /// Drop everything
    pub async fn invalidate_all(&self) {
        let mut state = self.state.lock().await;
        let names: Vec<String> = state
            .entries
            .keys()
            .chain(state.inflight.keys())
            .map(|k| k.name.clone())
            .collect();
        for name in names {
            *state.generations.entry(name).or_insert(0) += 1;
        }
        state.entries.clear();
        state.inflight.clear();
        info!("Cache cleared");
    }

    /// Number of cached entries, fresh or not
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
