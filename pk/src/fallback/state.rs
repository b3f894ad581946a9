//! Previous-prod state
//!
//! Remembers, per template name, the last revision the primary tier served
//! under the prod label. Optionally mirrored to `<dir>/previous_prod.json` so
//! the record survives a restart. The file is replaced atomically (write to a
//! temp file, then rename); persistence failures are logged and otherwise
//! ignored.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::Revision;

const STATE_FILE_NAME: &str = "previous_prod.json";

/// Per-process previous-prod map
#[derive(Debug, Default)]
pub struct FallbackState {
    previous_prod: RwLock<HashMap<String, Arc<Revision>>>,
    persist_path: Option<PathBuf>,
    /// Serializes file writes; never held together with the map lock
    persist_lock: Mutex<()>,
}

impl FallbackState {
    /// In-memory state with nothing recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// State mirrored to `<dir>/previous_prod.json`, loading what is already there
    pub fn persistent(dir: impl AsRef<Path>) -> Self {
        let persist_path = dir.as_ref().join(STATE_FILE_NAME);
        debug!(?persist_path, "FallbackState::persistent: called");

        let map = match load_file(&persist_path) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %persist_path.display(), error = %e, "FallbackState: ignoring unreadable state file");
                HashMap::new()
            }
        };
        if !map.is_empty() {
            info!(count = map.len(), "FallbackState: restored previous-prod revisions");
        }

        Self {
            previous_prod: RwLock::new(map),
            persist_path: Some(persist_path),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_path.as_deref()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Revision>> {
        self.previous_prod.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.previous_prod.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.previous_prod.read().await.is_empty()
    }

    /// Record `revision` as the last prod revision served for `name`
    pub async fn record_prod(&self, name: &str, revision: Arc<Revision>) {
        debug!(%name, version = %revision.version(), "FallbackState::record_prod: called");
        {
            let mut map = self.previous_prod.write().await;
            if map.get(name).is_some_and(|current| current == &revision) {
                return;
            }
            map.insert(name.to_string(), revision);
        }

        if let Some(path) = &self.persist_path {
            // Snapshot after taking the persist lock so the last write carries every update
            let _persisting = self.persist_lock.lock().await;
            let snapshot = self.previous_prod.read().await.clone();
            if let Err(e) = write_file(path, &snapshot).await {
                warn!(path = %path.display(), error = %e, "FallbackState: failed to persist previous-prod state");
            }
        }
    }
}

fn load_file(path: &Path) -> Result<HashMap<String, Arc<Revision>>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path).context("Failed to read state file")?;
    let map: HashMap<String, Revision> = serde_json::from_str(&content).context("Failed to parse state file")?;
    Ok(map.into_iter().map(|(name, rev)| (name, Arc::new(rev))).collect())
}

async fn write_file(path: &Path, map: &HashMap<String, Arc<Revision>>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(map)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), "FallbackState: state persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Version;
    use std::time::Duration;
    use tempfile::tempdir;

    fn prod(version: Version) -> Arc<Revision> {
        Arc::new(Revision::new("greet", version, "messages: []").with_label("prod"))
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let state = FallbackState::new();
        assert!(state.get("greet").await.is_none());

        state.record_prod("greet", prod(Version::new(1, 0, 0))).await;
        state.record_prod("greet", prod(Version::new(1, 1, 0))).await;

        assert_eq!(state.get("greet").await.unwrap().version(), Version::new(1, 1, 0));
        assert_eq!(state.len().await, 1);
    }

    #[tokio::test]
    async fn test_persisted_state_survives_restart() {
        let temp = tempdir().unwrap();
        let revision = prod(Version::new(2, 3, 4));
        {
            let state = FallbackState::persistent(temp.path());
            state.record_prod("greet", Arc::clone(&revision)).await;
            assert!(state.persist_path().unwrap().exists());
        }

        let restored = FallbackState::persistent(temp.path());
        assert_eq!(restored.get("greet").await, Some(revision));
    }

    #[tokio::test]
    async fn test_corrupt_state_file_starts_empty() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(STATE_FILE_NAME), "{not json").unwrap();

        let state = FallbackState::persistent(temp.path());
        assert!(state.is_empty().await);

        // Still writable afterwards
        state.record_prod("greet", prod(Version::new(1, 0, 0))).await;
        let restored = FallbackState::persistent(temp.path());
        assert_eq!(restored.len().await, 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_on_persistence() {
        let temp = tempdir().unwrap();
        let state = Arc::new(FallbackState::persistent(temp.path()));

        // Hold the file side so the write cannot complete
        let persisting = state.persist_lock.lock().await;
        let task = tokio::spawn({
            let state = Arc::clone(&state);
            async move { state.record_prod("greet", prod(Version::new(3, 0, 0))).await }
        });

        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(revision) = state.get("greet").await {
                    return revision;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("read blocked behind the pending write");
        assert_eq!(seen.version(), Version::new(3, 0, 0));
        assert!(!state.persist_path().unwrap().exists());

        drop(persisting);
        task.await.unwrap();
        let restored = FallbackState::persistent(temp.path());
        assert_eq!(restored.get("greet").await.unwrap().version(), Version::new(3, 0, 0));
    }

    #[tokio::test]
    async fn test_concurrent_records_persist_the_final_map() {
        let temp = tempdir().unwrap();
        let state = Arc::new(FallbackState::persistent(temp.path()));

        let mut handles = Vec::new();
        for (i, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
            let state = Arc::clone(&state);
            handles.push(tokio::spawn(async move {
                let revision = Arc::new(Revision::new(name, Version::new(1, i as u32, 0), "messages: []"));
                state.record_prod(name, revision).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let restored = FallbackState::persistent(temp.path());
        assert_eq!(restored.len().await, 4);
    }
}
