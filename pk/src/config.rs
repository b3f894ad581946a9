//! PromptKeep configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Revision cache settings
    pub cache: CacheConfig,

    /// Fallback controller settings
    pub fallback: FallbackConfig,

    /// Trace recording settings
    pub recording: RecordingConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// 1. explicit path (errors are returned)
    /// 2. `./.promptkeep.yml`
    /// 3. `<config_dir>/promptkeep/promptkeep.yml`
    /// 4. defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".promptkeep.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("promptkeep").join("promptkeep.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Revision cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live per entry in milliseconds
    #[serde(rename = "ttl-ms")]
    pub ttl_ms: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: 60_000 }
    }
}

/// Fallback controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Upper bound on a primary resolution, in milliseconds
    #[serde(rename = "primary-timeout-ms")]
    pub primary_timeout_ms: u64,

    /// Directory for persisted previous-prod state; in-memory only when unset
    #[serde(rename = "state-dir")]
    pub state_dir: Option<PathBuf>,

    /// Label that marks a revision as production
    #[serde(rename = "prod-label")]
    pub prod_label: String,
}

impl FallbackConfig {
    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            primary_timeout_ms: 5_000,
            state_dir: None,
            prod_label: "prod".to_string(),
        }
    }
}

/// Trace recording settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Record model-client traffic for later replay
    pub enabled: bool,

    /// Directory for `rollout-*.jsonl` files
    pub dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".promptkeep")
            .join("sessions");
        Self { enabled: false, dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
        assert_eq!(config.fallback.primary_timeout(), Duration::from_secs(5));
        assert_eq!(config.fallback.prod_label, "prod");
        assert!(config.fallback.state_dir.is_none());
        assert!(!config.recording.enabled);
        assert!(config.recording.dir.ends_with("sessions"));
    }

    #[test]
    fn test_load_explicit_file_partial_overrides() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("promptkeep.yml");
        fs::write(
            &path,
            "cache:\n  ttl-ms: 1500\nfallback:\n  prod-label: live\n  state-dir: /var/lib/pk\nlog-level: debug\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.cache.ttl(), Duration::from_millis(1500));
        assert_eq!(config.fallback.prod_label, "live");
        assert_eq!(config.fallback.primary_timeout_ms, 5_000);
        assert_eq!(config.fallback.state_dir, Some(PathBuf::from("/var/lib/pk")));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_explicit_missing_file_errors() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nope.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_explicit_malformed_file_errors() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.yml");
        fs::write(&path, "cache: [1, 2").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
