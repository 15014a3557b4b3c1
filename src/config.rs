use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, Result};

/// Environment variable that overrides the state directory.
pub const STATE_DIR_ENV: &str = "LOOPSCOPE_STATE_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub lock: LockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for persisted state. The loop store lives at
    /// `<state_dir>/research/loops.json`.
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("loopscope"),
        }
    }
}

impl StorageConfig {
    /// Resolve the effective state directory, honoring the env override.
    pub fn resolve_state_dir(&self) -> PathBuf {
        match std::env::var(STATE_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => self.state_dir.clone(),
        }
    }

    /// Path of the registry store document.
    pub fn store_path(&self) -> PathBuf {
        self.resolve_state_dir().join("research").join("loops.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Interval between acquisition attempts while the lock is contended.
    pub poll_interval_ms: u64,
    /// Give up acquiring after this long and surface a lock timeout error.
    pub acquire_timeout_ms: u64,
    /// A lock file untouched for this long is considered abandoned.
    pub stale_after_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 25,
            acquire_timeout_ms: 10_000,
            stale_after_ms: 30_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            storage: StorageConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| RegistryError::Config(e.to_string()))?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lock_windows() {
        let lock = LockConfig::default();
        assert_eq!(lock.poll_interval_ms, 25);
        assert_eq!(lock.acquire_timeout_ms, 10_000);
        assert_eq!(lock.stale_after_ms, 30_000);
    }

    #[test]
    fn test_store_path_layout() {
        let storage = StorageConfig {
            state_dir: PathBuf::from("/tmp/scope-test"),
        };
        // No env override in effect for this dir unless the caller set one
        if std::env::var(STATE_DIR_ENV).is_err() {
            assert_eq!(storage.store_path(), PathBuf::from("/tmp/scope-test/research/loops.json"));
        }
    }

    #[test]
    fn test_config_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.lock.poll_interval_ms, config.lock.poll_interval_ms);
        assert_eq!(parsed.storage.state_dir, config.storage.state_dir);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("lock:\n  poll_interval_ms: 5\n").unwrap();
        assert_eq!(parsed.lock.poll_interval_ms, 5);
        assert_eq!(parsed.lock.acquire_timeout_ms, 10_000);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("loopscope.yml");
        fs::write(&path, "storage:\n  state_dir: /tmp/elsewhere\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.storage.state_dir, PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn test_load_from_bad_file_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("loopscope.yml");
        fs::write(&path, ": not yaml :::").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }
}
