//! Application configuration management.
//!
//! Configuration is stored at `~/.config/placecache/config.json`. Missing
//! fields fall back to defaults, and a couple of environment variables
//! override the file so deployments can point at a mirror of the API.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::{DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};
use crate::sync::synchronizer::{DEFAULT_FETCH_DELAY_MS, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_FLUSH_EVERY};
use crate::sync::SyncOptions;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "placecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides `api_base_url`
pub const ENV_API_URL: &str = "PLACECACHE_API_URL";

/// Overrides the cache directory
pub const ENV_CACHE_DIR: &str = "PLACECACHE_CACHE_DIR";

/// Consider the location cache stale after a week.
const DEFAULT_STALE_AFTER_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub stale_after_minutes: i64,
    pub flush_every: usize,
    pub fetch_delay_ms: u64,
    pub fetch_timeout_secs: u64,
    pub log_to_file: bool,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            stale_after_minutes: DEFAULT_STALE_AFTER_MINUTES,
            flush_every: DEFAULT_FLUSH_EVERY,
            fetch_delay_ms: DEFAULT_FETCH_DELAY_MS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            log_to_file: false,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Load from the default config path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from `lookup` (the process environment in practice).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Out-of-range values saturate to a TTL that never expires.
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.stale_after_minutes).unwrap_or(chrono::Duration::MAX)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            flush_every: self.flush_every.max(1),
            fetch_delay: Duration::from_millis(self.fetch_delay_ms),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sync_options().flush_every, 5);
        assert_eq!(config.sync_options().fetch_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"flush_every": 10, "log_to_file": true}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.flush_every, 10);
        assert!(config.log_to_file);
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            stale_after_minutes: 60,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            ENV_API_URL => Some("http://mirror.local".to_string()),
            ENV_CACHE_DIR => Some("/tmp/placecache-test".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://mirror.local");
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/placecache-test"));
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|_| Some(String::new()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_zero_flush_every_is_clamped() {
        let config = Config {
            flush_every: 0,
            ..Default::default()
        };
        assert_eq!(config.sync_options().flush_every, 1);
        assert_eq!(config.stale_after(), chrono::Duration::days(7));
    }

    #[test]
    fn test_huge_stale_after_saturates() {
        let config = Config {
            stale_after_minutes: i64::MAX,
            ..Default::default()
        };
        assert_eq!(config.stale_after(), chrono::Duration::MAX);
    }
}
