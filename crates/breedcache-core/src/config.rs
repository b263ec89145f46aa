//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! API endpoint and key, page size, search debounce window, cache staleness
//! and request timeout.
//!
//! Configuration is stored at `~/.config/breedcache/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "breedcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// SQLite catalog file name in the data directory
const DATABASE_FILE: &str = "catalog.db";

/// Preferences file name in the data directory
const PREFERENCES_FILE: &str = "preferences.json";

/// Environment variable that overrides the configured API key
pub const API_KEY_ENV: &str = "BREEDCACHE_API_KEY";

const DEFAULT_API_BASE_URL: &str = "https://api.thecatapi.com";

/// Breeds per list page. The Cat API serves 67 breeds, 10 per page keeps
/// the first screen quick.
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Debounce window for search keystrokes
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 1000;

/// Consider cached rows stale after 1 hour.
/// Breed data changes rarely; an hour keeps API calls low.
const DEFAULT_CACHE_STALE_MINUTES: i64 = 60;

/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub page_size: u32,
    pub search_debounce_ms: u64,
    pub cache_stale_minutes: i64,
    pub request_timeout_secs: u64,
    /// Directory for rolling log files; stderr only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
            cache_stale_minutes: DEFAULT_CACHE_STALE_MINUTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_key = Some(key.trim().to_string());
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(DATABASE_FILE))
    }

    pub fn preferences_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(PREFERENCES_FILE))
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cache_stale_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_from(&dir.path().join("missing.json")).expect("load");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"page_size": 25, "api_key": "k"}"#).expect("write");

        let config = Config::load_from(&path).expect("load");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.search_debounce_ms, DEFAULT_SEARCH_DEBOUNCE_MS);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = Config {
            cache_stale_minutes: 5,
            ..Config::default()
        };
        config.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded.cache_stale_minutes, 5);
        assert_eq!(loaded.cache_max_age(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{not json").expect("write");
        assert!(Config::load_from(&path).is_err());
    }
}
