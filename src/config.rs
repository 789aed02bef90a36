//! Engine configuration.
//!
//! [`EngineConfig::load`] reads `config/labstock.toml` (optional) and
//! `LABSTOCK__*` environment variables, e.g. `LABSTOCK__STORE__MAX_RETRIES=5`.
//! Every key has a default, so an empty environment yields a usable config.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config/labstock.toml";

/// Connection and store tuning.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StoreSettings {
    /// Total connection attempts when the store reports busy/locked.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `n * unit` before the next try.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// SQLite busy handler timeout applied to every connection.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `PRAGMA cache_size` value (pages when positive).
    #[serde(default = "default_cache_size_pages")]
    pub cache_size_pages: i64,
    /// JSON registry listing the named store files.
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_busy_timeout_ms() -> u64 {
    10_000
}

fn default_cache_size_pages() -> i64 {
    10_000
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("config.json")
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            cache_size_pages: default_cache_size_pages(),
            registry_path: default_registry_path(),
        }
    }
}

impl StoreSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreSettings,
}

impl EngineConfig {
    /// Load from [`DEFAULT_CONFIG_FILE`], falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from the given TOML file (optional) layered under `LABSTOCK__*` env vars.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env_source());

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // Unreadable or malformed file: keep going on env alone
                if path.exists() {
                    log::warn!(
                        "failed to load config file {}, falling back to env: {}",
                        path.display(),
                        err
                    );
                }
                Config::builder()
                    .add_source(env_source())
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        settings.try_deserialize::<EngineConfig>().map_err(|e| {
            ConfigError::Message(format!(
                "Store configuration could not be loaded from file or environment: {}",
                e
            ))
        })
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("LABSTOCK")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_match_store_tuning() {
        let settings = StoreSettings::default();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_backoff(), Duration::from_millis(100));
        assert_eq!(settings.busy_timeout(), Duration::from_secs(10));
        assert_eq!(settings.cache_size_pages, 10_000);
        assert_eq!(settings.registry_path, PathBuf::from("config.json"));
    }

    #[test]
    fn test_load_from_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("labstock.toml");
        fs::write(&path, "[store]\nmax_retries = 5\nretry_backoff_ms = 20\n").expect("write config");

        let config = EngineConfig::load_from(&path).expect("load config");
        assert_eq!(config.store.max_retries, 5);
        assert_eq!(config.store.retry_backoff_ms, 20);
        assert_eq!(config.store.busy_timeout_ms, 10_000);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig::load_from(dir.path().join("absent.toml")).expect("load config");
        assert_eq!(config.store.cache_size_pages, 10_000);
    }
}
