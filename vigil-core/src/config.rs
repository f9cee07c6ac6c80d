//! Configuration management.

use crate::error::{Result, VigilError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Prometheus `/metrics` port.
pub const DEFAULT_METRICS_PORT: u16 = 41002;

/// Persistent configuration for vigil.
///
/// Durations are stored in milliseconds so the JSON file stays readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_name: String,
    pub socket_dir: String,
    pub log_level: String,
    pub metrics_port: u16,
    pub max_requests_in_flight: usize,
    pub scrape_interval_ms: u64,
    pub collection_timeout_ms: u64,
    pub stats_max_age_ms: u64,
    pub polling_interval_ms: u64,
    pub poll_collection_timeout_ms: u64,
    pub socket_timeout_ms: u64,
    pub inventory_refresh_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            socket_dir: paths::socket_dir().to_string_lossy().to_string(),
            log_level: "info".to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            max_requests_in_flight: 3,
            scrape_interval_ms: 15_000,
            collection_timeout_ms: 10_000,
            // A bit more than the collection timeout
            stats_max_age_ms: 12_000,
            polling_interval_ms: 5_000,
            poll_collection_timeout_ms: 10_000,
            socket_timeout_ms: 5_000,
            inventory_refresh_ms: 5_000,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Load configuration from `path`, apply environment overrides and validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| VigilError::IoError { path: path.to_path_buf(), source: e })?;
            serde_json::from_str(&content).map_err(|e| VigilError::InvalidConfig {
                reason: format!("Failed to parse config {}: {}", path.display(), e),
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VigilError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| VigilError::InvalidConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content)
            .map_err(|e| VigilError::IoError { path: path.to_path_buf(), source: e })
    }

    /// Override file values with `VIGIL_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("VIGIL_SOCKET_DIR") {
            self.socket_dir = dir;
        }
        if let Ok(node) = std::env::var("VIGIL_NODE_NAME") {
            self.node_name = node;
        }
        if let Ok(level) = std::env::var("VIGIL_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Reject values the collectors cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests_in_flight == 0 {
            return Err(VigilError::InvalidConfig {
                reason: "max_requests_in_flight must be at least 1".to_string(),
            });
        }

        let durations = [
            ("scrape_interval_ms", self.scrape_interval_ms),
            ("collection_timeout_ms", self.collection_timeout_ms),
            ("stats_max_age_ms", self.stats_max_age_ms),
            ("polling_interval_ms", self.polling_interval_ms),
            ("poll_collection_timeout_ms", self.poll_collection_timeout_ms),
            ("socket_timeout_ms", self.socket_timeout_ms),
            ("inventory_refresh_ms", self.inventory_refresh_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(VigilError::InvalidConfig {
                    reason: format!("{} must be non-zero", name),
                });
            }
        }

        if self.socket_dir.is_empty() {
            return Err(VigilError::InvalidConfig { reason: "socket_dir is empty".to_string() });
        }

        Ok(())
    }

    /// Directory holding per-VM stats sockets.
    pub fn socket_dir(&self) -> PathBuf {
        PathBuf::from(&self.socket_dir)
    }

    /// Period of the domain stats collection loop.
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_millis(self.scrape_interval_ms)
    }

    /// Period of the inventory refresh loop.
    pub fn inventory_refresh(&self) -> Duration {
        Duration::from_millis(self.inventory_refresh_ms)
    }

    /// Collector tunables derived from this configuration.
    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            max_in_flight: self.max_requests_in_flight,
            collection_timeout: Duration::from_millis(self.collection_timeout_ms),
            stats_max_age: Duration::from_millis(self.stats_max_age_ms),
            polling_interval: Duration::from_millis(self.polling_interval_ms),
            poll_collection_timeout: Duration::from_millis(self.poll_collection_timeout_ms),
            socket_timeout: Duration::from_millis(self.socket_timeout_ms),
        }
    }
}

/// Runtime tunables shared by the concurrent collector and the poll queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    /// Max scrapes in flight during a batch collection
    pub max_in_flight: usize,
    /// Max time a batch collection makes its caller wait
    pub collection_timeout: Duration,
    /// Results older than this when they arrive are discarded
    pub stats_max_age: Duration,
    /// Tick period of a migration poll queue
    pub polling_interval: Duration,
    /// Max time a single poll tick waits for its scrape
    pub poll_collection_timeout: Duration,
    /// Connect and request timeout of the stats socket client
    pub socket_timeout: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Config::default().collector_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let settings = config.collector_settings();
        assert_eq!(settings.polling_interval, Duration::from_secs(5));
        assert_eq!(settings.poll_collection_timeout, Duration::from_secs(10));
        assert!(settings.stats_max_age > settings.collection_timeout);
    }

    #[test]
    fn test_zero_in_flight_rejected() {
        let config = Config { max_requests_in_flight: 0, ..Config::default() };
        assert!(matches!(config.validate(), Err(VigilError::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let config = Config { polling_interval_ms: 0, ..Config::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("polling_interval_ms"));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.max_requests_in_flight, 3);
    }

    #[test]
    fn test_save_and_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config { max_requests_in_flight: 7, ..Config::default() };
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.max_requests_in_flight, 7);

        // Missing keys fall back to defaults
        std::fs::write(&path, r#"{"collection_timeout_ms": 2500}"#).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.collector_settings().collection_timeout, Duration::from_millis(2500));
        assert_eq!(loaded.polling_interval_ms, 5_000);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(VigilError::InvalidConfig { .. })));
    }
}
