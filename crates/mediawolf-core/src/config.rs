//! MediaWolf configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MediaWolfError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaWolfConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

impl MediaWolfConfig {
    /// Load config from the default path (~/.mediawolf/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MediaWolfError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| MediaWolfError::Config(format!("Failed to parse config: {e}")))?;
        tracing::debug!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| MediaWolfError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the MediaWolf home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mediawolf")
    }
}

/// Task scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// JSON file holding the persisted task set.
    #[serde(default = "default_tasks_file")]
    pub tasks_file: PathBuf,
    /// How often the clock checks for due triggers.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Upper bound on actions executing at the same time.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

fn default_tasks_file() -> PathBuf {
    MediaWolfConfig::home_dir()
        .join("config")
        .join("tasks_config.json")
}
fn default_tick_interval_ms() -> u64 { 1000 }
fn default_max_concurrent_runs() -> usize { 4 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tasks_file: default_tasks_file(),
            tick_interval_ms: default_tick_interval_ms(),
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

/// HTTP/WebSocket gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 5000 }
fn default_host() -> String { "0.0.0.0".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Media manager connections. A missing section means the service is not configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub radarr: Option<ArrConfig>,
    #[serde(default)]
    pub sonarr: Option<ArrConfig>,
    #[serde(default)]
    pub lidarr: Option<ArrConfig>,
    #[serde(default)]
    pub readarr: Option<ArrConfig>,
}

/// Connection details for a Radarr/Sonarr/Lidarr/Readarr instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrConfig {
    pub url: String,
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 120 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: MediaWolfConfig = toml::from_str("").unwrap();
        assert_eq!(config.gateway.port, 5000);
        assert_eq!(config.scheduler.tick_interval_ms, 1000);
        assert_eq!(config.scheduler.max_concurrent_runs, 4);
        assert!(config.scheduler.tasks_file.ends_with("tasks_config.json"));
        assert!(config.services.radarr.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config: MediaWolfConfig = toml::from_str(
            r#"
            [scheduler]
            tasks_file = "/data/tasks.json"

            [services.radarr]
            url = "http://radarr:7878"
            api_key = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.tasks_file, PathBuf::from("/data/tasks.json"));
        assert_eq!(config.scheduler.tick_interval_ms, 1000);
        let radarr = config.services.radarr.unwrap();
        assert_eq!(radarr.url, "http://radarr:7878");
        assert_eq!(radarr.timeout_secs, 120);
        assert!(config.services.lidarr.is_none());
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = MediaWolfConfig::default();
        config.gateway.port = 8080;
        config.save_to(&path).unwrap();

        let loaded = MediaWolfConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.port, 8080);
    }

    #[test]
    fn test_load_from_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway\nport = ").unwrap();
        let err = MediaWolfConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, MediaWolfError::Config(_)));
    }
}
