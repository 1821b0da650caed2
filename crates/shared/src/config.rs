//! Configuration management for the catalog workspace.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    pub data: DataConfig,

    /// Durable storage settings
    pub storage: StorageConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Jikan API settings
    pub api: ApiConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory path
    pub root_dir: String,
}

/// Durable storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file path (relative to data directory or absolute)
    pub path: String,

    /// Key holding the serialized wishlist
    pub wishlist_key: String,

    /// How often other processes' writes are polled for, in milliseconds
    pub sync_poll_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path (relative to data directory or absolute)
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Jikan API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Jikan API base URL
    pub base_url: String,

    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,

    /// User agent sent with every request
    pub user_agent: String,

    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,

    /// Retry settings for HTTP 429 responses
    pub retry: RetryConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum spacing between two dispatched requests in milliseconds
    pub min_interval_ms: u64,

    /// Optional ceiling on requests in any trailing 60 seconds
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retries after a rate-limited response
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after each retry
    pub backoff_multiplier: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                root_dir: "data".to_string(),
            },
            storage: StorageConfig {
                path: "catalog.db".to_string(),
                wishlist_key: "anime-manga-wishlist".to_string(),
                sync_poll_interval_ms: 500,
            },
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: true,
                file: true,
                json_format: false,
            },
            api: ApiConfig {
                base_url: "https://api.jikan.moe/v4".to_string(),
                timeout_seconds: 30,
                user_agent: format!("anime-catalog/{}", env!("CARGO_PKG_VERSION")),
                rate_limit: RateLimitConfig {
                    min_interval_ms: 1000,
                    requests_per_minute: Some(60),
                },
                retry: RetryConfig {
                    max_retries: 3,
                    initial_delay_ms: 2000,
                    backoff_multiplier: 1.5,
                },
            },
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Config::default().api
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the absolute path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the storage database
    pub fn storage_path(&self) -> PathBuf {
        self.resolve(&self.storage.path)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    /// Interval between polls for writes made by other processes
    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.storage.sync_poll_interval_ms)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.root_dir, "data");
        assert_eq!(config.storage.wishlist_key, "anime-manga-wishlist");
        assert_eq!(config.api.rate_limit.min_interval_ms, 1000);
        assert_eq!(config.api.retry.max_retries, 3);
        assert_eq!(config.api.retry.initial_delay_ms, 2000);
        assert_eq!(config.api.retry.backoff_multiplier, 1.5);
    }

    #[test]
    fn test_save_and_load_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.api.rate_limit.requests_per_minute = None;
        original_config.save(&config_path)?;

        assert!(config_path.exists());

        let loaded_config = Config::from_file(&config_path)?;
        assert_eq!(loaded_config.data.root_dir, original_config.data.root_dir);
        assert_eq!(loaded_config.api.base_url, original_config.api.base_url);
        assert_eq!(loaded_config.api.rate_limit.requests_per_minute, None);

        Ok(())
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        // Should return default config without error
        assert_eq!(config.data.root_dir, "data");
    }

    #[test]
    fn test_load_invalid_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "data = 42")?;

        assert!(Config::from_file(&config_path).is_err());
        Ok(())
    }

    #[test]
    fn test_path_resolution() {
        let mut config = Config::default();

        assert!(config.storage_path().ends_with("data/catalog.db"));
        assert!(config.log_dir().ends_with("data/logs"));

        config.storage.path = "/var/lib/catalog.db".to_string();
        assert_eq!(config.storage_path(), PathBuf::from("/var/lib/catalog.db"));
    }
}
