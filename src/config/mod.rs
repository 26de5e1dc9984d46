//! Configuration management for taskrelay
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//! 4. Legacy deployment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use taskrelay::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `TASKRELAY__<section>__<key>`
//!
//! Examples:
//! - `TASKRELAY__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `TASKRELAY__RATE_LIMIT__WINDOW=1m`
//! - `TASKRELAY__RATE_LIMIT__TRUSTED_PROXIES=10.0.0.1,10.1.0.0/16`
//!
//! The plain names `CLEANUP_CRON_SCHEDULE`, `CLEANUP_RETENTION_DAYS`,
//! `TRUSTED_PROXIES`, `ENV`, `CONTAINER_ORIGIN`, `FRONTEND_ORIGIN_DEV` and
//! `JOB_LEDGER_PATH` are honoured as well.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/taskrelay.toml`.
//! This can be overridden using the `TASKRELAY_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::HumanDuration;
pub use models::{
    AuthConfig, BroadcastConfig, Config, ExecutorConfig, LedgerConfig, MaintenanceConfig,
    QueueConfig, RateLimitConfig, RateLimitStrategy, ServerConfig, StaticSession,
};
pub use sources::apply_legacy_env;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (bad cron, zero limits, invalid CIDRs, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file instead of `TASKRELAY_CONFIG`
    ///
    /// `.env`, `TASKRELAY__*` and the legacy variables still apply on top.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Check an already-built configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[queue]\ncapacity = 5\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.maintenance.retention_days, 7);
    }

    #[test]
    fn test_validation_catches_bad_cron() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[maintenance]\ncron = \"whenever\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidCron { .. })
        ));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.rate_limit.strategy = RateLimitStrategy::TokenBucket;
        config.queue.job_timeout = Some(HumanDuration::from_secs(90));

        let rendered = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();

        assert_eq!(parsed.rate_limit.strategy, RateLimitStrategy::TokenBucket);
        assert_eq!(parsed.queue.job_timeout, config.queue.job_timeout);
        assert!(parsed.validate().is_ok());
    }
}
