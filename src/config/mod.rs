//! Configuration management for hookbox
//!
//! Settings are layered:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use hookbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `HOOKBOX__<section>__<key>`:
//! - `HOOKBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `HOOKBOX__RUNNER__MODE=remote`
//! - `HOOKBOX__DELIVERY__MAX_PAYLOAD_BYTES=2MB`
//!
//! The job service secret is read from `HOOKBOX_JOBSERVICE_SECRET` only.
//!
//! # Configuration File
//!
//! `config/hookbox.toml` by default, or the path in `HOOKBOX_CONFIG`.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    Config, DeliveryConfig, JobServiceConfig, RegistryConfig, ReporterMode, RetentionConfig,
    RunnerConfig, RunnerMode, ServerConfig,
};
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
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path plus environment overrides
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
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
        let config_path = temp_dir.path().join("hookbox.toml");

        fs::write(
            &config_path,
            "[server]\next_url = \"https://registry.example.com\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.server.ext_url, "https://registry.example.com");
        assert_eq!(config.runner.workers, 4);
    }

    #[test]
    fn test_validation_runs_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("hookbox.toml");

        fs::write(&config_path, "[runner]\nmode = \"remote\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::MissingJobServiceUrl)
        ));
    }
}
