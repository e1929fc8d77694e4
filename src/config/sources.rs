use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "HOOKBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/hookbox.toml";
const ENV_PREFIX: &str = "HOOKBOX";
const ENV_SEPARATOR: &str = "__";
const JOBSERVICE_SECRET_VAR: &str = "HOOKBOX_JOBSERVICE_SECRET";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);
    Ok(config)
}

/// Secrets never come from the TOML file.
fn load_secrets(config: &mut Config) {
    if let Ok(secret) = env::var(JOBSERVICE_SECRET_VAR) {
        if !secret.is_empty() {
            config.jobservice.secret = Some(secret);
        }
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "Loading configuration");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            path = %config_path.display(),
            "Configuration file not found, using defaults and environment overrides"
        );
    }

    // HOOKBOX__RUNNER__WORKERS -> runner.workers
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReporterMode, RunnerMode};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.runner.mode, RunnerMode::Local);
        assert_eq!(config.delivery.max_retry, 0);
        assert!(config.jobservice.secret.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("hookbox.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
core_url = "http://core:8080"
max_callback_bytes = "16KB"

[delivery]
max_retry = -1
retry_on_server_error = true
timeout = "5s"
max_payload_bytes = "2MB"

[runner]
mode = "remote"
reporter = "http"
workers = 8
backoff_base = "250ms"
backoff_max = "2m"

[jobservice]
url = "http://jobservice:8080"
timeout = 15

[retention]
record_ttl = "7d"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.max_callback_bytes.as_u64(), 16 * 1024);
        assert_eq!(config.delivery.max_retry, -1);
        assert!(config.delivery.retry_on_server_error);
        assert_eq!(config.delivery.max_payload_bytes.as_u64(), 2 * 1024 * 1024);
        assert_eq!(config.runner.mode, RunnerMode::Remote);
        assert_eq!(config.runner.reporter, ReporterMode::Http);
        assert_eq!(config.runner.workers, 8);
        assert_eq!(config.jobservice.timeout.as_duration(), Duration::from_secs(15));

        let runner = config.runner_settings();
        assert_eq!(runner.backoff_base, Duration::from_millis(250));
        assert_eq!(runner.backoff_max, Duration::from_secs(120));

        let delivery = config.delivery_settings();
        assert_eq!(delivery.request_timeout, Duration::from_secs(5));
        assert_eq!(
            config.retention.record_ttl.as_duration(),
            Duration::from_secs(7 * 86_400)
        );

        let dispatch = config.dispatch_settings();
        assert_eq!(dispatch.core_url, "http://core:8080");
    }

    #[test]
    fn test_malformed_size_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("hookbox.toml");
        fs::write(&config_path, "[delivery]\nmax_payload_bytes = \"lots\"\n").unwrap();

        assert!(load_from_sources(config_path).is_err());
    }

    // Environment overrides need env::set_var, which is unsafe under edition 2024
}
