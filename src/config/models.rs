use crate::dispatch::DispatchSettings;
use crate::humanize::{ByteSize, HumanDuration};
use crate::runner::{DeliverySettings, RunnerSettings};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jobservice: JobServiceConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// HTTP server and ledger location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Base URL the job runner uses to reach the status hook endpoint.
    #[serde(default = "default_core_url")]
    pub core_url: String,
    /// Registry URL as seen by webhook consumers (goes into payloads).
    #[serde(default = "default_ext_url")]
    pub ext_url: String,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default = "default_max_callback_bytes")]
    pub max_callback_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            core_url: default_core_url(),
            ext_url: default_ext_url(),
            ledger_path: default_ledger_path(),
            max_callback_bytes: default_max_callback_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_core_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_ext_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

fn default_max_callback_bytes() -> ByteSize {
    ByteSize::kib(64)
}

/// Remote job service, used when `runner.mode = "remote"`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Shared secret (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret: Option<String>,
    #[serde(default = "default_client_timeout")]
    pub timeout: HumanDuration,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            timeout: default_client_timeout(),
        }
    }
}

/// Registry distribution API, used to resolve manifest digests
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,
    #[serde(default = "default_client_timeout")]
    pub timeout: HumanDuration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            timeout: default_client_timeout(),
        }
    }
}

fn default_registry_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_client_timeout() -> HumanDuration {
    HumanDuration::secs(10)
}

/// Outbound delivery behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// `0` selects the default bound, a negative value means unlimited.
    #[serde(default)]
    pub max_retry: i64,
    #[serde(default)]
    pub retry_on_server_error: bool,
    #[serde(default = "default_delivery_timeout")]
    pub timeout: HumanDuration,
    #[serde(default = "default_client_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default)]
    pub skip_cert_verify: bool,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retry: 0,
            retry_on_server_error: false,
            timeout: default_delivery_timeout(),
            connect_timeout: default_client_timeout(),
            skip_cert_verify: false,
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_delivery_timeout() -> HumanDuration {
    HumanDuration::secs(30)
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize::mib(1)
}

impl From<&DeliveryConfig> for DeliverySettings {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_retry: config.max_retry,
            retry_on_server_error: config.retry_on_server_error,
            connect_timeout: config.connect_timeout.as_duration(),
            request_timeout: config.timeout.as_duration(),
            skip_cert_verify: config.skip_cert_verify,
            ..DeliverySettings::default()
        }
    }
}

/// Where submitted jobs run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerMode {
    #[default]
    Local,
    Remote,
}

/// How the local runner reports job status back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReporterMode {
    /// Apply updates straight to the ledger.
    #[default]
    Ledger,
    /// POST to the status hook endpoint like a remote job service would.
    Http,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub mode: RunnerMode,
    #[serde(default)]
    pub reporter: ReporterMode,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: HumanDuration,
    #[serde(default = "default_backoff_max")]
    pub backoff_max: HumanDuration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            mode: RunnerMode::default(),
            reporter: ReporterMode::default(),
            workers: default_workers(),
            channel_size: default_channel_size(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_channel_size() -> usize {
    100
}

fn default_backoff_base() -> HumanDuration {
    HumanDuration::secs(1)
}

fn default_backoff_max() -> HumanDuration {
    HumanDuration::secs(60)
}

impl From<&RunnerConfig> for RunnerSettings {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            workers: config.workers,
            channel_size: config.channel_size,
            backoff_base: config.backoff_base.as_duration(),
            backoff_max: config.backoff_max.as_duration(),
        }
    }
}

/// Ledger retention
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Terminal delivery records older than this are pruned.
    #[serde(default = "default_record_ttl")]
    pub record_ttl: HumanDuration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            record_ttl: default_record_ttl(),
        }
    }
}

fn default_record_ttl() -> HumanDuration {
    HumanDuration::secs(30 * 86_400)
}

impl Config {
    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings::from(&self.delivery)
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings::from(&self.runner)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            core_url: self.server.core_url.clone(),
            max_payload_bytes: self.delivery.max_payload_bytes.as_u64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_effective_config_renders_as_toml() {
        let mut config = Config::default();
        config.jobservice.secret = Some("s3cret".into());
        config.runner.backoff_base = HumanDuration::millis(500);

        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("backoff_base = \"500ms\""));
        assert!(rendered.contains("max_callback_bytes = \"64KB\""));
        assert!(!rendered.contains("s3cret"));

        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.runner.backoff_base.as_duration(), Duration::from_millis(500));
        assert_eq!(parsed.retention.record_ttl, config.retention.record_ttl);
        assert!(parsed.jobservice.secret.is_none());
    }

    #[test]
    fn test_settings_conversions() {
        let mut config = Config::default();
        config.delivery.max_retry = -1;
        config.delivery.skip_cert_verify = true;
        config.runner.workers = 8;

        let delivery = config.delivery_settings();
        assert_eq!(delivery.max_retry, -1);
        assert!(delivery.skip_cert_verify);
        assert_eq!(delivery.request_timeout, Duration::from_secs(30));

        assert_eq!(config.runner_settings().workers, 8);
        assert_eq!(config.dispatch_settings().max_payload_bytes, 1024 * 1024);
    }
}
