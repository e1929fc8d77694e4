use super::models::{Config, RunnerMode};
use crate::humanize::HumanDuration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be an http(s) URL, got '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("runner.mode is 'remote' but jobservice.url is not set")]
    MissingJobServiceUrl,

    #[error("{field} must be positive")]
    ZeroValue { field: &'static str },

    #[error("runner.backoff_base ({base}) exceeds runner.backoff_max ({max})")]
    BackoffRange {
        base: HumanDuration,
        max: HumanDuration,
    },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_urls(config)?;
    validate_runner(config)?;
    validate_limits(config)?;
    Ok(())
}

fn check_url(field: &'static str, value: &str) -> Result<(), ValidationError> {
    match reqwest::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => Err(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

fn validate_urls(config: &Config) -> Result<(), ValidationError> {
    check_url("server.core_url", &config.server.core_url)?;
    check_url("server.ext_url", &config.server.ext_url)?;
    check_url("registry.url", &config.registry.url)?;
    if let Some(url) = &config.jobservice.url {
        check_url("jobservice.url", url)?;
    }
    Ok(())
}

fn validate_runner(config: &Config) -> Result<(), ValidationError> {
    let runner = &config.runner;
    if runner.mode == RunnerMode::Remote && config.jobservice.url.is_none() {
        return Err(ValidationError::MissingJobServiceUrl);
    }
    if runner.workers == 0 {
        return Err(ValidationError::ZeroValue {
            field: "runner.workers",
        });
    }
    if runner.channel_size == 0 {
        return Err(ValidationError::ZeroValue {
            field: "runner.channel_size",
        });
    }
    if runner.backoff_base > runner.backoff_max {
        return Err(ValidationError::BackoffRange {
            base: runner.backoff_base,
            max: runner.backoff_max,
        });
    }
    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    let durations = [
        ("retention.record_ttl", config.retention.record_ttl),
        ("delivery.timeout", config.delivery.timeout),
        ("delivery.connect_timeout", config.delivery.connect_timeout),
        ("jobservice.timeout", config.jobservice.timeout),
        ("registry.timeout", config.registry.timeout),
    ];
    for (field, value) in durations {
        if value.as_duration().is_zero() {
            return Err(ValidationError::ZeroValue { field });
        }
    }

    if config.delivery.max_payload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroValue {
            field: "delivery.max_payload_bytes",
        });
    }
    if config.server.max_callback_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroValue {
            field: "server.max_callback_bytes",
        });
    }
    Ok(())
}
