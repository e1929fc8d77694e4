//! One delivery attempt: POST the payload and classify the outcome.

use reqwest::{Client, header};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::JobParameters;
use crate::model::Target;

pub const DEFAULT_MAX_FAILS: u32 = 5;
/// Large enough to behave as "retry forever", small enough that a runner's
/// backoff arithmetic cannot overflow.
pub const UNLIMITED_MAX_FAILS: u32 = 10_000_000;

const SECRET_HEADER_PREFIX: &str = "Secret";

pub mod param {
    pub const PAYLOAD: &str = "payload";
    pub const ADDRESS: &str = "address";
    pub const SECRET: &str = "secret";
    pub const SKIP_CERT_VERIFY: &str = "skip_cert_verify";
    pub const TIMEOUT_SECS: &str = "timeout_secs";
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid delivery parameters: {0}")]
    InvalidParameters(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("delivery to {address} failed: {source}")]
    Transport {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{address} responded with HTTP {status}")]
    Rejected { address: String, status: u16 },

    #[error("{address} responded with HTTP {status} (retryable)")]
    ServerError { address: String, status: u16 },
}

impl DeliveryError {
    /// Transport failures always qualify; 5xx responses only when the
    /// executor was configured to retry them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeliveryError::Transport { .. } | DeliveryError::ServerError { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// `0` means the default bound, negative means unlimited.
    pub max_retry: i64,
    pub retry_on_server_error: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub skip_cert_verify: bool,
    pub user_agent: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_retry: 0,
            retry_on_server_error: false,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            skip_cert_verify: false,
            user_agent: concat!("hookbox/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Maximum number of failed attempts for a configured `max_retry`.
pub fn max_fails_for(max_retry: i64) -> u32 {
    if max_retry > 0 && max_retry < UNLIMITED_MAX_FAILS as i64 {
        return max_retry as u32;
    }
    if max_retry < 0 || max_retry >= UNLIMITED_MAX_FAILS as i64 {
        return UNLIMITED_MAX_FAILS;
    }
    DEFAULT_MAX_FAILS
}

/// Validated view of a delivery job's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryParams {
    pub address: String,
    pub payload: String,
    pub secret: Option<String>,
    pub skip_cert_verify: Option<bool>,
    pub timeout: Option<Duration>,
}

impl DeliveryParams {
    pub fn for_target(target: &Target, payload: String) -> Self {
        Self {
            address: target.delivery_address(),
            payload,
            secret: target.secret.clone().filter(|s| !s.is_empty()),
            skip_cert_verify: Some(target.skip_cert_verify),
            timeout: target.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn from_parameters(params: &JobParameters) -> Result<Self, DeliveryError> {
        let required = |key: &str| -> Result<String, DeliveryError> {
            match params.get(key) {
                Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                Some(_) => Err(DeliveryError::InvalidParameters(format!(
                    "'{}' must be a non-empty string",
                    key
                ))),
                None => Err(DeliveryError::InvalidParameters(format!(
                    "missing '{}'",
                    key
                ))),
            }
        };

        let address = required(param::ADDRESS)?;
        let payload = required(param::PAYLOAD)?;

        let url = reqwest::Url::parse(&address).map_err(|e| {
            DeliveryError::InvalidParameters(format!("invalid address '{}': {}", address, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeliveryError::InvalidParameters(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let secret = match params.get(param::SECRET) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(DeliveryError::InvalidParameters(
                    "'secret' must be a string".into(),
                ));
            }
        };

        Ok(Self {
            address,
            payload,
            secret,
            skip_cert_verify: params.get(param::SKIP_CERT_VERIFY).and_then(Value::as_bool),
            timeout: params
                .get(param::TIMEOUT_SECS)
                .and_then(Value::as_u64)
                .map(Duration::from_secs),
        })
    }

    pub fn into_parameters(self) -> JobParameters {
        let mut params = JobParameters::new();
        params.insert(param::ADDRESS.into(), Value::String(self.address));
        params.insert(param::PAYLOAD.into(), Value::String(self.payload));
        if let Some(secret) = self.secret {
            params.insert(param::SECRET.into(), Value::String(secret));
        }
        if let Some(skip) = self.skip_cert_verify {
            params.insert(param::SKIP_CERT_VERIFY.into(), Value::Bool(skip));
        }
        if let Some(timeout) = self.timeout {
            params.insert(param::TIMEOUT_SECS.into(), Value::from(timeout.as_secs()));
        }
        params
    }
}

/// Performs delivery attempts.
///
/// [`should_retry`](Self::should_retry) reflects only the most recent
/// attempt, so each job should run on its own instance (see
/// [`fresh`](Self::fresh)).
pub struct DeliveryExecutor {
    settings: DeliverySettings,
    verified: Client,
    insecure: Client,
    last_transient: AtomicBool,
}

impl DeliveryExecutor {
    pub fn new(settings: DeliverySettings) -> Result<Self, DeliveryError> {
        let build = |accept_invalid_certs: bool| {
            Client::builder()
                .connect_timeout(settings.connect_timeout)
                .user_agent(&settings.user_agent)
                .danger_accept_invalid_certs(accept_invalid_certs)
                .build()
                .map_err(DeliveryError::Client)
        };

        Ok(Self {
            verified: build(false)?,
            insecure: build(true)?,
            settings,
            last_transient: AtomicBool::new(false),
        })
    }

    /// Executor sharing this one's connection pools with a cleared
    /// retry flag.
    pub fn fresh(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            verified: self.verified.clone(),
            insecure: self.insecure.clone(),
            last_transient: AtomicBool::new(false),
        }
    }

    pub fn max_fails(&self) -> u32 {
        max_fails_for(self.settings.max_retry)
    }

    pub fn should_retry(&self) -> bool {
        self.last_transient.load(Ordering::SeqCst)
    }

    pub fn validate(&self, params: &JobParameters) -> Result<DeliveryParams, DeliveryError> {
        DeliveryParams::from_parameters(params)
    }

    /// Exactly one POST. Invalid parameters fail without any I/O.
    pub async fn run(&self, params: &JobParameters) -> Result<(), DeliveryError> {
        let result = match self.validate(params) {
            Ok(params) => self.attempt(&params).await,
            Err(e) => Err(e),
        };
        let transient = result.as_ref().err().is_some_and(DeliveryError::is_transient);
        self.last_transient.store(transient, Ordering::SeqCst);
        result
    }

    async fn attempt(&self, params: &DeliveryParams) -> Result<(), DeliveryError> {
        let client = if params
            .skip_cert_verify
            .unwrap_or(self.settings.skip_cert_verify)
        {
            &self.insecure
        } else {
            &self.verified
        };

        let mut request = client
            .post(&params.address)
            .timeout(params.timeout.unwrap_or(self.settings.request_timeout))
            .header(header::CONTENT_TYPE, "application/json")
            .body(params.payload.clone());
        if let Some(secret) = &params.secret {
            request = request.header(
                header::AUTHORIZATION,
                format!("{}{}", SECRET_HEADER_PREFIX, secret),
            );
        }

        debug!(address = %params.address, bytes = params.payload.len(), "Delivering payload");

        let response = request
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                address: params.address.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(address = %params.address, status = status.as_u16(), "Delivery accepted");
            return Ok(());
        }

        warn!(address = %params.address, status = status.as_u16(), "Delivery rejected");
        if status.is_server_error() && self.settings.retry_on_server_error {
            Err(DeliveryError::ServerError {
                address: params.address.clone(),
                status: status.as_u16(),
            })
        } else {
            Err(DeliveryError::Rejected {
                address: params.address.clone(),
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CapturedRequest, spawn_capture_server, unused_local_address};

    fn params(address: &str, secret: Option<&str>) -> JobParameters {
        DeliveryParams {
            address: address.to_string(),
            payload: r#"{"events":[]}"#.to_string(),
            secret: secret.map(str::to_owned),
            skip_cert_verify: None,
            timeout: Some(Duration::from_secs(5)),
        }
        .into_parameters()
    }

    fn executor(retry_on_server_error: bool) -> DeliveryExecutor {
        DeliveryExecutor::new(DeliverySettings {
            retry_on_server_error,
            ..DeliverySettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_max_fails_sentinels() {
        assert_eq!(max_fails_for(0), DEFAULT_MAX_FAILS);
        assert_eq!(max_fails_for(3), 3);
        assert_eq!(max_fails_for(-1), UNLIMITED_MAX_FAILS);
        assert_eq!(max_fails_for(UNLIMITED_MAX_FAILS as i64), UNLIMITED_MAX_FAILS);
        assert_eq!(max_fails_for(i64::MAX), UNLIMITED_MAX_FAILS);
    }

    #[test]
    fn test_validate_requires_address_and_payload() {
        let exec = executor(false);
        let mut p = params("http://hooks.local", None);
        assert!(exec.validate(&p).is_ok());

        p.remove(param::PAYLOAD);
        assert!(matches!(
            exec.validate(&p),
            Err(DeliveryError::InvalidParameters(_))
        ));

        let mut p = params("http://hooks.local", None);
        p.insert(param::ADDRESS.into(), Value::String(String::new()));
        assert!(exec.validate(&p).is_err());

        let p = params("mailto:ops@example.com", None);
        assert!(exec.validate(&p).is_err());
    }

    #[tokio::test]
    async fn test_success_sends_headers() {
        let server = spawn_capture_server(200).await.unwrap();
        let exec = executor(false);

        exec.run(&params(&server.url("/hook"), Some("abc")))
            .await
            .unwrap();
        assert!(!exec.should_retry());

        let requests: Vec<CapturedRequest> = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/hook");
        assert_eq!(requests[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(requests[0].authorization.as_deref(), Some("Secretabc"));
        assert_eq!(requests[0].body, r#"{"events":[]}"#);
    }

    #[tokio::test]
    async fn test_no_secret_no_authorization_header() {
        let server = spawn_capture_server(204).await.unwrap();
        let exec = executor(false);
        exec.run(&params(&server.url("/hook"), None)).await.unwrap();
        assert_eq!(server.requests()[0].authorization, None);
    }

    #[tokio::test]
    async fn test_503_is_permanent_by_default() {
        let server = spawn_capture_server(503).await.unwrap();
        let exec = executor(false);

        let err = exec
            .run(&params(&server.url("/hook"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { status: 503, .. }));
        assert!(!exec.should_retry());
    }

    #[tokio::test]
    async fn test_503_is_transient_when_configured() {
        let server = spawn_capture_server(503).await.unwrap();
        let exec = executor(true);

        let err = exec
            .run(&params(&server.url("/hook"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::ServerError { status: 503, .. }));
        assert!(exec.should_retry());

        let server = spawn_capture_server(404).await.unwrap();
        assert!(exec.run(&params(&server.url("/hook"), None)).await.is_err());
        assert!(!exec.should_retry());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let address = unused_local_address().await.unwrap();
        let exec = executor(false);

        let err = exec.run(&params(&address, None)).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport { .. }));
        assert!(exec.should_retry());

        let fresh = exec.fresh();
        assert!(!fresh.should_retry());
    }
}
