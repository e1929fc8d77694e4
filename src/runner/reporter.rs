//! Where a runner sends status updates for the jobs it executes.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::dispatch::{CallbackError, StatusHook, StatusReport, StatusUpdate, apply_status};
use crate::ledger::PolicyStore;
use crate::model::DeliveryStatus;
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("status hook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("status hook returned HTTP {0}")]
    Rejected(u16),

    #[error("malformed status hook '{0}'")]
    InvalidHook(String),

    #[error(transparent)]
    Callback(#[from] CallbackError),
}

#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(
        &self,
        status_hook: &str,
        job_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), ReportError>;
}

/// POSTs `{job_id, status}` to the status hook URL.
pub struct HttpStatusReporter {
    client: Client,
}

impl HttpStatusReporter {
    pub fn new(timeout: Duration) -> Result<Self, ReportError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn report(
        &self,
        status_hook: &str,
        job_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), ReportError> {
        let response = self
            .client
            .post(status_hook)
            .json(&StatusReport::new(job_id, status))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ReportError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Applies status updates straight to the ledger, skipping the HTTP
/// round-trip when the runner lives in the same process.
pub struct LedgerReporter {
    store: Arc<dyn PolicyStore>,
    metrics: Arc<Metrics>,
}

impl LedgerReporter {
    pub fn new(store: Arc<dyn PolicyStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }
}

#[async_trait]
impl StatusReporter for LedgerReporter {
    async fn report(
        &self,
        status_hook: &str,
        job_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), ReportError> {
        let hook = StatusHook::parse(status_hook)
            .ok_or_else(|| ReportError::InvalidHook(status_hook.to_string()))?;

        let update = apply_status(
            self.store.as_ref(),
            hook.kind,
            hook.record_id,
            &StatusReport::new(job_id, status),
        )?;
        match update {
            StatusUpdate::Applied { .. } => self.metrics.callback_applied(),
            StatusUpdate::Ignored { .. } => self.metrics.callback_ignored(),
        }
        debug!(record_id = hook.record_id, %status, ?update, "Status reported in-process");
        Ok(())
    }
}
