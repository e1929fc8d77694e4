//! Job runner boundary.
//!
//! The dispatch coordinator hands a [`JobDescriptor`] to a [`JobRunner`] and
//! gets back an opaque correlation id. The runner executes the job with a
//! [`DeliveryExecutor`] according to its own scheduling and reports progress
//! to the descriptor's status hook.
//!
//! Two runners ship with the crate:
//! - [`HttpJobServiceClient`]: submits to an external job service
//! - [`LocalJobRunner`]: in-process worker pool with exponential backoff

mod executor;
mod jobservice;
mod local;
mod reporter;

pub use executor::{
    DEFAULT_MAX_FAILS, DeliveryError, DeliveryExecutor, DeliveryParams, DeliverySettings,
    UNLIMITED_MAX_FAILS, max_fails_for, param,
};
pub use jobservice::HttpJobServiceClient;
pub use local::{LocalJobRunner, RunnerSettings};
pub use reporter::{HttpStatusReporter, LedgerReporter, ReportError, StatusReporter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const JOB_WEBHOOK: &str = "IMAGE_WEBHOOK";
pub const JOB_PREHEAT: &str = "IMAGE_P2P_PREHEAT";

/// String-keyed scalar parameters carried by a job.
pub type JobParameters = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub kind: JobKind,
    #[serde(default)]
    pub is_unique: bool,
}

/// Unit of work handed to a job runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub metadata: JobMetadata,
    /// Callback URL the runner reports status to; embeds the record id.
    pub status_hook: String,
    pub parameters: JobParameters,
}

impl JobDescriptor {
    pub fn generic(name: &str, status_hook: String, parameters: JobParameters) -> Self {
        Self {
            name: name.to_string(),
            metadata: JobMetadata {
                kind: JobKind::Generic,
                is_unique: false,
            },
            status_hook,
            parameters,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("job service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("job service rejected submission with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid job service response: {0}")]
    InvalidResponse(String),

    #[error("unknown job name '{0}'")]
    UnknownJob(String),

    #[error("job runner unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Submit a job and return the runner's correlation id for it.
    async fn submit(&self, job: &JobDescriptor) -> Result<String, SubmitError>;
}
