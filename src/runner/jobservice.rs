//! Client for an external job service.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{JobDescriptor, JobRunner, SubmitError};

const JOBS_PATH: &str = "/api/v1/jobs";
const AUTH_SCHEME: &str = "Harbor-Secret";

#[derive(Serialize)]
struct SubmitRequest<'a> {
    job: &'a JobDescriptor,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job: JobStats,
}

#[derive(Deserialize)]
struct JobStats {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

/// Submits jobs with `POST {base}/api/v1/jobs`; the job service reports
/// progress to each job's status hook on its own.
pub struct HttpJobServiceClient {
    client: Client,
    endpoint: String,
    secret: Option<String>,
}

impl HttpJobServiceClient {
    pub fn new(
        base_url: &str,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SubmitError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), JOBS_PATH),
            secret: secret.filter(|s| !s.is_empty()),
        })
    }
}

#[async_trait]
impl JobRunner for HttpJobServiceClient {
    async fn submit(&self, job: &JobDescriptor) -> Result<String, SubmitError> {
        let mut request = self.client.post(&self.endpoint).json(&SubmitRequest { job });
        if let Some(secret) = &self.secret {
            request = request.header(header::AUTHORIZATION, format!("{} {}", AUTH_SCHEME, secret));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), job = %job.name, "Job service rejected submission");
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let stats: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::InvalidResponse(e.to_string()))?;
        if stats.job.id.is_empty() {
            return Err(SubmitError::InvalidResponse("empty job id".into()));
        }

        debug!(
            job_id = %stats.job.id,
            status = stats.job.status.as_deref().unwrap_or("unknown"),
            job = %job.name,
            "Job submitted"
        );
        Ok(stats.job.id)
    }
}
