use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{GeneratorError, JobGenerator, Result};
use crate::model::{
    Candidate, JobPayload, MEDIA_TYPE_MANIFEST_V2, NotificationEvent, NotificationTarget, Policy,
    PreheatNotification,
};
use crate::resolver::DigestResolver;

const ACTION_PUSH: &str = "push";

/// Builds registry-style notifications for peer-distribution targets.
/// Manifest URLs are content addressed by digest.
pub struct PreheatJobGenerator {
    ext_url: String,
    digests: Arc<dyn DigestResolver>,
}

impl PreheatJobGenerator {
    pub fn new(ext_url: &str, digests: Arc<dyn DigestResolver>) -> Self {
        Self {
            ext_url: ext_url.trim_end_matches('/').to_string(),
            digests,
        }
    }

    fn manifest_url(&self, repository: &str, digest: &str) -> String {
        format!("{}/v2/{}/manifests/{}", self.ext_url, repository, digest)
    }
}

#[async_trait]
impl JobGenerator for PreheatJobGenerator {
    async fn generate(&self, policy: &Policy, candidates: &[Candidate]) -> Result<JobPayload> {
        if candidates.is_empty() {
            return Err(GeneratorError::EmptyCandidates);
        }

        let timestamp = Utc::now();
        let mut events = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let Some((repository, tag)) = candidate.split_locator() else {
                warn!(locator = %candidate.value, "Skipping malformed image locator");
                continue;
            };

            let digest = self
                .digests
                .resolve_digest(repository, tag)
                .await?
                .ok_or_else(|| GeneratorError::DigestNotFound {
                    repository: repository.to_string(),
                    tag: tag.to_string(),
                })?;

            events.push(NotificationEvent {
                id: Uuid::new_v4().to_string(),
                timestamp,
                action: ACTION_PUSH.to_string(),
                target: NotificationTarget {
                    media_type: MEDIA_TYPE_MANIFEST_V2.to_string(),
                    url: self.manifest_url(repository, &digest),
                    digest,
                    repository: repository.to_string(),
                    tag: tag.to_string(),
                },
            });
        }

        debug!(policy_id = policy.id, events = events.len(), "Generated preheat notification");

        Ok(JobPayload::Preheat(PreheatNotification { events }))
    }
}
