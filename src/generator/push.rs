use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{GeneratorError, JobGenerator, Result};
use crate::model::{
    Candidate, HookType, JobPayload, MEDIA_TYPE_MANIFEST_V2, Policy, ProjectType, PushEvent,
    PushPayload,
};
use crate::resolver::{DigestResolver, ProjectResolver};

/// Builds push-webhook payloads.
///
/// Project visibility is resolved once per batch. Any digest that cannot be
/// resolved aborts the whole batch, so a receiver never sees a push event
/// without a digest.
pub struct PushJobGenerator {
    ext_url: String,
    projects: Arc<dyn ProjectResolver>,
    digests: Arc<dyn DigestResolver>,
}

impl PushJobGenerator {
    pub fn new(
        ext_url: &str,
        projects: Arc<dyn ProjectResolver>,
        digests: Arc<dyn DigestResolver>,
    ) -> Self {
        Self {
            ext_url: ext_url.trim_end_matches('/').to_string(),
            projects,
            digests,
        }
    }
}

#[async_trait]
impl JobGenerator for PushJobGenerator {
    async fn generate(&self, policy: &Policy, candidates: &[Candidate]) -> Result<JobPayload> {
        if candidates.is_empty() {
            return Err(GeneratorError::EmptyCandidates);
        }

        let project = self
            .projects
            .get_project(policy.project_id)
            .await?
            .ok_or(GeneratorError::ProjectNotFound(policy.project_id))?;
        let project_type = if project.public {
            ProjectType::Public
        } else {
            ProjectType::Private
        };

        let trigger_time = Utc::now();
        let mut events = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let Some((full_name, tag)) = candidate.split_locator() else {
                warn!(locator = %candidate.value, "Skipping malformed image locator");
                continue;
            };

            let digest = self
                .digests
                .resolve_digest(full_name, tag)
                .await?
                .ok_or_else(|| GeneratorError::DigestNotFound {
                    repository: full_name.to_string(),
                    tag: tag.to_string(),
                })?;

            let repo_name = full_name
                .split_once('/')
                .map(|(_, name)| name)
                .unwrap_or(full_name);

            events.push(PushEvent {
                project: project.name.clone(),
                repo_name: repo_name.to_string(),
                tag: tag.to_string(),
                full_name: full_name.to_string(),
                trigger_time,
                digest,
                media_type: MEDIA_TYPE_MANIFEST_V2.to_string(),
                project_type,
                resource_url: format!("{}/{}", self.ext_url, candidate.value),
            });
        }

        debug!(policy_id = policy.id, events = events.len(), "Generated push payload");

        Ok(JobPayload::Push(PushPayload {
            event_type: HookType::PushImage,
            events,
        }))
    }
}
