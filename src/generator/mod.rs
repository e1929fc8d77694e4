//! Payload generation: turns a policy's surviving candidates into the
//! [`JobPayload`] that will be POSTed to each target.
//!
//! Generators are looked up by [`HookType`] in a [`GeneratorRegistry`].

mod digest;
mod preheat;
mod push;

pub use digest::RegistryDigestResolver;
pub use preheat::PreheatJobGenerator;
pub use push::PushJobGenerator;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{Candidate, HookType, JobPayload, Policy};
use crate::resolver::{DigestResolver, ProjectResolver, ResolverError};

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("no candidates to generate events from")]
    EmptyCandidates,

    #[error("no job generator registered for hook type {0}")]
    NoGenerator(HookType),

    #[error("project {0} not found")]
    ProjectNotFound(u64),

    #[error("digest not found for {repository}:{tag}")]
    DigestNotFound { repository: String, tag: String },

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

pub type Result<T> = std::result::Result<T, GeneratorError>;

#[async_trait]
pub trait JobGenerator: Send + Sync {
    /// Build one payload with one event per well-formed candidate, in
    /// input order.
    async fn generate(&self, policy: &Policy, candidates: &[Candidate]) -> Result<JobPayload>;
}

#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<HookType, Arc<dyn JobGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: HookType, generator: Arc<dyn JobGenerator>) {
        self.generators.insert(hook, generator);
    }

    pub fn get(&self, hook: HookType) -> Result<Arc<dyn JobGenerator>> {
        self.generators
            .get(&hook)
            .cloned()
            .ok_or(GeneratorError::NoGenerator(hook))
    }

    /// Registry with the push-webhook and preheat generators.
    pub fn with_defaults(
        ext_url: &str,
        projects: Arc<dyn ProjectResolver>,
        digests: Arc<dyn DigestResolver>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(
            HookType::PushImage,
            Arc::new(PushJobGenerator::new(ext_url, projects, digests.clone())),
        );
        registry.register(
            HookType::P2pPreheat,
            Arc::new(PreheatJobGenerator::new(ext_url, digests)),
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StaticDigests, StaticProjects};

    #[test]
    fn test_defaults_cover_push_and_preheat() {
        let registry = GeneratorRegistry::with_defaults(
            "https://registry.example.com",
            Arc::new(StaticProjects::default()),
            Arc::new(StaticDigests::default()),
        );
        assert!(registry.get(HookType::PushImage).is_ok());
        assert!(registry.get(HookType::P2pPreheat).is_ok());
        assert!(matches!(
            registry.get(HookType::DeleteChart),
            Err(GeneratorError::NoGenerator(HookType::DeleteChart))
        ));
    }
}
