//! Lookup collaborators consulted while filtering and generating payloads.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Label, Project};

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry returned HTTP {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("lookup failed: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, ResolverError>;

#[async_trait]
pub trait LabelResolver: Send + Sync {
    /// `Ok(None)` when the label does not exist.
    async fn get_label(&self, id: i64) -> Result<Option<Label>>;
}

#[async_trait]
pub trait ProjectResolver: Send + Sync {
    async fn get_project(&self, id: u64) -> Result<Option<Project>>;
}

#[async_trait]
pub trait DigestResolver: Send + Sync {
    /// Content digest of `repository:tag`, `Ok(None)` when the registry
    /// does not know the manifest.
    async fn resolve_digest(&self, repository: &str, tag: &str) -> Result<Option<String>>;
}
