use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::Filter;
use crate::model::{Candidate, FilterKind};
use crate::resolver::LabelResolver;

/// Keeps candidates carrying the label. A label that cannot be resolved,
/// or is deleted, rejects every candidate.
pub struct LabelFilter {
    label_id: i64,
    resolver: Arc<dyn LabelResolver>,
}

impl LabelFilter {
    pub fn new(label_id: i64, resolver: Arc<dyn LabelResolver>) -> Self {
        Self { label_id, resolver }
    }
}

#[async_trait]
impl Filter for LabelFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Label
    }

    async fn apply(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        match self.resolver.get_label(self.label_id).await {
            Ok(Some(label)) if !label.deleted => candidates
                .into_iter()
                .filter(|c| c.labels.contains(&self.label_id))
                .collect(),
            Ok(Some(_)) => {
                warn!(label_id = self.label_id, "Label is deleted, filter rejects all");
                Vec::new()
            }
            Ok(None) => {
                warn!(label_id = self.label_id, "Label not found, filter rejects all");
                Vec::new()
            }
            Err(e) => {
                warn!(label_id = self.label_id, error = %e, "Label lookup failed, filter rejects all");
                Vec::new()
            }
        }
    }
}
