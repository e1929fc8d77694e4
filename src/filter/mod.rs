//! Candidate narrowing.
//!
//! A [`FilterChain`] is built from a policy's [`FilterSpec`]s in a fixed
//! order: one repository filter, one tag filter, then one label filter per
//! label spec. Each stage receives the survivors of the previous one, so
//! label filters are conjunctive. An empty result means "do not dispatch".

mod label;
mod pattern;

pub use label::LabelFilter;
pub use pattern::PatternFilter;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::model::{Candidate, FilterKind, FilterSpec};
use crate::resolver::LabelResolver;

/// A single predicate stage over a candidate set.
#[async_trait]
pub trait Filter: Send + Sync {
    fn kind(&self) -> FilterKind;

    /// Return the subset of `candidates` that satisfies this stage,
    /// preserving input order.
    async fn apply(&self, candidates: Vec<Candidate>) -> Vec<Candidate>;
}

pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    /// Build the chain for a policy. Only the first repository and the
    /// first tag spec are used; a missing one becomes the identity filter.
    pub fn from_specs(specs: &[FilterSpec], labels: Arc<dyn LabelResolver>) -> Self {
        let repository = specs
            .iter()
            .find_map(|spec| match spec {
                FilterSpec::Repository(pattern) => Some(pattern.as_str()),
                _ => None,
            })
            .unwrap_or_default();
        let tag = specs
            .iter()
            .find_map(|spec| match spec {
                FilterSpec::Tag(pattern) => Some(pattern.as_str()),
                _ => None,
            })
            .unwrap_or_default();

        let mut filters: Vec<Box<dyn Filter>> = vec![
            Box::new(PatternFilter::repository(repository)),
            Box::new(PatternFilter::tag(tag)),
        ];

        for spec in specs {
            if let FilterSpec::Label(id) = spec {
                filters.push(Box::new(LabelFilter::new(*id, labels.clone())));
            }
        }

        Self { filters }
    }

    pub fn kinds(&self) -> Vec<FilterKind> {
        self.filters.iter().map(|f| f.kind()).collect()
    }

    pub async fn apply(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut surviving = candidates;
        for filter in &self.filters {
            if surviving.is_empty() {
                break;
            }
            let before = surviving.len();
            surviving = filter.apply(surviving).await;
            debug!(
                stage = filter.kind().as_str(),
                before,
                after = surviving.len(),
                "Filter stage applied"
            );
        }
        surviving
    }
}
