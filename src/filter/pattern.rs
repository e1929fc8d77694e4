use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use tracing::warn;

use super::Filter;
use crate::model::{Candidate, FilterKind};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

enum Matcher {
    Identity,
    Glob(Pattern),
    RejectAll,
}

/// Glob match over the repository or tag half of a candidate's locator.
/// `*` stops at `/`, `**` crosses it.
pub struct PatternFilter {
    kind: FilterKind,
    matcher: Matcher,
}

impl PatternFilter {
    pub fn repository(pattern: &str) -> Self {
        Self::new(FilterKind::Repository, pattern)
    }

    pub fn tag(pattern: &str) -> Self {
        Self::new(FilterKind::Tag, pattern)
    }

    fn new(kind: FilterKind, pattern: &str) -> Self {
        let matcher = if pattern.is_empty() {
            Matcher::Identity
        } else {
            match Pattern::new(pattern) {
                Ok(glob) => Matcher::Glob(glob),
                Err(e) => {
                    warn!(
                        kind = kind.as_str(),
                        pattern,
                        error = %e,
                        "Invalid filter pattern, rejecting all candidates"
                    );
                    Matcher::RejectAll
                }
            }
        };
        Self { kind, matcher }
    }

    pub fn matches(&self, candidate: &Candidate) -> bool {
        let glob = match &self.matcher {
            Matcher::Identity => return true,
            Matcher::RejectAll => return false,
            Matcher::Glob(glob) => glob,
        };

        let subject = match self.kind {
            FilterKind::Repository => candidate.repository(),
            _ => candidate.tag(),
        };
        subject.is_some_and(|s| glob.matches_with(s, MATCH_OPTIONS))
    }
}

#[async_trait]
impl Filter for PatternFilter {
    fn kind(&self) -> FilterKind {
        self.kind
    }

    async fn apply(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.into_iter().filter(|c| self.matches(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HookType;

    fn image(locator: &str) -> Candidate {
        let (repository, tag) = locator.split_once(':').unwrap();
        Candidate::image(repository, tag, HookType::PushImage)
    }

    #[test]
    fn test_single_star_does_not_cross_separator() {
        let filter = PatternFilter::repository("library/*");
        assert!(filter.matches(&image("library/nginx:1")));
        assert!(!filter.matches(&image("library/tools/curl:1")));

        let filter = PatternFilter::repository("library/**");
        assert!(filter.matches(&image("library/tools/curl:1")));
    }

    #[test]
    fn test_tag_pattern_only_sees_tag() {
        let filter = PatternFilter::tag("v1.*");
        assert!(filter.matches(&image("app:v1.2")));
        assert!(!filter.matches(&image("v1.0:latest")));
    }

    #[test]
    fn test_invalid_pattern_rejects() {
        let filter = PatternFilter::tag("[");
        assert!(!filter.matches(&image("app:[")));
    }

    #[tokio::test]
    async fn test_empty_pattern_is_identity() {
        let input = vec![
            image("a:1"),
            Candidate {
                value: "no-tag".into(),
                ..image("b:2")
            },
        ];
        let out = PatternFilter::repository("").apply(input.clone()).await;
        assert_eq!(out, input);
    }
}
