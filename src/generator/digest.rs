use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tracing::debug;

use crate::model::MEDIA_TYPE_MANIFEST_V2;
use crate::resolver::{DigestResolver, ResolverError, Result};

const DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Resolves digests with a `HEAD /v2/{repository}/manifests/{tag}` against
/// the registry's distribution API.
pub struct RegistryDigestResolver {
    client: Client,
    base_url: String,
}

impl RegistryDigestResolver {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hookbox/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn manifest_url(&self, repository: &str, tag: &str) -> String {
        format!("{}/v2/{}/manifests/{}", self.base_url, repository, tag)
    }
}

#[async_trait]
impl DigestResolver for RegistryDigestResolver {
    async fn resolve_digest(&self, repository: &str, tag: &str) -> Result<Option<String>> {
        let url = self.manifest_url(repository, tag);
        let response = self
            .client
            .head(&url)
            .header(header::ACCEPT, MEDIA_TYPE_MANIFEST_V2)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%url, "Manifest not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ResolverError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let digest = response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        debug!(%url, ?digest, "Resolved manifest digest");
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::HeaderMap, routing::any};
    use std::net::SocketAddr;

    async fn manifest(headers: HeaderMap) -> (StatusCode, [(&'static str, &'static str); 1]) {
        let accept = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert_eq!(accept, MEDIA_TYPE_MANIFEST_V2);
        (StatusCode::OK, [(DIGEST_HEADER, "sha256:feed")])
    }

    async fn start_registry() -> String {
        let app = Router::new()
            .route("/v2/library/app/manifests/v1", any(manifest))
            .route("/v2/library/app/manifests/broken", any(|| async { StatusCode::BAD_GATEWAY }));
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_resolve_digest_from_header() {
        let base = start_registry().await;
        let resolver = RegistryDigestResolver::new(&base, Duration::from_secs(5)).unwrap();

        let digest = resolver.resolve_digest("library/app", "v1").await.unwrap();
        assert_eq!(digest.as_deref(), Some("sha256:feed"));

        let missing = resolver.resolve_digest("library/app", "v2").await.unwrap();
        assert_eq!(missing, None);

        let failed = resolver.resolve_digest("library/app", "broken").await;
        assert!(matches!(
            failed,
            Err(ResolverError::UnexpectedStatus { status: 502, .. })
        ));
    }
}
