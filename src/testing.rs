//! In-memory collaborators and stub HTTP servers for tests.

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::model::{DeliveryStatus, Label, Project};
use crate::resolver::{self, DigestResolver, LabelResolver, ProjectResolver, ResolverError};
use crate::runner::{param, JobDescriptor, JobRunner, ReportError, StatusReporter, SubmitError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct StaticLabels {
    labels: BTreeMap<i64, Label>,
    unavailable: bool,
}

impl StaticLabels {
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Self {
        Self {
            labels: labels.into_iter().map(|l| (l.id, l)).collect(),
            unavailable: false,
        }
    }

    /// Every lookup fails with a backend error.
    pub fn unavailable() -> Self {
        Self {
            labels: BTreeMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl LabelResolver for StaticLabels {
    async fn get_label(&self, id: i64) -> resolver::Result<Option<Label>> {
        if self.unavailable {
            return Err(ResolverError::Backend("label service unavailable".into()));
        }
        Ok(self.labels.get(&id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct StaticProjects {
    projects: BTreeMap<u64, Project>,
}

impl StaticProjects {
    pub fn new(projects: impl IntoIterator<Item = Project>) -> Self {
        Self {
            projects: projects.into_iter().map(|p| (p.id, p)).collect(),
        }
    }
}

#[async_trait]
impl ProjectResolver for StaticProjects {
    async fn get_project(&self, id: u64) -> resolver::Result<Option<Project>> {
        Ok(self.projects.get(&id).cloned())
    }
}

/// Digests keyed by `(repository, tag)`.
#[derive(Debug, Default)]
pub struct StaticDigests {
    digests: BTreeMap<(String, String), String>,
}

impl StaticDigests {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>) -> Self {
        Self {
            digests: entries
                .into_iter()
                .map(|(repo, tag, digest)| ((repo.to_string(), tag.to_string()), digest.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl DigestResolver for StaticDigests {
    async fn resolve_digest(&self, repository: &str, tag: &str) -> resolver::Result<Option<String>> {
        Ok(self
            .digests
            .get(&(repository.to_string(), tag.to_string()))
            .cloned())
    }
}

/// Job runner that records every submission and refuses jobs addressed to
/// selected targets.
#[derive(Debug, Default)]
pub struct MockJobRunner {
    submitted: Mutex<Vec<JobDescriptor>>,
    refused: HashSet<String>,
    next_id: AtomicU64,
}

impl MockJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(mut self, address: impl Into<String>) -> Self {
        self.refused.insert(address.into());
        self
    }

    pub fn submitted(&self) -> Vec<JobDescriptor> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl JobRunner for MockJobRunner {
    async fn submit(&self, job: &JobDescriptor) -> Result<String, SubmitError> {
        lock(&self.submitted).push(job.clone());

        let address = job
            .parameters
            .get(param::ADDRESS)
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if self.refused.contains(address) {
            return Err(SubmitError::Rejected {
                status: 500,
                body: format!("refused job for {}", address),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("job-{}", n))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub status_hook: String,
    pub job_id: String,
    pub status: DeliveryStatus,
}

/// Status reporter that keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self, status_hook: &str) -> Vec<DeliveryStatus> {
        lock(&self.events)
            .iter()
            .filter(|e| e.status_hook == status_hook)
            .map(|e| e.status)
            .collect()
    }

    /// Poll until the hook saw a terminal status or `timeout` elapses, then
    /// return everything reported for it.
    pub async fn wait_for_terminal(&self, status_hook: &str, timeout: Duration) -> Vec<DeliveryStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let statuses = self.statuses(status_hook);
            if statuses.iter().any(|s| s.is_terminal()) || tokio::time::Instant::now() >= deadline {
                return statuses;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report(
        &self,
        status_hook: &str,
        job_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), ReportError> {
        lock(&self.events).push(StatusEvent {
            status_hook: status_hook.to_string(),
            job_id: job_id.to_string(),
            status,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub path: String,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Clone)]
struct CaptureState {
    status: StatusCode,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

/// Local HTTP server answering every request with a fixed status.
pub struct CaptureServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl CaptureServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        lock(&self.requests).clone()
    }
}

async fn capture(
    State(state): State<CaptureState>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    lock(&state.requests).push(CapturedRequest {
        path: uri.path().to_string(),
        content_type: header_value(header::CONTENT_TYPE),
        authorization: header_value(header::AUTHORIZATION),
        body,
    });
    state.status
}

pub async fn spawn_capture_server(status: u16) -> std::io::Result<CaptureServer> {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = CaptureState {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
        requests: requests.clone(),
    };
    let app = Router::new().fallback(capture).with_state(state);

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(CaptureServer { addr, requests })
}

/// URL on a local port nothing listens on.
pub async fn unused_local_address() -> std::io::Result<String> {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}/hook", addr))
}
