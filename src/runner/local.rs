//! In-process job runner.
//!
//! Jobs are handed to a fixed pool of worker tasks over bounded mpsc
//! channels, round-robin. Each worker runs its jobs one at a time:
//!
//! 1. report `Running`, make one delivery attempt
//! 2. on success report `Success`
//! 3. on a transient failure with attempts left, report `Retrying` and
//!    sleep `min(base * 2^(n-1), max)` before the next attempt
//! 4. otherwise report `Error`

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    DeliveryExecutor, JOB_PREHEAT, JOB_WEBHOOK, JobDescriptor, JobRunner, StatusReporter,
    SubmitError,
};
use crate::model::DeliveryStatus;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub workers: usize,
    pub channel_size: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            channel_size: 100,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

impl RunnerSettings {
    /// Delay after the `failures`-th failed attempt.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

#[derive(Debug)]
struct JobEnvelope {
    job_id: String,
    job: JobDescriptor,
}

pub struct LocalJobRunner {
    worker_channels: Vec<mpsc::Sender<JobEnvelope>>,
    next_worker: AtomicUsize,
}

impl LocalJobRunner {
    /// Spawn the worker pool. Must be called from within a tokio runtime.
    pub fn start(
        executor: DeliveryExecutor,
        reporter: Arc<dyn StatusReporter>,
        settings: RunnerSettings,
    ) -> Self {
        info!(
            workers = settings.workers,
            channel_size = settings.channel_size,
            "Starting local job runner"
        );

        let executor = Arc::new(executor);
        let mut worker_channels = Vec::with_capacity(settings.workers);
        for worker_id in 0..settings.workers {
            let (tx, rx) = mpsc::channel(settings.channel_size.max(1));
            worker_channels.push(tx);
            tokio::spawn(worker_loop(
                worker_id,
                rx,
                executor.clone(),
                reporter.clone(),
                settings.clone(),
            ));
        }

        Self {
            worker_channels,
            next_worker: AtomicUsize::new(0),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.worker_channels.len()
    }

    pub fn health_check(&self) -> bool {
        !self.worker_channels.is_empty() && self.worker_channels.iter().all(|ch| !ch.is_closed())
    }
}

#[async_trait]
impl JobRunner for LocalJobRunner {
    async fn submit(&self, job: &JobDescriptor) -> Result<String, SubmitError> {
        if job.name != JOB_WEBHOOK && job.name != JOB_PREHEAT {
            return Err(SubmitError::UnknownJob(job.name.clone()));
        }
        if self.worker_channels.is_empty() {
            return Err(SubmitError::Unavailable("no workers".into()));
        }

        let job_id = Uuid::now_v7().to_string();
        let worker_idx =
            self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_channels.len();
        let envelope = JobEnvelope {
            job_id: job_id.clone(),
            job: job.clone(),
        };

        self.worker_channels[worker_idx]
            .send(envelope)
            .await
            .map_err(|_| {
                warn!(worker_idx, %job_id, "Worker channel closed, job not accepted");
                SubmitError::Unavailable(format!("worker {} stopped", worker_idx))
            })?;

        debug!(worker_idx, %job_id, job = %job.name, "Job queued");
        Ok(job_id)
    }
}

async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<JobEnvelope>,
    executor: Arc<DeliveryExecutor>,
    reporter: Arc<dyn StatusReporter>,
    settings: RunnerSettings,
) {
    debug!(worker_id, "Worker started");
    while let Some(envelope) = rx.recv().await {
        run_job(worker_id, envelope, &executor, reporter.as_ref(), &settings).await;
    }
    debug!(worker_id, "Worker stopped");
}

async fn run_job(
    worker_id: usize,
    envelope: JobEnvelope,
    executor: &DeliveryExecutor,
    reporter: &dyn StatusReporter,
    settings: &RunnerSettings,
) {
    let JobEnvelope { job_id, job } = envelope;
    let report = |status: DeliveryStatus| {
        report_status(reporter, worker_id, &job.status_hook, &job_id, status)
    };

    let executor = executor.fresh();
    if let Err(e) = executor.validate(&job.parameters) {
        error!(worker_id, %job_id, error = %e, "Rejecting job with invalid parameters");
        report(DeliveryStatus::Error).await;
        return;
    }

    let max_fails = executor.max_fails();
    let mut failures = 0u32;
    loop {
        report(DeliveryStatus::Running).await;

        match executor.run(&job.parameters).await {
            Ok(()) => {
                info!(worker_id, %job_id, attempts = failures + 1, "Delivery succeeded");
                report(DeliveryStatus::Success).await;
                return;
            }
            Err(e) => {
                failures += 1;
                if !executor.should_retry() || failures >= max_fails {
                    error!(worker_id, %job_id, failures, error = %e, "Delivery failed");
                    report(DeliveryStatus::Error).await;
                    return;
                }

                let delay = settings.backoff(failures);
                warn!(
                    worker_id,
                    %job_id,
                    failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Delivery failed, retrying"
                );
                report(DeliveryStatus::Retrying).await;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn report_status(
    reporter: &dyn StatusReporter,
    worker_id: usize,
    status_hook: &str,
    job_id: &str,
    status: DeliveryStatus,
) {
    if let Err(e) = reporter.report(status_hook, job_id, status).await {
        warn!(worker_id, job_id, %status, error = %e, "Failed to report status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{DeliveryParams, DeliverySettings};
    use crate::testing::{RecordingReporter, spawn_capture_server, unused_local_address};

    fn settings() -> RunnerSettings {
        RunnerSettings {
            workers: 2,
            channel_size: 10,
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_millis(20),
        }
    }

    fn runner(delivery: DeliverySettings, reporter: Arc<RecordingReporter>) -> LocalJobRunner {
        LocalJobRunner::start(
            DeliveryExecutor::new(delivery).unwrap(),
            reporter,
            settings(),
        )
    }

    fn job(address: &str, hook: &str) -> JobDescriptor {
        let params = DeliveryParams {
            address: address.to_string(),
            payload: "{}".to_string(),
            secret: None,
            skip_cert_verify: None,
            timeout: Some(Duration::from_secs(2)),
        };
        JobDescriptor::generic(JOB_WEBHOOK, hook.to_string(), params.into_parameters())
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let s = settings();
        assert_eq!(s.backoff(1), Duration::from_millis(5));
        assert_eq!(s.backoff(2), Duration::from_millis(10));
        assert_eq!(s.backoff(3), Duration::from_millis(20));
        assert_eq!(s.backoff(4), Duration::from_millis(20));
        assert_eq!(s.backoff(u32::MAX), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_successful_delivery() {
        let server = spawn_capture_server(200).await.unwrap();
        let reporter = Arc::new(RecordingReporter::new());
        let runner = runner(DeliverySettings::default(), reporter.clone());

        let job_id = runner.submit(&job(&server.url("/hook"), "hook-1")).await.unwrap();
        assert!(Uuid::parse_str(&job_id).is_ok());

        let statuses = reporter
            .wait_for_terminal("hook-1", Duration::from_secs(5))
            .await;
        assert_eq!(statuses, vec![DeliveryStatus::Running, DeliveryStatus::Success]);
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_503_fails_after_one_attempt() {
        let server = spawn_capture_server(503).await.unwrap();
        let reporter = Arc::new(RecordingReporter::new());
        let runner = runner(DeliverySettings::default(), reporter.clone());

        runner.submit(&job(&server.url("/hook"), "hook-2")).await.unwrap();

        let statuses = reporter
            .wait_for_terminal("hook-2", Duration::from_secs(5))
            .await;
        assert_eq!(statuses, vec![DeliveryStatus::Running, DeliveryStatus::Error]);
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_retries_up_to_bound() {
        let address = unused_local_address().await.unwrap();
        let reporter = Arc::new(RecordingReporter::new());
        let delivery = DeliverySettings {
            max_retry: 3,
            ..DeliverySettings::default()
        };
        let runner = runner(delivery, reporter.clone());

        runner.submit(&job(&address, "hook-3")).await.unwrap();

        let statuses = reporter
            .wait_for_terminal("hook-3", Duration::from_secs(10))
            .await;
        assert_eq!(
            statuses,
            vec![
                DeliveryStatus::Running,
                DeliveryStatus::Retrying,
                DeliveryStatus::Running,
                DeliveryStatus::Retrying,
                DeliveryStatus::Running,
                DeliveryStatus::Error,
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_parameters_fail_without_attempt() {
        let reporter = Arc::new(RecordingReporter::new());
        let runner = runner(DeliverySettings::default(), reporter.clone());

        let mut bad = job("http://hooks.local", "hook-4");
        bad.parameters.remove("payload");
        runner.submit(&bad).await.unwrap();

        let statuses = reporter
            .wait_for_terminal("hook-4", Duration::from_secs(5))
            .await;
        assert_eq!(statuses, vec![DeliveryStatus::Error]);
    }

    #[tokio::test]
    async fn test_unknown_job_name_is_refused() {
        let reporter = Arc::new(RecordingReporter::new());
        let runner = runner(DeliverySettings::default(), reporter);

        let mut unknown = job("http://hooks.local", "hook-5");
        unknown.name = "GARBAGE_COLLECTION".into();
        assert!(matches!(
            runner.submit(&unknown).await,
            Err(SubmitError::UnknownJob(_))
        ));
        assert!(runner.health_check());
        assert_eq!(runner.num_workers(), 2);
    }
}
