//! Wiring of the notification pipeline from configuration.
//!
//! ```text
//! ImagePushed ─► OnPushHandler ─► StartWebhook / StartPreheat
//!                                        │
//!                              Coordinator (filter, generate, record)
//!                                        │
//!                               JobRunner (local or remote)
//!                                        │
//!                   status hook ─► ledger (via API or in-process reporter)
//! ```

use std::sync::Arc;
use tracing::info;

use crate::api::AppState;
use crate::bus::{
    EventBus, ImageEvent, Notification, OnPushHandler, PublishReport, StartPreheatHandler,
    StartWebhookHandler, Topic,
};
use crate::config::{Config, ReporterMode, RunnerMode};
use crate::dispatch::Coordinator;
use crate::generator::{GeneratorRegistry, RegistryDigestResolver};
use crate::ledger::{LedgerStore, PolicyStore};
use crate::observability::Metrics;
use crate::resolver::DigestResolver;
use crate::runner::{
    DeliveryExecutor, HttpJobServiceClient, HttpStatusReporter, JobRunner, LedgerReporter,
    LocalJobRunner, StatusReporter, SubmitError,
};
use crate::{Error, Result};

pub struct Pipeline {
    pub config: Arc<Config>,
    pub store: Arc<LedgerStore>,
    pub metrics: Arc<Metrics>,
    pub coordinator: Coordinator,
    pub bus: EventBus,
    pub local_runner: Option<Arc<LocalJobRunner>>,
}

impl Pipeline {
    /// Open the ledger and registry client named by the configuration and
    /// assemble everything on top of them.
    ///
    /// Must be called from within a tokio runtime when the runner is local.
    pub fn assemble(config: Config) -> Result<Self> {
        info!(path = %config.server.ledger_path.display(), "Opening ledger");
        let store = Arc::new(LedgerStore::open(&config.server.ledger_path)?);
        let digests = RegistryDigestResolver::new(
            &config.registry.url,
            config.registry.timeout.as_duration(),
        )
        .map_err(|e| Error::Internal(format!("registry client: {}", e)))?;

        Self::assemble_with(config, store, Arc::new(digests))
    }

    pub fn assemble_with(
        config: Config,
        store: Arc<LedgerStore>,
        digests: Arc<dyn DigestResolver>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let metrics = Arc::new(Metrics::new());
        let policies: Arc<dyn PolicyStore> = store.clone();

        let (runner, local_runner) = build_runner(&config, &policies, &metrics)?;

        let generators =
            GeneratorRegistry::with_defaults(&config.server.ext_url, store.clone(), digests);
        let coordinator = Coordinator::new(
            policies.clone(),
            runner,
            generators,
            store.clone(),
            metrics.clone(),
            config.dispatch_settings(),
        );

        let bus = EventBus::builder()
            .subscribe(Topic::OnPush, Arc::new(OnPushHandler::new(policies)))
            .subscribe(
                Topic::StartWebhook,
                Arc::new(StartWebhookHandler::new(coordinator.clone())),
            )
            .subscribe(
                Topic::StartPreheat,
                Arc::new(StartPreheatHandler::new(coordinator.clone())),
            )
            .metrics(metrics.clone())
            .build();

        info!(
            mode = ?config.runner.mode,
            ext_url = %config.server.ext_url,
            "Pipeline assembled"
        );

        Ok(Self {
            config,
            store,
            metrics,
            coordinator,
            bus,
            local_runner,
        })
    }

    /// Publish an `ImagePushed` event for the artifact.
    pub async fn publish_push(&self, event: ImageEvent) -> Result<PublishReport> {
        Ok(self
            .bus
            .publish(Topic::OnPush, &Notification::ImagePushed(event))
            .await?)
    }

    pub fn app_state(&self) -> AppState {
        let state = AppState::new(self.config.clone(), self.store.clone(), self.metrics.clone());
        match &self.local_runner {
            Some(runner) => state.with_local_runner(runner.clone()),
            None => state,
        }
    }
}

type BuiltRunner = (Arc<dyn JobRunner>, Option<Arc<LocalJobRunner>>);

fn build_runner(
    config: &Config,
    store: &Arc<dyn PolicyStore>,
    metrics: &Arc<Metrics>,
) -> Result<BuiltRunner> {
    match config.runner.mode {
        RunnerMode::Remote => {
            let url = config
                .jobservice
                .url
                .as_deref()
                .ok_or_else(|| Error::Validation("jobservice.url is required".into()))?;
            let client = HttpJobServiceClient::new(
                url,
                config.jobservice.secret.clone(),
                config.jobservice.timeout.as_duration(),
            )
            .map_err(|e: SubmitError| Error::Internal(format!("job service client: {}", e)))?;
            info!(%url, "Submitting jobs to remote job service");
            let runner: Arc<dyn JobRunner> = Arc::new(client);
            Ok((runner, None))
        }
        RunnerMode::Local => {
            let executor = DeliveryExecutor::new(config.delivery_settings())?;
            let reporter: Arc<dyn StatusReporter> = match config.runner.reporter {
                ReporterMode::Ledger => Arc::new(LedgerReporter::new(store.clone(), metrics.clone())),
                ReporterMode::Http => Arc::new(
                    HttpStatusReporter::new(config.jobservice.timeout.as_duration())
                        .map_err(|e| Error::Internal(format!("status reporter: {}", e)))?,
                ),
            };
            let runner = Arc::new(LocalJobRunner::start(
                executor,
                reporter,
                config.runner_settings(),
            ));
            let shared: Arc<dyn JobRunner> = runner.clone();
            Ok((shared, Some(runner)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticDigests;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_assembles_local_pipeline() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(dir.path().join("ledger")).unwrap());

        let pipeline =
            Pipeline::assemble_with(Config::default(), store, Arc::new(StaticDigests::default()))
                .unwrap();

        assert!(pipeline.local_runner.is_some());
        assert_eq!(pipeline.bus.subscriber_count(Topic::OnPush), 1);
        assert_eq!(pipeline.bus.subscriber_count(Topic::StartWebhook), 1);
        assert_eq!(pipeline.bus.subscriber_count(Topic::StartPreheat), 1);
        assert_eq!(pipeline.bus.subscriber_count(Topic::OnDeletion), 0);
    }

    #[tokio::test]
    async fn test_assembles_remote_pipeline() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(dir.path().join("ledger")).unwrap());
        let mut config = Config::default();
        config.runner.mode = RunnerMode::Remote;
        config.jobservice.url = Some("http://jobservice.local:8080".into());

        let pipeline =
            Pipeline::assemble_with(config, store, Arc::new(StaticDigests::default())).unwrap();
        assert!(pipeline.local_runner.is_none());
        assert!(pipeline.app_state().local_runner.is_none());
    }

    #[tokio::test]
    async fn test_push_without_policies_is_handled() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(dir.path().join("ledger")).unwrap());
        let pipeline =
            Pipeline::assemble_with(Config::default(), store, Arc::new(StaticDigests::default()))
                .unwrap();

        let report = pipeline
            .publish_push(ImageEvent::new(1, "library/nginx", "1.25"))
            .await
            .unwrap();
        assert_eq!(report.handled, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(pipeline.metrics.snapshot().events_published, 1);
    }
}
