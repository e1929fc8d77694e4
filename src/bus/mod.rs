//! In-process publish/subscribe bus.
//!
//! The topic registry is assembled once with [`EventBusBuilder`] and frozen
//! by [`EventBusBuilder::build`]; the resulting [`EventBus`] is cheap to clone
//! and has no mutation API. Publishing awaits every handler of the topic in
//! registration order on the calling task. A failing handler is logged and
//! counted; the remaining handlers still run.
//!
//! Handlers receive the bus itself so they can publish follow-up
//! notifications (the push handler fans out one `StartWebhook` /
//! `StartPreheat` per matching policy).

pub mod handlers;

pub use handlers::{OnPushHandler, StartPreheatHandler, StartWebhookHandler};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::dispatch::DispatchError;
use crate::ledger::StoreError;
use crate::model::{Candidate, HookType, Policy};
use crate::observability::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    OnPush,
    OnDeletion,
    StartWebhook,
    StartPreheat,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::OnPush => "on_push",
            Topic::OnDeletion => "on_deletion",
            Topic::StartWebhook => "start_webhook",
            Topic::StartPreheat => "start_preheat",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An artifact lifecycle event in a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEvent {
    pub project_id: u64,
    pub repository: String,
    pub tag: String,
    pub labels: Vec<i64>,
    pub occurred_at: DateTime<Utc>,
}

impl ImageEvent {
    pub fn new(project_id: u64, repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            project_id,
            repository: repository.into(),
            tag: tag.into(),
            labels: Vec::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_labels(mut self, labels: impl IntoIterator<Item = i64>) -> Self {
        self.labels = labels.into_iter().collect();
        self
    }

    pub fn candidate(&self, operation: HookType) -> Candidate {
        Candidate::image(&self.repository, &self.tag, operation).with_labels(self.labels.clone())
    }
}

/// A policy paired with the candidates that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTrigger {
    pub policy: Policy,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ImagePushed,
    ImageDeleted,
    StartWebhook,
    StartPreheat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ImagePushed(ImageEvent),
    ImageDeleted(ImageEvent),
    StartWebhook(PolicyTrigger),
    StartPreheat(PolicyTrigger),
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::ImagePushed(_) => NotificationKind::ImagePushed,
            Notification::ImageDeleted(_) => NotificationKind::ImageDeleted,
            Notification::StartWebhook(_) => NotificationKind::StartWebhook,
            Notification::StartPreheat(_) => NotificationKind::StartPreheat,
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("no handlers subscribed to topic '{0}'")]
    NoSubscribers(Topic),
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler expected {expected:?} notification, got {got:?}")]
    UnexpectedNotification {
        expected: NotificationKind,
        got: NotificationKind,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("{} of {total} policies failed: {}", .errors.len(), .errors.join("; "))]
    Aggregate { total: usize, errors: Vec<String> },
}

impl HandlerError {
    pub fn unexpected(expected: NotificationKind, got: &Notification) -> Self {
        HandlerError::UnexpectedNotification {
            expected,
            got: got.kind(),
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, bus: &EventBus, notification: &Notification)
    -> Result<(), HandlerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub topic: Topic,
    pub handled: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct EventBusBuilder {
    handlers: BTreeMap<Topic, Vec<Arc<dyn EventHandler>>>,
    metrics: Option<Arc<Metrics>>,
}

impl EventBusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(mut self, topic: Topic, handler: Arc<dyn EventHandler>) -> Self {
        debug!(%topic, handler = handler.name(), "Handler subscribed");
        self.handlers.entry(topic).or_default().push(handler);
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> EventBus {
        EventBus {
            inner: Arc::new(Registry {
                handlers: self.handlers,
                metrics: self.metrics.unwrap_or_default(),
            }),
        }
    }
}

struct Registry {
    handlers: BTreeMap<Topic, Vec<Arc<dyn EventHandler>>>,
    metrics: Arc<Metrics>,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Registry>,
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.handlers.get(&topic).map_or(0, Vec::len)
    }

    pub async fn publish(
        &self,
        topic: Topic,
        notification: &Notification,
    ) -> Result<PublishReport, BusError> {
        let handlers = self
            .inner
            .handlers
            .get(&topic)
            .filter(|handlers| !handlers.is_empty())
            .ok_or(BusError::NoSubscribers(topic))?;

        self.inner.metrics.event_published();
        let mut report = PublishReport {
            topic,
            handled: 0,
            failed: 0,
        };

        for handler in handlers {
            match handler.handle(self, notification).await {
                Ok(()) => report.handled += 1,
                Err(e) => {
                    error!(%topic, handler = handler.name(), error = %e, "Event handler failed");
                    self.inner.metrics.handler_failed();
                    report.failed += 1;
                }
            }
        }

        debug!(%topic, handled = report.handled, failed = report.failed, "Notification published");
        Ok(report)
    }
}
