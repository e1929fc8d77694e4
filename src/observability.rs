//! Process-local counters for the notification pipeline.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter handle shared by the bus, the coordinator and the callback path.
#[derive(Debug, Default)]
pub struct Metrics {
    events_published: AtomicU64,
    handler_failures: AtomicU64,
    dispatches_skipped: AtomicU64,
    deliveries_submitted: AtomicU64,
    submissions_failed: AtomicU64,
    callbacks_applied: AtomicU64,
    callbacks_ignored: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = name, "Metric incremented");
    }

    pub fn event_published(&self) {
        Self::bump(&self.events_published, "events_published");
    }

    pub fn handler_failed(&self) {
        Self::bump(&self.handler_failures, "handler_failures");
    }

    pub fn dispatch_skipped(&self) {
        Self::bump(&self.dispatches_skipped, "dispatches_skipped");
    }

    pub fn delivery_submitted(&self) {
        Self::bump(&self.deliveries_submitted, "deliveries_submitted");
    }

    pub fn submission_failed(&self) {
        Self::bump(&self.submissions_failed, "submissions_failed");
    }

    pub fn callback_applied(&self) {
        Self::bump(&self.callbacks_applied, "callbacks_applied");
    }

    pub fn callback_ignored(&self) {
        Self::bump(&self.callbacks_ignored, "callbacks_ignored");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            dispatches_skipped: self.dispatches_skipped.load(Ordering::Relaxed),
            deliveries_submitted: self.deliveries_submitted.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            callbacks_applied: self.callbacks_applied.load(Ordering::Relaxed),
            callbacks_ignored: self.callbacks_ignored.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_published: u64,
    pub handler_failures: u64,
    pub dispatches_skipped: u64,
    pub deliveries_submitted: u64,
    pub submissions_failed: u64,
    pub callbacks_applied: u64,
    pub callbacks_ignored: u64,
}
