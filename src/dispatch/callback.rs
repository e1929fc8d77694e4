//! Status hook locators and the callback write path.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ledger::{PolicyStore, StoreError};
use crate::model::{DeliveryKind, DeliveryStatus, ValidationError};

const HOOK_PATH: &str = "/service/notifications/jobs/";

/// Identifies the record a job runner reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusHook {
    pub kind: DeliveryKind,
    pub record_id: u64,
}

impl StatusHook {
    pub fn new(kind: DeliveryKind, record_id: u64) -> Self {
        Self { kind, record_id }
    }

    /// `{core_url}/service/notifications/jobs/{webhook|p2ppreheat}/{id}`
    pub fn url(&self, core_url: &str) -> String {
        format!(
            "{}{}{}/{}",
            core_url.trim_end_matches('/'),
            HOOK_PATH,
            self.kind.hook_segment(),
            self.record_id
        )
    }

    pub fn parse(url: &str) -> Option<Self> {
        let start = url.find(HOOK_PATH)? + HOOK_PATH.len();
        let (segment, id) = url[start..].split_once('/')?;
        Some(Self {
            kind: DeliveryKind::from_hook_segment(segment)?,
            record_id: id.trim_end_matches('/').parse().ok()?,
        })
    }
}

/// Body a job runner POSTs to a status hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub job_id: String,
    pub status: String,
}

impl StatusReport {
    pub fn new(job_id: impl Into<String>, status: DeliveryStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status: status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    UnknownRecord,
    KindMismatch,
    CorrelationMismatch,
    StaleTransition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied {
        record_id: u64,
        status: DeliveryStatus,
    },
    Ignored {
        record_id: u64,
        reason: IgnoreReason,
    },
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Apply a runner's status report to a delivery record.
///
/// Races (unknown record, mismatched correlation id, a transition the
/// record no longer allows) are reported as [`StatusUpdate::Ignored`] and
/// logged; only unknown status strings and storage failures are errors.
pub fn apply_status(
    store: &dyn PolicyStore,
    kind: DeliveryKind,
    record_id: u64,
    report: &StatusReport,
) -> Result<StatusUpdate, CallbackError> {
    let status = DeliveryStatus::from_runner(&report.status)?;
    let ignored = |reason| StatusUpdate::Ignored { record_id, reason };

    let Some(record) = store.get_delivery_record(record_id)? else {
        warn!(record_id, %status, "Status report for unknown record");
        return Ok(ignored(IgnoreReason::UnknownRecord));
    };

    if record.kind != kind {
        warn!(record_id, expected = ?record.kind, got = ?kind, "Status hook kind mismatch");
        return Ok(ignored(IgnoreReason::KindMismatch));
    }

    match record.correlation_id.as_deref() {
        Some(existing) if !report.job_id.is_empty() && existing != report.job_id => {
            warn!(
                record_id,
                existing,
                reported = %report.job_id,
                "Status report from a different job"
            );
            return Ok(ignored(IgnoreReason::CorrelationMismatch));
        }
        None if !report.job_id.is_empty() => {
            // The runner can call back before the coordinator records the id.
            store.set_delivery_record_correlation_id(record_id, &report.job_id)?;
        }
        _ => {}
    }

    if !store.update_delivery_record_status(record_id, status)? {
        warn!(record_id, current = %record.status, reported = %status, "Stale status report ignored");
        return Ok(ignored(IgnoreReason::StaleTransition));
    }

    debug!(record_id, %status, "Delivery record updated");
    Ok(StatusUpdate::Applied { record_id, status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStore;
    use crate::model::{HookType, NewDeliveryRecord};
    use tempfile::TempDir;

    fn open() -> (LedgerStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::open(temp_dir.path().join("ledger")).unwrap();
        (store, temp_dir)
    }

    fn record(store: &LedgerStore, kind: DeliveryKind) -> u64 {
        store
            .create_delivery_record(NewDeliveryRecord {
                policy_id: 1,
                hook_type: HookType::PushImage,
                kind,
                target_address: "http://hooks.local".into(),
                payload: "{}".into(),
            })
            .unwrap()
    }

    #[test]
    fn test_status_hook_url() {
        let hook = StatusHook::new(DeliveryKind::Preheat, 42);
        let url = hook.url("http://core:8080/");
        assert_eq!(url, "http://core:8080/service/notifications/jobs/p2ppreheat/42");
        assert_eq!(StatusHook::parse(&url), Some(hook));

        assert_eq!(StatusHook::parse("http://core/service/notifications/jobs/scan/1"), None);
        assert_eq!(StatusHook::parse("http://core/service/notifications/jobs/webhook/x"), None);
    }

    #[test]
    fn test_apply_running_then_success() {
        let (store, _dir) = open();
        let id = record(&store, DeliveryKind::Webhook);

        let update = apply_status(
            &store,
            DeliveryKind::Webhook,
            id,
            &StatusReport::new("job-1", DeliveryStatus::Running),
        )
        .unwrap();
        assert_eq!(
            update,
            StatusUpdate::Applied {
                record_id: id,
                status: DeliveryStatus::Running
            }
        );

        apply_status(
            &store,
            DeliveryKind::Webhook,
            id,
            &StatusReport::new("job-1", DeliveryStatus::Success),
        )
        .unwrap();

        let stored = store.get_delivery_record(id).unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Success);
        assert_eq!(stored.correlation_id.as_deref(), Some("job-1"));
    }

    #[test]
    fn test_terminal_record_ignores_late_reports() {
        let (store, _dir) = open();
        let id = record(&store, DeliveryKind::Webhook);
        store
            .update_delivery_record_status(id, DeliveryStatus::Error)
            .unwrap();

        let update = apply_status(
            &store,
            DeliveryKind::Webhook,
            id,
            &StatusReport::new("", DeliveryStatus::Running),
        )
        .unwrap();
        assert_eq!(
            update,
            StatusUpdate::Ignored {
                record_id: id,
                reason: IgnoreReason::StaleTransition
            }
        );
        assert_eq!(
            store.get_delivery_record(id).unwrap().unwrap().status,
            DeliveryStatus::Error
        );
    }

    #[test]
    fn test_mismatched_reports_are_ignored() {
        let (store, _dir) = open();
        let id = record(&store, DeliveryKind::Webhook);
        store.set_delivery_record_correlation_id(id, "job-1").unwrap();

        let other_job = apply_status(
            &store,
            DeliveryKind::Webhook,
            id,
            &StatusReport::new("job-2", DeliveryStatus::Success),
        )
        .unwrap();
        assert!(matches!(
            other_job,
            StatusUpdate::Ignored {
                reason: IgnoreReason::CorrelationMismatch,
                ..
            }
        ));

        let wrong_kind = apply_status(
            &store,
            DeliveryKind::Preheat,
            id,
            &StatusReport::new("job-1", DeliveryStatus::Success),
        )
        .unwrap();
        assert!(matches!(
            wrong_kind,
            StatusUpdate::Ignored {
                reason: IgnoreReason::KindMismatch,
                ..
            }
        ));

        let missing = apply_status(
            &store,
            DeliveryKind::Webhook,
            9_999,
            &StatusReport::new("job-1", DeliveryStatus::Success),
        )
        .unwrap();
        assert!(matches!(
            missing,
            StatusUpdate::Ignored {
                reason: IgnoreReason::UnknownRecord,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        let (store, _dir) = open();
        let id = record(&store, DeliveryKind::Webhook);
        let report = StatusReport {
            job_id: "job-1".into(),
            status: "Exploded".into(),
        };
        assert!(matches!(
            apply_status(&store, DeliveryKind::Webhook, id, &report),
            Err(CallbackError::Validation(ValidationError::UnknownStatus(_)))
        ));
    }
}
