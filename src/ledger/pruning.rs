/// Retention for delivery records
use chrono::{DateTime, Utc};
use fjall::PartitionHandle;
use tracing::{debug, warn};

use super::error::Result;
use super::partitions::decode_record_key;
use crate::model::DeliveryRecord;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneStats {
    pub records_pruned: usize,
    pub records_retained: usize,
}

/// Remove terminal records whose last update is older than `cutoff`.
/// Pending, running and retrying records are always kept.
pub fn prune_terminal_records(
    records: &PartitionHandle,
    cutoff: DateTime<Utc>,
) -> Result<PruneStats> {
    let mut stats = PruneStats::default();
    let mut expired = Vec::new();

    for item in records.iter() {
        let (key, value) = item?;
        let record: DeliveryRecord = match serde_json::from_slice(&value) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = ?decode_record_key(&key), error = %e, "Skipping unreadable record");
                stats.records_retained += 1;
                continue;
            }
        };

        if record.status.is_terminal() && record.updated_at < cutoff {
            expired.push(key);
        } else {
            stats.records_retained += 1;
        }
    }

    for key in expired {
        debug!(record_id = ?decode_record_key(&key), "Pruning record");
        records.remove(key)?;
        stats.records_pruned += 1;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use crate::ledger::{LedgerStore, PolicyStore};
    use crate::model::{DeliveryKind, DeliveryStatus, HookType, NewDeliveryRecord};
    use tempfile::TempDir;

    fn record() -> NewDeliveryRecord {
        NewDeliveryRecord {
            policy_id: 1,
            hook_type: HookType::PushImage,
            kind: DeliveryKind::Webhook,
            target_address: "http://hooks.local".into(),
            payload: "{}".into(),
        }
    }

    #[test]
    fn test_only_terminal_records_are_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::open(temp_dir.path().join("ledger")).unwrap();

        let done = store.create_delivery_record(record()).unwrap();
        store
            .update_delivery_record_status(done, DeliveryStatus::Success)
            .unwrap();
        let running = store.create_delivery_record(record()).unwrap();
        store
            .update_delivery_record_status(running, DeliveryStatus::Running)
            .unwrap();

        // A negative TTL puts the cutoff in the future so every terminal
        // record counts as expired.
        let stats = store
            .prune_terminal_records(chrono::Duration::seconds(-60))
            .unwrap();
        assert_eq!(stats.records_pruned, 1);
        assert_eq!(stats.records_retained, 1);

        assert!(store.get_delivery_record(done).unwrap().is_none());
        assert!(store.get_delivery_record(running).unwrap().is_some());
        assert!(store.last_prune().unwrap().is_some());
    }

    #[test]
    fn test_recent_terminal_records_are_kept() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::open(temp_dir.path().join("ledger")).unwrap();

        let done = store.create_delivery_record(record()).unwrap();
        store
            .update_delivery_record_status(done, DeliveryStatus::Error)
            .unwrap();

        let stats = store
            .prune_terminal_records(chrono::Duration::days(30))
            .unwrap();
        assert_eq!(stats.records_pruned, 0);
        assert!(store.get_delivery_record(done).unwrap().is_some());
    }
}
