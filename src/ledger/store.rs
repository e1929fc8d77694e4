use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::error::{Result, StoreError};
use super::partitions::{
    META_LAST_PRUNE, META_NEXT_POLICY_ID, META_NEXT_RECORD_ID, encode_label_key, encode_meta_key,
    encode_policy_key, encode_project_key, encode_record_key,
};
use super::pruning::{PruneStats, prune_terminal_records};
use super::{PolicyQuery, PolicyStore};
use crate::model::{
    DeliveryRecord, DeliveryStatus, Label, NewDeliveryRecord, Policy, Project,
};
use crate::resolver::{self, LabelResolver, ProjectResolver, ResolverError};

/// Fjall-backed ledger
#[derive(Clone)]
pub struct LedgerStore {
    keyspace: Keyspace,
    policies: PartitionHandle,
    records: PartitionHandle,
    projects: PartitionHandle,
    labels: PartitionHandle,
    metadata: PartitionHandle,
    next_policy_id: Arc<AtomicU64>,
    next_record_id: Arc<AtomicU64>,
    write_lock: Arc<Mutex<()>>,
}

impl LedgerStore {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let policies = keyspace.open_partition("policies", PartitionCreateOptions::default())?;
        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let projects = keyspace.open_partition("projects", PartitionCreateOptions::default())?;
        let labels = keyspace.open_partition("labels", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let next_policy_id = load_counter(&metadata, META_NEXT_POLICY_ID)?;
        let next_record_id = load_counter(&metadata, META_NEXT_RECORD_ID)?;
        info!(next_policy_id, next_record_id, "Ledger opened");

        Ok(Self {
            keyspace,
            policies,
            records,
            projects,
            labels,
            metadata,
            next_policy_id: Arc::new(AtomicU64::new(next_policy_id)),
            next_record_id: Arc::new(AtomicU64::new(next_record_id)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn allocate_id(&self, counter: &AtomicU64, meta_key: &str) -> Result<u64> {
        let id = counter.fetch_add(1, Ordering::SeqCst);
        self.metadata
            .insert(encode_meta_key(meta_key), (id + 1).to_be_bytes())?;
        Ok(id)
    }

    /// Create a policy. Names and target addresses must be unique among the
    /// project's live policies.
    pub fn create_policy(&self, mut policy: Policy) -> Result<Policy> {
        policy.validate()?;
        let _guard = self.lock()?;

        self.ensure_unique(&policy, None)?;

        let now = Utc::now();
        policy.id = self.allocate_id(&self.next_policy_id, META_NEXT_POLICY_ID)?;
        policy.deleted = false;
        policy.created_at = now;
        policy.updated_at = now;
        put_json(&self.policies, encode_policy_key(policy.id), &policy)?;

        info!(policy_id = policy.id, project_id = policy.project_id, name = %policy.name, "Policy created");
        Ok(policy)
    }

    pub fn update_policy(&self, mut policy: Policy) -> Result<Policy> {
        policy.validate()?;
        let _guard = self.lock()?;

        let existing: Policy = get_json(&self.policies, encode_policy_key(policy.id))?
            .filter(|p: &Policy| !p.deleted)
            .ok_or_else(|| StoreError::not_found("policy", policy.id))?;

        self.ensure_unique(&policy, Some(policy.id))?;

        policy.deleted = false;
        policy.created_at = existing.created_at;
        policy.updated_at = Utc::now();
        put_json(&self.policies, encode_policy_key(policy.id), &policy)?;

        debug!(policy_id = policy.id, "Policy updated");
        Ok(policy)
    }

    pub fn soft_delete_policy(&self, id: u64) -> Result<()> {
        let _guard = self.lock()?;

        let mut policy: Policy = get_json(&self.policies, encode_policy_key(id))?
            .filter(|p: &Policy| !p.deleted)
            .ok_or_else(|| StoreError::not_found("policy", id))?;

        policy.deleted = true;
        policy.updated_at = Utc::now();
        put_json(&self.policies, encode_policy_key(id), &policy)?;

        info!(policy_id = id, "Policy soft-deleted");
        Ok(())
    }

    fn ensure_unique(&self, candidate: &Policy, exclude: Option<u64>) -> Result<()> {
        let siblings = scan_json::<Policy>(&self.policies)?
            .into_iter()
            .filter(|p| p.project_id == candidate.project_id && !p.deleted)
            .filter(|p| Some(p.id) != exclude);

        for sibling in siblings {
            if sibling.name == candidate.name {
                return Err(StoreError::Conflict(format!(
                    "policy name '{}' already exists in project {}",
                    candidate.name, candidate.project_id
                )));
            }
            for target in &candidate.targets {
                if sibling.targets.iter().any(|t| t.address == target.address) {
                    return Err(StoreError::Conflict(format!(
                        "target '{}' is already used by policy {}",
                        target.address, sibling.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn put_project(&self, project: &Project) -> Result<()> {
        put_json(&self.projects, encode_project_key(project.id), project)
    }

    pub fn project(&self, id: u64) -> Result<Option<Project>> {
        get_json(&self.projects, encode_project_key(id))
    }

    pub fn put_label(&self, label: &Label) -> Result<()> {
        put_json(&self.labels, encode_label_key(label.id), label)
    }

    pub fn label(&self, id: i64) -> Result<Option<Label>> {
        get_json(&self.labels, encode_label_key(id))
    }

    /// Soft-delete a label. Returns `false` if it does not exist.
    pub fn delete_label(&self, id: i64) -> Result<bool> {
        let _guard = self.lock()?;
        match self.label(id)? {
            Some(mut label) => {
                label.deleted = true;
                self.put_label(&label)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn list_delivery_records(&self, policy_id: u64) -> Result<Vec<DeliveryRecord>> {
        Ok(scan_json::<DeliveryRecord>(&self.records)?
            .into_iter()
            .filter(|r| r.policy_id == policy_id)
            .collect())
    }

    /// Remove terminal records last updated before `now - ttl`.
    pub fn prune_terminal_records(&self, ttl: chrono::Duration) -> Result<PruneStats> {
        let _guard = self.lock()?;
        let cutoff = Utc::now() - ttl;
        info!(%cutoff, "Pruning terminal delivery records");

        let stats = prune_terminal_records(&self.records, cutoff)?;
        self.metadata.insert(
            encode_meta_key(META_LAST_PRUNE),
            Utc::now().to_rfc3339().as_bytes(),
        )?;
        self.persist()?;

        info!(?stats, "Pruning completed");
        Ok(stats)
    }

    pub fn last_prune(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.metadata.get(encode_meta_key(META_LAST_PRUNE))? else {
            return Ok(None);
        };
        Ok(std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc)))
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

impl PolicyStore for LedgerStore {
    fn get_policy(&self, id: u64) -> Result<Option<Policy>> {
        Ok(get_json::<Policy>(&self.policies, encode_policy_key(id))?.filter(|p| !p.deleted))
    }

    fn get_policies_by_project(
        &self,
        project_id: u64,
        query: &PolicyQuery,
    ) -> Result<Vec<Policy>> {
        Ok(scan_json::<Policy>(&self.policies)?
            .into_iter()
            .filter(|p| p.project_id == project_id && query.matches(p))
            .collect())
    }

    fn create_delivery_record(&self, record: NewDeliveryRecord) -> Result<u64> {
        let id = self.allocate_id(&self.next_record_id, META_NEXT_RECORD_ID)?;
        let now = Utc::now();
        let record = DeliveryRecord {
            id,
            policy_id: record.policy_id,
            hook_type: record.hook_type,
            kind: record.kind,
            target_address: record.target_address,
            status: DeliveryStatus::Pending,
            payload: record.payload,
            correlation_id: None,
            created_at: now,
            updated_at: now,
        };
        put_json(&self.records, encode_record_key(id), &record)?;

        debug!(record_id = id, policy_id = record.policy_id, "Delivery record created");
        Ok(id)
    }

    fn update_delivery_record_status(&self, id: u64, status: DeliveryStatus) -> Result<bool> {
        let _guard = self.lock()?;

        let Some(mut record) = get_json::<DeliveryRecord>(&self.records, encode_record_key(id))?
        else {
            return Ok(false);
        };
        if !record.status.can_transition_to(status) {
            debug!(record_id = id, from = %record.status, to = %status, "Status transition rejected");
            return Ok(false);
        }

        record.status = status;
        record.updated_at = Utc::now();
        put_json(&self.records, encode_record_key(id), &record)?;
        Ok(true)
    }

    fn set_delivery_record_correlation_id(&self, id: u64, correlation_id: &str) -> Result<bool> {
        if correlation_id.is_empty() {
            return Ok(false);
        }
        let _guard = self.lock()?;

        let Some(mut record) = get_json::<DeliveryRecord>(&self.records, encode_record_key(id))?
        else {
            return Ok(false);
        };
        if record.correlation_id.as_deref().is_some_and(|c| !c.is_empty()) {
            return Ok(false);
        }

        record.correlation_id = Some(correlation_id.to_string());
        record.updated_at = Utc::now();
        put_json(&self.records, encode_record_key(id), &record)?;
        Ok(true)
    }

    fn get_delivery_record(&self, id: u64) -> Result<Option<DeliveryRecord>> {
        get_json(&self.records, encode_record_key(id))
    }
}

#[async_trait]
impl ProjectResolver for LedgerStore {
    async fn get_project(&self, id: u64) -> resolver::Result<Option<Project>> {
        self.project(id)
            .map_err(|e| ResolverError::Backend(e.to_string()))
    }
}

#[async_trait]
impl LabelResolver for LedgerStore {
    async fn get_label(&self, id: i64) -> resolver::Result<Option<Label>> {
        self.label(id).map_err(|e| ResolverError::Backend(e.to_string()))
    }
}

fn load_counter(metadata: &PartitionHandle, key: &str) -> Result<u64> {
    Ok(metadata
        .get(encode_meta_key(key))?
        .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_ref()).ok())
        .map(u64::from_be_bytes)
        .unwrap_or(1))
}

fn put_json<T: Serialize>(partition: &PartitionHandle, key: Vec<u8>, value: &T) -> Result<()> {
    partition.insert(key, serde_json::to_vec(value)?)?;
    Ok(())
}

fn get_json<T: DeserializeOwned>(partition: &PartitionHandle, key: Vec<u8>) -> Result<Option<T>> {
    match partition.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
        None => Ok(None),
    }
}

fn scan_json<T: DeserializeOwned>(partition: &PartitionHandle) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for item in partition.iter() {
        let (_, value) = item?;
        out.push(serde_json::from_slice(&value)?);
    }
    Ok(out)
}
