/// Fjall-backed persistence for policies, delivery records and the lookup
/// entities (projects, labels) the pipeline consults.
///
/// ## Write model
///
/// The dispatch coordinator and the job runner's status callback are the
/// only writers of delivery records. Status writes go through
/// [`DeliveryStatus::can_transition_to`](crate::model::DeliveryStatus::can_transition_to)
/// under a store-wide mutex; a write that is stale (unknown id, terminal
/// record, duplicate status) changes nothing and reports `false` so callers
/// can log it as a benign race.
///
/// ## Retention
///
/// Terminal records older than the configured TTL are removed by
/// [`LedgerStore::prune_terminal_records`]. Non-terminal records are never
/// pruned.
///
/// ## Usage
///
/// ```rust,ignore
/// use hookbox::ledger::{LedgerStore, PolicyStore};
///
/// let store = LedgerStore::open("data/ledger")?;
/// let policy = store.create_policy(policy)?;
/// let active = store.get_policies_by_project(policy.project_id, &PolicyQuery::active_for(HookType::PushImage))?;
/// ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use error::{Result, StoreError};
pub use pruning::PruneStats;
pub use store::LedgerStore;

use crate::model::{DeliveryRecord, DeliveryStatus, HookType, NewDeliveryRecord, Policy};

/// Filters for [`PolicyStore::get_policies_by_project`]. Soft-deleted
/// policies are always excluded.
#[derive(Debug, Clone, Default)]
pub struct PolicyQuery {
    pub hook_type: Option<HookType>,
    pub enabled_only: bool,
    pub name: Option<String>,
}

impl PolicyQuery {
    /// Enabled, non-deleted policies subscribed to `hook`.
    pub fn active_for(hook: HookType) -> Self {
        Self {
            hook_type: Some(hook),
            enabled_only: true,
            name: None,
        }
    }

    pub fn matches(&self, policy: &Policy) -> bool {
        if policy.deleted {
            return false;
        }
        if self.enabled_only && !policy.enabled {
            return false;
        }
        if let Some(hook) = self.hook_type {
            if !policy.subscribes_to(hook) {
                return false;
            }
        }
        match &self.name {
            Some(name) => &policy.name == name,
            None => true,
        }
    }
}

/// Policy lookup and delivery record bookkeeping used by the pipeline.
pub trait PolicyStore: Send + Sync {
    /// Soft-deleted policies are reported as absent.
    fn get_policy(&self, id: u64) -> Result<Option<Policy>>;

    fn get_policies_by_project(&self, project_id: u64, query: &PolicyQuery)
    -> Result<Vec<Policy>>;

    /// Persist a new record in `Pending` and return its id.
    fn create_delivery_record(&self, record: NewDeliveryRecord) -> Result<u64>;

    /// `Ok(false)` when nothing changed: unknown id, or a transition the
    /// record's current status does not allow.
    fn update_delivery_record_status(&self, id: u64, status: DeliveryStatus) -> Result<bool>;

    /// `Ok(false)` when nothing changed: unknown id, empty id, or a record
    /// that already carries a correlation id.
    fn set_delivery_record_correlation_id(&self, id: u64, correlation_id: &str) -> Result<bool>;

    fn get_delivery_record(&self, id: u64) -> Result<Option<DeliveryRecord>>;
}
