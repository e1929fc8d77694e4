//! Dispatch coordination.
//!
//! [`Coordinator`] turns one policy trigger into delivery jobs:
//!
//! 1. skip inactive policies and policies without targets for the path
//! 2. narrow the candidates with the policy's [`FilterChain`]
//! 3. generate and serialize the payload
//! 4. per target: persist a `Pending` record, build the job descriptor with
//!    its status hook, submit, then record the correlation id (`Running`)
//!    or the failure (`Error`)
//!
//! Webhook submissions run detached; preheat submissions run inline and
//! their failures are aggregated into [`DispatchError::Submission`].

mod callback;

pub use callback::{
    CallbackError, IgnoreReason, StatusHook, StatusReport, StatusUpdate, apply_status,
};

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::filter::FilterChain;
use crate::generator::{GeneratorError, GeneratorRegistry};
use crate::ledger::{PolicyStore, StoreError};
use crate::model::{
    Candidate, DeliveryKind, DeliveryStatus, HookType, NewDeliveryRecord, Policy, Target,
    ValidationError,
};
use crate::observability::Metrics;
use crate::resolver::LabelResolver;
use crate::runner::{
    DeliveryParams, JOB_PREHEAT, JOB_WEBHOOK, JobDescriptor, JobRunner, SubmitError,
};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Base URL the job runner uses to reach the status hook endpoint.
    pub core_url: String,
    pub max_payload_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFailure {
    pub record_id: u64,
    pub address: String,
    pub error: String,
}

impl fmt::Display for SubmissionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {} ({}): {}", self.record_id, self.address, self.error)
    }
}

fn first_failure(failures: &[SubmissionFailure]) -> String {
    failures
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{failed} of {attempted} submissions failed, first: {first}", failed = .failures.len(), first = first_failure(.failures))]
    Submission {
        attempted: usize,
        failures: Vec<SubmissionFailure>,
    },
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Inactive,
    NoTargets,
    NoCandidates,
    FilteredOut,
    /// Every surviving candidate had a malformed locator.
    NoEvents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchSummary {
    Skipped(SkipReason),
    /// Ids of the delivery records created, in target order.
    Dispatched { records: Vec<u64> },
}

struct Prepared {
    hook: HookType,
    payload: String,
    targets: Vec<Target>,
}

enum Plan {
    Skip(SkipReason),
    Deliver(Prepared),
}

#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn PolicyStore>,
    runner: Arc<dyn JobRunner>,
    generators: Arc<GeneratorRegistry>,
    labels: Arc<dyn LabelResolver>,
    metrics: Arc<Metrics>,
    settings: Arc<DispatchSettings>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        runner: Arc<dyn JobRunner>,
        generators: GeneratorRegistry,
        labels: Arc<dyn LabelResolver>,
        metrics: Arc<Metrics>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            runner,
            generators: Arc::new(generators),
            labels,
            metrics,
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    /// Dispatch to every HTTP target of the policy. Submissions are
    /// detached; their failures are logged and counted, not returned.
    pub async fn start_webhook(
        &self,
        policy: &Policy,
        candidates: Vec<Candidate>,
    ) -> Result<DispatchSummary> {
        let prepared = match self.prepare(policy, candidates, DeliveryKind::Webhook).await? {
            Plan::Skip(reason) => return Ok(self.skipped(policy, reason)),
            Plan::Deliver(prepared) => prepared,
        };

        let mut records = Vec::with_capacity(prepared.targets.len());
        for target in &prepared.targets {
            let (record_id, job) =
                self.create_job(policy, &prepared, DeliveryKind::Webhook, target)?;
            records.push(record_id);

            let this = self.clone();
            let address = target.delivery_address();
            tokio::spawn(async move {
                if let Err(e) = this.submit_job(record_id, &job).await {
                    error!(record_id, %address, error = %e, "Webhook submission failed");
                }
            });
        }

        info!(
            policy_id = policy.id,
            hook = %prepared.hook,
            targets = records.len(),
            "Webhook dispatched"
        );
        Ok(DispatchSummary::Dispatched { records })
    }

    /// Dispatch to every preheat target of the policy, one after another.
    /// A failed submission does not stop the remaining targets.
    pub async fn start_preheat(
        &self,
        policy: &Policy,
        candidates: Vec<Candidate>,
    ) -> Result<DispatchSummary> {
        let prepared = match self.prepare(policy, candidates, DeliveryKind::Preheat).await? {
            Plan::Skip(reason) => return Ok(self.skipped(policy, reason)),
            Plan::Deliver(prepared) => prepared,
        };

        let mut records = Vec::with_capacity(prepared.targets.len());
        let mut failures = Vec::new();
        for target in &prepared.targets {
            let (record_id, job) =
                self.create_job(policy, &prepared, DeliveryKind::Preheat, target)?;
            records.push(record_id);

            if let Err(e) = self.submit_job(record_id, &job).await {
                warn!(record_id, address = %target.address, error = %e, "Preheat submission failed");
                failures.push(SubmissionFailure {
                    record_id,
                    address: target.delivery_address(),
                    error: e.to_string(),
                });
            }
        }

        if !failures.is_empty() {
            return Err(DispatchError::Submission {
                attempted: records.len(),
                failures,
            });
        }

        info!(policy_id = policy.id, targets = records.len(), "Preheat dispatched");
        Ok(DispatchSummary::Dispatched { records })
    }

    async fn prepare(
        &self,
        policy: &Policy,
        candidates: Vec<Candidate>,
        kind: DeliveryKind,
    ) -> Result<Plan> {
        if !policy.is_active() {
            return Ok(Plan::Skip(SkipReason::Inactive));
        }

        let targets: Vec<Target> = policy.targets_for(kind).cloned().collect();
        if targets.is_empty() {
            return Ok(Plan::Skip(SkipReason::NoTargets));
        }
        if candidates.is_empty() {
            return Ok(Plan::Skip(SkipReason::NoCandidates));
        }

        let chain = FilterChain::from_specs(&policy.filters, self.labels.clone());
        let surviving = chain.apply(candidates).await;
        if surviving.is_empty() {
            return Ok(Plan::Skip(SkipReason::FilteredOut));
        }

        let (surviving, malformed): (Vec<_>, Vec<_>) = surviving
            .into_iter()
            .partition(|candidate| candidate.split_locator().is_some());
        for candidate in malformed {
            let error = ValidationError::MalformedLocator(candidate.value);
            warn!(policy_id = policy.id, %error, "Dropping candidate");
        }
        let Some(first) = surviving.first() else {
            return Ok(Plan::Skip(SkipReason::NoEvents));
        };

        let hook = match kind {
            DeliveryKind::Webhook => first.operation,
            DeliveryKind::Preheat => HookType::P2pPreheat,
        };
        let payload = self
            .generators
            .get(hook)?
            .generate(policy, &surviving)
            .await?;
        if payload.is_empty() {
            return Ok(Plan::Skip(SkipReason::NoEvents));
        }
        let payload = serde_json::to_string(&payload)?;

        let size = payload.len() as u64;
        if size > self.settings.max_payload_bytes {
            return Err(ValidationError::PayloadTooLarge {
                size,
                max: self.settings.max_payload_bytes,
            }
            .into());
        }

        debug!(
            policy_id = policy.id,
            %hook,
            candidates = surviving.len(),
            bytes = size,
            "Payload generated"
        );
        Ok(Plan::Deliver(Prepared {
            hook,
            payload,
            targets,
        }))
    }

    fn skipped(&self, policy: &Policy, reason: SkipReason) -> DispatchSummary {
        debug!(policy_id = policy.id, ?reason, "Dispatch skipped");
        self.metrics.dispatch_skipped();
        DispatchSummary::Skipped(reason)
    }

    fn create_job(
        &self,
        policy: &Policy,
        prepared: &Prepared,
        kind: DeliveryKind,
        target: &Target,
    ) -> Result<(u64, JobDescriptor)> {
        let record_id = self.store.create_delivery_record(NewDeliveryRecord {
            policy_id: policy.id,
            hook_type: prepared.hook,
            kind,
            target_address: target.delivery_address(),
            payload: prepared.payload.clone(),
        })?;

        let name = match kind {
            DeliveryKind::Webhook => JOB_WEBHOOK,
            DeliveryKind::Preheat => JOB_PREHEAT,
        };
        let status_hook = StatusHook::new(kind, record_id).url(&self.settings.core_url);
        let parameters = DeliveryParams::for_target(target, prepared.payload.clone()).into_parameters();

        Ok((record_id, JobDescriptor::generic(name, status_hook, parameters)))
    }

    async fn submit_job(
        &self,
        record_id: u64,
        job: &JobDescriptor,
    ) -> std::result::Result<String, SubmitError> {
        match self.runner.submit(job).await {
            Ok(job_id) => {
                self.metrics.delivery_submitted();
                match self.store.set_delivery_record_correlation_id(record_id, &job_id) {
                    Ok(true) => {}
                    Ok(false) => warn!(record_id, %job_id, "Correlation id not recorded"),
                    Err(e) => error!(record_id, %job_id, error = %e, "Failed to record correlation id"),
                }
                self.mark(record_id, DeliveryStatus::Running);
                debug!(record_id, %job_id, "Job submitted");
                Ok(job_id)
            }
            Err(e) => {
                self.metrics.submission_failed();
                self.mark(record_id, DeliveryStatus::Error);
                Err(e)
            }
        }
    }

    fn mark(&self, record_id: u64, status: DeliveryStatus) {
        match self.store.update_delivery_record_status(record_id, status) {
            Ok(true) => {}
            Ok(false) => warn!(record_id, %status, "Delivery record status not updated"),
            Err(e) => error!(record_id, %status, error = %e, "Failed to update delivery record"),
        }
    }
}
