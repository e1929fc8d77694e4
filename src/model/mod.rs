//! Domain entities shared by every stage of the pipeline.
//!
//! - [`Policy`] / [`Target`] / [`FilterSpec`]: operator configuration
//! - [`Candidate`]: an artifact event eligible for filtering
//! - [`DeliveryRecord`] / [`DeliveryStatus`]: audit row for one dispatch
//! - [`JobPayload`]: the serialized body POSTed to a destination

mod delivery;
mod hook;
mod payload;
mod policy;

pub use delivery::{DeliveryKind, DeliveryRecord, DeliveryStatus, NewDeliveryRecord};
pub use hook::HookType;
pub use payload::{
    JobPayload, MEDIA_TYPE_MANIFEST_V2, Notification as PreheatNotification, NotificationEvent,
    NotificationTarget, ProjectType, PushEvent, PushPayload,
};
pub use policy::{
    Candidate, FilterKind, FilterSpec, Label, Policy, PreheatProvider, Project, Target, TargetKind,
};

use thiserror::Error;

/// Malformed policy, filter or status input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("policy name must not be empty")]
    EmptyName,

    #[error("policy name exceeds {max} characters")]
    NameTooLong { max: usize },

    #[error("policy must have at least one target")]
    NoTargets,

    #[error("policy must subscribe to at least one hook type")]
    NoHookTypes,

    #[error("invalid target address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid {kind} pattern '{pattern}': {reason}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("unknown job status '{0}'")]
    UnknownStatus(String),

    #[error("malformed resource locator '{0}', expected repository:tag")]
    MalformedLocator(String),

    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: u64, max: u64 },
}
