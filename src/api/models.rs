//! Response bodies for the status hook and operator endpoints.
//!
//! Request bodies reuse domain types directly: the status hook accepts a
//! [`StatusReport`](crate::dispatch::StatusReport), and the read endpoints
//! return [`DeliveryRecord`](crate::model::DeliveryRecord) and a redacted
//! [`Policy`](crate::model::Policy).

use serde::Serialize;
use std::collections::BTreeMap;

use crate::dispatch::{IgnoreReason, StatusUpdate};
use crate::model::DeliveryStatus;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Applied,
    Ignored,
}

/// Result of a status hook call. Ignored reports still answer 200 so the
/// job runner does not retry them.
#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub record_id: u64,
    pub outcome: CallbackOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IgnoreReason>,
}

impl From<StatusUpdate> for CallbackResponse {
    fn from(update: StatusUpdate) -> Self {
        match update {
            StatusUpdate::Applied { record_id, status } => Self {
                record_id,
                outcome: CallbackOutcome::Applied,
                status: Some(status),
                reason: None,
            },
            StatusUpdate::Ignored { record_id, reason } => Self {
                record_id,
                outcome: CallbackOutcome::Ignored,
                status: None,
                reason: Some(reason),
            },
        }
    }
}
