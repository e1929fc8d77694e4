use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;
use super::hook::HookType;

/// Which delivery path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    Webhook,
    Preheat,
}

impl DeliveryKind {
    /// Path segment used in status hook URLs.
    pub fn hook_segment(&self) -> &'static str {
        match self {
            DeliveryKind::Webhook => "webhook",
            DeliveryKind::Preheat => "p2ppreheat",
        }
    }

    pub fn from_hook_segment(segment: &str) -> Option<Self> {
        match segment {
            "webhook" => Some(DeliveryKind::Webhook),
            "p2ppreheat" => Some(DeliveryKind::Preheat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Running,
    Retrying,
    Success,
    Error,
    Stopped,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Success | DeliveryStatus::Error | DeliveryStatus::Stopped
        )
    }

    /// Forward-only transitions; the only cycle is Running <-> Retrying.
    /// A write to the current status is not a transition.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;

        match (self, next) {
            (Pending, Pending) => false,
            (Pending, _) => true,
            (Running, Retrying | Success | Error | Stopped) => true,
            (Retrying, Running | Success | Error | Stopped) => true,
            _ => false,
        }
    }

    /// Map a job runner status string onto the record lifecycle.
    pub fn from_runner(status: &str) -> Result<Self, ValidationError> {
        match status {
            "Pending" => Ok(DeliveryStatus::Pending),
            "Running" => Ok(DeliveryStatus::Running),
            "Retrying" | "Scheduled" => Ok(DeliveryStatus::Retrying),
            "Success" => Ok(DeliveryStatus::Success),
            "Error" => Ok(DeliveryStatus::Error),
            "Stopped" | "Cancelled" => Ok(DeliveryStatus::Stopped),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Running => "Running",
            DeliveryStatus::Retrying => "Retrying",
            DeliveryStatus::Success => "Success",
            DeliveryStatus::Error => "Error",
            DeliveryStatus::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit row tracking the lifecycle of one dispatch to one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: u64,
    pub policy_id: u64,
    pub hook_type: HookType,
    pub kind: DeliveryKind,
    pub target_address: String,
    pub status: DeliveryStatus,
    /// Serialized payload snapshot.
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a record; the store assigns id, status and timestamps.
#[derive(Debug, Clone)]
pub struct NewDeliveryRecord {
    pub policy_id: u64,
    pub hook_type: HookType,
    pub kind: DeliveryKind,
    pub target_address: String,
    pub payload: String,
}
