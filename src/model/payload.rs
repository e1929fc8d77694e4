use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hook::HookType;

pub const MEDIA_TYPE_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Serialized body of a delivery. Untagged on the wire: push payloads carry
/// `event_type`, preheat notifications do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobPayload {
    Push(PushPayload),
    Preheat(Notification),
}

impl JobPayload {
    pub fn event_type(&self) -> HookType {
        match self {
            JobPayload::Push(payload) => payload.event_type,
            JobPayload::Preheat(_) => HookType::P2pPreheat,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            JobPayload::Push(payload) => payload.events.len(),
            JobPayload::Preheat(notification) => notification.events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    pub event_type: HookType,
    pub events: Vec<PushEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub project: String,
    /// Repository name without the project prefix.
    pub repo_name: String,
    pub tag: String,
    /// `project/repository`.
    pub full_name: String,
    pub trigger_time: DateTime<Utc>,
    pub digest: String,
    pub media_type: String,
    pub project_type: ProjectType,
    pub resource_url: String,
}

/// Registry-style notification envelope sent to preheat targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub events: Vec<NotificationEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub target: NotificationTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTarget {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub repository: String,
    pub url: String,
    pub tag: String,
}
