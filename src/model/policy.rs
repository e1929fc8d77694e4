use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::ValidationError;
use super::delivery::DeliveryKind;
use super::hook::HookType;

const MAX_NAME_LEN: usize = 256;

/// Operator configuration binding a project scope to delivery targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Policy {
    #[serde(default)]
    #[builder(default)]
    pub id: u64,
    #[builder(into)]
    pub name: String,
    #[serde(default)]
    #[builder(into, default)]
    pub description: String,
    pub project_id: u64,
    #[serde(default = "default_enabled")]
    #[builder(default = true)]
    pub enabled: bool,
    #[serde(default)]
    #[builder(default)]
    pub deleted: bool,
    #[builder(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    #[builder(default)]
    pub filters: Vec<FilterSpec>,
    #[builder(default)]
    pub hook_types: BTreeSet<HookType>,
    #[serde(default = "Utc::now")]
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Policy {
    /// Disabled or soft-deleted policies never take part in resolution.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.deleted
    }

    pub fn subscribes_to(&self, hook: HookType) -> bool {
        self.hook_types.contains(&hook)
    }

    /// Targets served by the given delivery path, in configured order.
    pub fn targets_for(&self, kind: DeliveryKind) -> impl Iterator<Item = &Target> {
        self.targets
            .iter()
            .filter(move |target| target.delivery_kind() == kind)
    }

    /// Copy of the policy with every target secret removed.
    pub fn redacted(&self) -> Self {
        let mut policy = self.clone();
        for target in &mut policy.targets {
            target.secret = None;
        }
        policy
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::NameTooLong { max: MAX_NAME_LEN });
        }
        if self.targets.is_empty() {
            return Err(ValidationError::NoTargets);
        }
        if self.hook_types.is_empty() {
            return Err(ValidationError::NoHookTypes);
        }
        for target in &self.targets {
            target.validate()?;
        }
        for spec in &self.filters {
            spec.validate()?;
        }
        Ok(())
    }
}

/// Peer-distribution provider. `0` speaks the registry notification
/// endpoint convention, anything else receives the address verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PreheatProvider {
    Kraken,
    Generic(u8),
}

impl From<u8> for PreheatProvider {
    fn from(value: u8) -> Self {
        match value {
            0 => PreheatProvider::Kraken,
            other => PreheatProvider::Generic(other),
        }
    }
}

impl From<PreheatProvider> for u8 {
    fn from(value: PreheatProvider) -> Self {
        match value {
            PreheatProvider::Kraken => 0,
            PreheatProvider::Generic(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Http,
    Preheat { provider: PreheatProvider },
}

/// A delivery destination.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Target {
    #[serde(default)]
    #[builder(default)]
    pub kind: TargetKind,
    #[builder(into)]
    pub address: String,
    /// Write-only; redacted from `Debug` and from [`Policy::redacted`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub secret: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub skip_cert_verify: bool,
    /// Per-target request deadline, overriding the delivery default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("skip_cert_verify", &self.skip_cert_verify)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Target {
    pub fn delivery_kind(&self) -> DeliveryKind {
        match self.kind {
            TargetKind::Http => DeliveryKind::Webhook,
            TargetKind::Preheat { .. } => DeliveryKind::Preheat,
        }
    }

    /// URL the delivery executor POSTs to.
    pub fn delivery_address(&self) -> String {
        match self.kind {
            TargetKind::Preheat {
                provider: PreheatProvider::Kraken,
            } => {
                let mut url = self.address.clone();
                if !url.ends_with('/') {
                    url.push('/');
                }
                url.push_str("registry/notifications");
                url
            }
            _ => self.address.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_http_url(&self.address)
    }
}

pub(crate) fn validate_http_url(address: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    if address.trim().is_empty() {
        return Err(invalid("address is empty".to_string()));
    }
    let url = reqwest::Url::parse(address).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Repository,
    Tag,
    Label,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Repository => "repository",
            FilterKind::Tag => "tag",
            FilterKind::Label => "label",
        }
    }
}

/// One match rule of a policy, decoded into its typed form at the
/// deserialization boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FilterSpec {
    Repository(String),
    Tag(String),
    Label(i64),
}

impl FilterSpec {
    pub fn kind(&self) -> FilterKind {
        match self {
            FilterSpec::Repository(_) => FilterKind::Repository,
            FilterSpec::Tag(_) => FilterKind::Tag,
            FilterSpec::Label(_) => FilterKind::Label,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            FilterSpec::Repository(pattern) | FilterSpec::Tag(pattern) if !pattern.is_empty() => {
                glob::Pattern::new(pattern)
                    .map(|_| ())
                    .map_err(|e| ValidationError::InvalidPattern {
                        kind: self.kind().as_str(),
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })
            }
            _ => Ok(()),
        }
    }
}

/// An artifact event eligible for filtering before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: FilterKind,
    /// Fully-qualified resource locator, `repository:tag`.
    pub value: String,
    pub operation: HookType,
    #[serde(default)]
    pub labels: Vec<i64>,
}

impl Candidate {
    pub fn image(repository: &str, tag: &str, operation: HookType) -> Self {
        Self {
            kind: FilterKind::Tag,
            value: format!("{}:{}", repository, tag),
            operation,
            labels: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: impl IntoIterator<Item = i64>) -> Self {
        self.labels = labels.into_iter().collect();
        self
    }

    /// Split the locator at its last `:` into repository and tag. The
    /// repository may carry a registry port (`host:5000/lib/app`), a tag
    /// never contains `:` or `/`.
    pub fn split_locator(&self) -> Option<(&str, &str)> {
        self.value.rsplit_once(':').filter(|(repository, tag)| {
            !repository.is_empty() && !tag.is_empty() && !tag.contains('/')
        })
    }

    pub fn repository(&self) -> Option<&str> {
        self.split_locator().map(|(repository, _)| repository)
    }

    pub fn tag(&self) -> Option<&str> {
        self.split_locator().map(|(_, tag)| tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
}
