//! Resource descriptor model shared by every synced kind

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a mirrored resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Created locally, not yet confirmed by the vendor
    #[default]
    Init,
    /// Attributes reconstructed from the latest remote observation
    Ready,
    /// The last reconstruction or vendor call failed
    Error,
    /// A vendor-side delete is in flight
    Deleting,
    /// The outcome of a vendor operation could not be determined
    Unknown,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Init => "init",
            ResourceStatus::Ready => "ready",
            ResourceStatus::Error => "error",
            ResourceStatus::Deleting => "deleting",
            ResourceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "init" => Ok(ResourceStatus::Init),
            "ready" => Ok(ResourceStatus::Ready),
            "error" => Ok(ResourceStatus::Error),
            "deleting" => Ok(ResourceStatus::Deleting),
            "unknown" => Ok(ResourceStatus::Unknown),
            other => Err(format!("unknown resource status '{}'", other)),
        }
    }
}

/// Local record of one remote resource.
///
/// `A` is the kind-specific attribute record rebuilt from vendor observations.
/// `version` is owned by the store and bumped on every effective update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor<A> {
    pub id: Uuid,
    pub kind: String,
    pub external_id: String,
    pub name: String,
    /// Vendor-side name as last observed; `name` may differ by a collision suffix
    #[serde(default)]
    pub remote_name: String,
    pub status: ResourceStatus,
    pub owner_scope: String,
    pub manager_id: Option<String>,
    pub attributes: A,
    pub version: u64,
    pub pending_deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<A> ResourceDescriptor<A> {
    /// Create a fresh descriptor with a new local id and `init` status
    pub fn new(
        kind: impl Into<String>,
        owner_scope: impl Into<String>,
        name: impl Into<String>,
        attributes: A,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            external_id: String::new(),
            name: name.into(),
            remote_name: String::new(),
            status: ResourceStatus::Init,
            owner_scope: owner_scope.into(),
            manager_id: None,
            attributes,
            version: 0,
            pending_deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = external_id.into();
        self
    }

    pub fn with_remote_name(mut self, remote_name: impl Into<String>) -> Self {
        self.remote_name = remote_name.into();
        self
    }

    pub fn with_manager(mut self, manager_id: impl Into<String>) -> Self {
        self.manager_id = Some(manager_id.into());
        self
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the resource exists on the vendor side
    pub fn is_external(&self) -> bool {
        !self.external_id.is_empty()
    }

    /// Whether a vendor account binding produced this resource
    pub fn is_managed(&self) -> bool {
        self.manager_id.as_deref().map_or(false, |id| !id.is_empty())
    }

    pub fn is_pending_delete(&self) -> bool {
        self.pending_deleted_at.is_some()
    }
}

/// Vendor-account binding (provider credential) that owns remote resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudAccount {
    /// Becomes `manager_id` on every descriptor synced through this account
    pub id: String,
    pub name: String,
    pub provider: String,
    pub domain_id: String,
}

impl CloudAccount {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        domain_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
            domain_id: domain_id.into(),
        }
    }
}
