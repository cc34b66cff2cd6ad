//! Error types for reconcile passes

use std::time::Duration;

use cloudsync_core::{CloudError, StoreError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result type alias for reconciler operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Everything that can go wrong in a pass or an explicit resource operation.
///
/// Values are cloneable and serializable so they can be carried inside a
/// [`SyncResult`](crate::SyncResult) as data.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum SyncError {
    /// Another pass holds the lock for this kind and scope
    #[error("A pass is already running for {scope}")]
    AlreadySyncing { scope: String },

    /// The vendor could not produce a complete remote listing
    #[error("Vendor adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// The remote listing reported the same external id twice
    #[error("Duplicate external id in remote listing: {0}")]
    DuplicateExternalId(String),

    #[error("Record {id} changed concurrently (expected version {expected}, found {found})")]
    PersistenceConflict { id: Uuid, expected: u64, found: u64 },

    #[error("Vendor operation failed: {0}")]
    OperationFailed(String),

    #[error("Vendor operation timed out after {0:?}")]
    Timeout(Duration),

    /// The provider does not expose this resource kind
    #[error("Provider {provider} does not support {kind}")]
    Unsupported { kind: String, provider: String },

    #[error("Invalid observation for '{external_id}': {reason}")]
    InvalidObservation { external_id: String, reason: String },

    #[error("Vendor error: {0}")]
    Vendor(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn invalid_observation(external_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidObservation {
            external_id: external_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the vendor may or may not have applied the operation
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, SyncError::Timeout(_) | SyncError::OperationFailed(_))
    }
}

impl From<CloudError> for SyncError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Timeout(after) => SyncError::Timeout(after),
            CloudError::OperationFailed(reason) => SyncError::OperationFailed(reason),
            other => SyncError::Vendor(other.to_string()),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { id, expected, found } => {
                SyncError::PersistenceConflict { id, expected, found }
            }
            other => SyncError::Store(other.to_string()),
        }
    }
}
