use std::time::Duration;

use thiserror::Error;

/// Errors raised by vendor adapters and the operation waiter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Vendor operation failed: {0}")]
    OperationFailed(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid vendor response: {0}")]
    InvalidResponse(String),
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    /// Whether the vendor-side state is indeterminate after this error
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, CloudError::Timeout(_) | CloudError::OperationFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
