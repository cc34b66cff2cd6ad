//! Reconciliation of cloud resources into a local store
//!
//! - Diffing local records against remote observations by external id
//! - Per (kind, owner scope) non-blocking locks
//! - Reconcile passes that apply deletes, updates and adds, isolating item failures
//! - Concrete kinds for load balancers, networks and policy definitions
//! - Configuration, telemetry and progress events

pub mod config;
pub mod diff;
pub mod error;
pub mod kinds;
pub mod lock;
pub mod progress;
pub mod reconciler;
pub mod result;
pub mod telemetry;
pub mod trigger;

pub use cloudsync_core;

pub use config::{CloudSyncConfig, ReconcilerSettings, WaiterSettings};
pub use diff::{diff_sets, Diff, DiffSummary};
pub use error::{Result, SyncError};
pub use lock::{InProcessLocks, LockBackend, ScopeGuard, ScopeKey, ScopeLockManager};
pub use progress::{ProgressChannel, ProgressEvent, ProgressReporter};
pub use reconciler::{Reconciler, ReconcilerOptions, ResourceKind, RetentionPolicy};
pub use result::{ItemFailure, SyncOperation, SyncResult};
pub use telemetry::{init_tracing, LogRotation, TelemetryConfig};
pub use trigger::{SyncRegistry, SyncTrigger};

#[cfg(test)]
mod reconciler_tests;
