//! Outcome of one reconcile pass

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::SyncError;

/// Kind of store mutation a pass applies to one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Add,
    Update,
    Delete,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Add => write!(f, "add"),
            SyncOperation::Update => write!(f, "update"),
            SyncOperation::Delete => write!(f, "delete"),
        }
    }
}

/// One item the pass could not apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub operation: SyncOperation,
    pub external_id: String,
    pub error: SyncError,
}

/// Counters and failures of a pass, always returned as data.
///
/// `error` is set when the pass did not run to completion: skipped because
/// the scope was locked, or aborted before any item was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub session_id: Uuid,
    pub kind: String,
    pub owner_scope: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub added: usize,
    pub updated: usize,
    /// Matched pairs whose record already reflected the observation
    pub unchanged: usize,
    pub deleted: usize,
    pub add_errors: usize,
    pub update_errors: usize,
    pub delete_errors: usize,
    pub failures: Vec<ItemFailure>,
    pub error: Option<SyncError>,
}

impl SyncResult {
    pub fn new(kind: impl Into<String>, owner_scope: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            kind: kind.into(),
            owner_scope: owner_scope.into(),
            started_at: Utc::now(),
            finished_at: None,
            duration: Duration::default(),
            added: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            add_errors: 0,
            update_errors: 0,
            delete_errors: 0,
            failures: Vec::new(),
            error: None,
        }
    }

    pub fn record_added(&mut self) {
        self.added += 1;
    }

    pub fn record_updated(&mut self) {
        self.updated += 1;
    }

    pub fn record_unchanged(&mut self) {
        self.unchanged += 1;
    }

    pub fn record_deleted(&mut self) {
        self.deleted += 1;
    }

    /// Record an item failure; the pass carries on with the next item
    pub fn record_failure(&mut self, operation: SyncOperation, external_id: impl Into<String>, error: SyncError) {
        let external_id = external_id.into();
        warn!(
            kind = %self.kind,
            owner_scope = %self.owner_scope,
            operation = %operation,
            external_id = %external_id,
            error = %error,
            "Failed to apply item"
        );

        match operation {
            SyncOperation::Add => self.add_errors += 1,
            SyncOperation::Update => self.update_errors += 1,
            SyncOperation::Delete => self.delete_errors += 1,
        }
        self.failures.push(ItemFailure {
            operation,
            external_id,
            error,
        });
    }

    /// Mark the pass as not run to completion
    pub fn abort(&mut self, error: SyncError) {
        match &error {
            SyncError::AlreadySyncing { scope } => {
                info!(scope = %scope, "Skipping pass, scope is locked");
            }
            other => {
                error!(
                    kind = %self.kind,
                    owner_scope = %self.owner_scope,
                    error = %other,
                    "Pass aborted"
                );
            }
        }
        self.error = Some(error);
    }

    /// Stamp the finish time and log the counters
    pub fn complete(&mut self) {
        let finished_at = Utc::now();
        self.duration = (finished_at - self.started_at).to_std().unwrap_or_default();
        self.finished_at = Some(finished_at);

        if self.error.is_none() {
            info!(
                session_id = %self.session_id,
                kind = %self.kind,
                owner_scope = %self.owner_scope,
                duration_ms = self.duration.as_millis() as u64,
                added = self.added,
                updated = self.updated,
                unchanged = self.unchanged,
                deleted = self.deleted,
                errors = self.total_errors(),
                "Pass completed"
            );
        }
    }

    pub fn total_errors(&self) -> usize {
        self.add_errors + self.update_errors + self.delete_errors
    }

    /// Ran to completion with no item failures
    pub fn is_successful(&self) -> bool {
        self.error.is_none() && self.total_errors() == 0
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.error, Some(SyncError::AlreadySyncing { .. }))
    }

    pub fn is_aborted(&self) -> bool {
        self.error.is_some() && !self.is_skipped()
    }

    pub fn has_changes(&self) -> bool {
        self.added + self.updated + self.deleted > 0
    }

    pub fn summary(&self) -> String {
        match &self.error {
            Some(err) => format!("{} sync for {} did not complete: {}", self.kind, self.owner_scope, err),
            None => format!(
                "{} sync for {} in {:.2}s: {} added, {} updated, {} unchanged, {} deleted, {} errors",
                self.kind,
                self.owner_scope,
                self.duration.as_secs_f64(),
                self.added,
                self.updated,
                self.unchanged,
                self.deleted,
                self.total_errors()
            ),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
