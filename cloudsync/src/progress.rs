//! Progress events emitted while a pass runs

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::result::{SyncOperation, SyncResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    PassStarted {
        session_id: Uuid,
        kind: String,
        owner_scope: String,
    },
    ItemApplied {
        session_id: Uuid,
        operation: SyncOperation,
        external_id: String,
    },
    ItemFailed {
        session_id: Uuid,
        operation: SyncOperation,
        external_id: String,
        error: String,
    },
    /// Another pass held the scope lock
    PassSkipped {
        session_id: Uuid,
        kind: String,
        owner_scope: String,
    },
    PassCompleted {
        session_id: Uuid,
        kind: String,
        owner_scope: String,
        added: usize,
        updated: usize,
        deleted: usize,
        errors: usize,
        duration: Duration,
        aborted: bool,
    },
}

/// Receiving end of the progress stream
pub struct ProgressChannel {
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressChannel {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (ProgressReporter, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ProgressReporter { sender }, Self { receiver })
    }

    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Next buffered event, if any
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Sending end, cloned into every reconciler that reports progress.
///
/// Sends never fail: once the channel is gone, events are dropped.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn pass_started(&self, result: &SyncResult) {
        self.send(ProgressEvent::PassStarted {
            session_id: result.session_id,
            kind: result.kind.clone(),
            owner_scope: result.owner_scope.clone(),
        });
    }

    pub fn item_applied(&self, result: &SyncResult, operation: SyncOperation, external_id: &str) {
        self.send(ProgressEvent::ItemApplied {
            session_id: result.session_id,
            operation,
            external_id: external_id.to_string(),
        });
    }

    /// Report the most recent failure recorded in `result`
    pub fn item_failed(&self, result: &SyncResult) {
        if let Some(failure) = result.failures.last() {
            self.send(ProgressEvent::ItemFailed {
                session_id: result.session_id,
                operation: failure.operation,
                external_id: failure.external_id.clone(),
                error: failure.error.to_string(),
            });
        }
    }

    pub fn pass_skipped(&self, result: &SyncResult) {
        self.send(ProgressEvent::PassSkipped {
            session_id: result.session_id,
            kind: result.kind.clone(),
            owner_scope: result.owner_scope.clone(),
        });
    }

    pub fn pass_completed(&self, result: &SyncResult) {
        self.send(ProgressEvent::PassCompleted {
            session_id: result.session_id,
            kind: result.kind.clone(),
            owner_scope: result.owner_scope.clone(),
            added: result.added,
            updated: result.updated,
            deleted: result.deleted,
            errors: result.total_errors(),
            duration: result.duration,
            aborted: result.is_aborted(),
        });
    }

    fn send(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            trace!("Progress receiver dropped, discarding event");
        }
    }
}
