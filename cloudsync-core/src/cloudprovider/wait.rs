//! Bounded polling of asynchronous vendor operations
//!
//! Vendors often answer a mutation with an operation handle instead of the
//! final state. [`wait`] polls a probe at a fixed interval until it reports a
//! terminal state, the probe errors, or the timeout elapses. The vendor-side
//! operation is never cancelled on timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::error::{CloudError, Result};
use super::VirtualResource;
use crate::model::ResourceStatus;

/// Observed state of an in-flight vendor operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Succeeded,
    /// Terminal failure reported by the vendor
    Failed(String),
}

/// One status check of an in-flight operation.
///
/// Any `FnMut() -> Future<Output = Result<PollStatus>>` closure is a probe.
#[async_trait]
pub trait OperationProbe: Send {
    async fn poll(&mut self) -> Result<PollStatus>;
}

#[async_trait]
impl<F, Fut> OperationProbe for F
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<PollStatus>> + Send,
{
    async fn poll(&mut self) -> Result<PollStatus> {
        (self)().await
    }
}

/// Poll `probe` every `interval` until it is terminal or `timeout` elapses.
///
/// Probe errors are returned immediately. A terminal failure becomes
/// `CloudError::OperationFailed`; running out of time becomes
/// `CloudError::Timeout`. The last poll happens at the deadline, so a
/// timeout is reported no earlier than `timeout` and before
/// `timeout + interval`.
pub async fn wait<P: OperationProbe>(mut probe: P, interval: Duration, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        match probe.poll().await? {
            PollStatus::Succeeded => {
                debug!(
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Vendor operation completed"
                );
                return Ok(());
            }
            PollStatus::Failed(reason) => {
                warn!(polls, reason = %reason, "Vendor operation reported failure");
                return Err(CloudError::OperationFailed(reason));
            }
            PollStatus::Pending => {}
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(polls, timeout_ms = timeout.as_millis() as u64, "Vendor operation timed out");
            return Err(CloudError::Timeout(timeout));
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Wait until `resource` disappears from the vendor.
///
/// `refresh()` returning `NotFound` ends the wait successfully; a resource
/// that lands in `error` status is a failed deletion.
pub async fn wait_deleted<R>(resource: &mut R, interval: Duration, timeout: Duration) -> Result<()>
where
    R: VirtualResource + ?Sized,
{
    wait(DeletionProbe { resource }, interval, timeout).await
}

struct DeletionProbe<'r, R: ?Sized> {
    resource: &'r mut R,
}

#[async_trait]
impl<'r, R> OperationProbe for DeletionProbe<'r, R>
where
    R: VirtualResource + ?Sized,
{
    async fn poll(&mut self) -> Result<PollStatus> {
        match self.resource.refresh().await {
            Ok(()) if self.resource.status() == ResourceStatus::Error => Ok(PollStatus::Failed(
                format!("{} entered error state while deleting", self.resource.global_id()),
            )),
            Ok(()) => Ok(PollStatus::Pending),
            Err(CloudError::NotFound(_)) => Ok(PollStatus::Succeeded),
            Err(e) => Err(e),
        }
    }
}
