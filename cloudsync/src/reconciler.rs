//! Reconcile passes for one resource kind
//!
//! A pass locks (kind, owner scope), loads the local records produced by one
//! vendor account, lists the remote side, diffs the two by external id and
//! applies deletes, then updates, then adds. Item failures are recorded in
//! the returned [`SyncResult`] and never stop the batch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cloudsync_core::cloudprovider::Result as CloudResult;
use cloudsync_core::{
    CloudAccount, CloudError, CloudProvider, CloudResource, NameGenerator, RemoteLister,
    ResourceDescriptor, ResourceStatus, ResourceStore, StoreError, StoreNameGenerator,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::diff::diff_sets;
use crate::error::{Result, SyncError};
use crate::lock::{ScopeGuard, ScopeKey, ScopeLockManager};
use crate::progress::ProgressReporter;
use crate::result::{SyncOperation, SyncResult};

/// Everything a reconciler needs to know about one resource kind
#[async_trait]
pub trait ResourceKind: Send + Sync + 'static {
    /// Vendor handle produced by the kind's lister
    type Observation: CloudResource + 'static;

    /// Attributes cached on the local record
    type Attributes: Clone + fmt::Debug + PartialEq + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// The provider's lister for this kind, `None` if it lacks the capability
    fn lister<'p>(&self, provider: &'p dyn CloudProvider) -> Option<&'p dyn RemoteLister<Self::Observation>>;

    /// Rebuild cached attributes from a vendor observation
    async fn construct(&self, observation: &Self::Observation) -> Result<Self::Attributes>;

    /// Re-read vendor state through the handle
    async fn refresh(&self, _observation: &mut Self::Observation) -> CloudResult<()> {
        Err(CloudError::NotSupported(format!("refresh {}", self.name())))
    }

    /// Delete on the vendor side and wait until the resource is gone
    async fn remove_remote(
        &self,
        _observation: &mut Self::Observation,
        _interval: Duration,
        _timeout: Duration,
    ) -> CloudResult<()> {
        Err(CloudError::NotSupported(format!("delete {}", self.name())))
    }

    /// Follow-up once a pass has added or merged `descriptor` for `account`.
    ///
    /// Runs on every match, so implementations must be idempotent. A failure
    /// is recorded against the item; the stored record is kept.
    async fn after_apply(&self, _descriptor: &ResourceDescriptor<Self::Attributes>, _account: &CloudAccount) -> Result<()> {
        Ok(())
    }
}

/// What happens to a record whose remote counterpart disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Mark pending delete; purged once the grace window has passed
    #[default]
    SoftDelete,
    HardDelete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerOptions {
    pub retention: RetentionPolicy,
    /// How long a soft-deleted record survives before purge
    pub pending_delete_grace: Duration,
    pub wait_interval: Duration,
    pub wait_timeout: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::SoftDelete,
            pending_delete_grace: Duration::from_secs(60 * 60),
            wait_interval: Duration::from_secs(5),
            wait_timeout: Duration::from_secs(60),
        }
    }
}

pub struct Reconciler<K: ResourceKind, S> {
    kind: K,
    store: Arc<S>,
    names: Arc<dyn NameGenerator>,
    locks: ScopeLockManager,
    options: ReconcilerOptions,
    progress: Option<ProgressReporter>,
}

impl<K, S> Reconciler<K, S>
where
    K: ResourceKind,
    S: ResourceStore<K::Attributes> + 'static,
{
    /// Reconciler with store-backed name generation and default options
    pub fn new(kind: K, store: Arc<S>, locks: ScopeLockManager) -> Self {
        let names: Arc<dyn NameGenerator> = Arc::new(StoreNameGenerator::<S, K::Attributes>::new(store.clone()));
        Self {
            kind,
            store,
            names,
            locks,
            options: ReconcilerOptions::default(),
            progress: None,
        }
    }

    pub fn with_names(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn with_options(mut self, options: ReconcilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn options(&self) -> &ReconcilerOptions {
        &self.options
    }

    /// Run one pass against the provider's lister for this kind
    #[instrument(skip_all, fields(kind = self.kind.name(), owner_scope = %owner_scope, account = %account.id))]
    pub async fn sync(&self, owner_scope: &str, account: &CloudAccount, provider: &dyn CloudProvider) -> SyncResult {
        match self.kind.lister(provider) {
            Some(lister) => self.run(owner_scope, account, lister).await,
            None => {
                let mut result = SyncResult::new(self.kind.name(), owner_scope);
                result.abort(SyncError::Unsupported {
                    kind: self.kind.name().to_string(),
                    provider: provider.provider().to_string(),
                });
                result.complete();
                result
            }
        }
    }

    /// Run one pass against an explicit lister
    #[instrument(skip_all, fields(kind = self.kind.name(), owner_scope = %owner_scope, account = %account.id))]
    pub async fn sync_with(
        &self,
        owner_scope: &str,
        account: &CloudAccount,
        lister: &dyn RemoteLister<K::Observation>,
    ) -> SyncResult {
        self.run(owner_scope, account, lister).await
    }

    /// User-initiated delete of one resource.
    ///
    /// The record is marked `deleting`, the vendor delete is awaited, and the
    /// retention policy is applied. An indeterminate vendor outcome leaves the
    /// record in `unknown`; any other vendor error leaves it in `error`.
    #[instrument(skip_all, fields(kind = self.kind.name(), id = %descriptor.id, external_id = %descriptor.external_id))]
    pub async fn delete_resource(
        &self,
        descriptor: &ResourceDescriptor<K::Attributes>,
        remote: &mut K::Observation,
    ) -> Result<()> {
        let _guard = self.lock(&descriptor.owner_scope)?;
        self.set_status(descriptor.id, ResourceStatus::Deleting).await?;

        if descriptor.is_external() {
            let outcome = self
                .kind
                .remove_remote(remote, self.options.wait_interval, self.options.wait_timeout)
                .await;
            if let Err(err) = outcome {
                let status = if err.is_indeterminate() {
                    ResourceStatus::Unknown
                } else {
                    ResourceStatus::Error
                };
                self.mark_status(descriptor.id, status).await;
                return Err(err.into());
            }
        }

        let current = self.reload(descriptor.id).await?;
        self.retire(&current).await?;
        info!(name = %current.name, retention = ?self.options.retention, "Deleted resource");
        Ok(())
    }

    /// Refresh one resource from its vendor handle and merge the result.
    ///
    /// Records not produced by a vendor account are left alone.
    #[instrument(skip_all, fields(kind = self.kind.name(), id = %descriptor.id, external_id = %descriptor.external_id))]
    pub async fn sync_status(
        &self,
        descriptor: &ResourceDescriptor<K::Attributes>,
        remote: &mut K::Observation,
    ) -> Result<SyncResult> {
        let mut result = SyncResult::new(self.kind.name(), descriptor.owner_scope.as_str());
        let manager_id = match descriptor.manager_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                debug!("Record has no vendor account, nothing to refresh");
                result.complete();
                return Ok(result);
            }
        };

        let _guard = self.lock(&descriptor.owner_scope)?;
        match self.kind.refresh(remote).await {
            Ok(()) => self.apply_matched(descriptor, remote, &manager_id, None, &mut result).await,
            Err(err) if err.is_not_found() => self.apply_removed(descriptor, &mut result).await,
            Err(err) => return Err(err.into()),
        }

        result.complete();
        Ok(result)
    }

    /// Hard-delete records that have been pending delete longer than the grace window
    #[instrument(skip_all, fields(kind = self.kind.name(), owner_scope = %owner_scope))]
    pub async fn purge_pending_deletes(&self, owner_scope: &str) -> SyncResult {
        let mut result = SyncResult::new(self.kind.name(), owner_scope);
        let _guard = match self.lock(owner_scope) {
            Ok(guard) => guard,
            Err(err) => {
                result.abort(err);
                result.complete();
                return result;
            }
        };

        if let Err(err) = self.purge(owner_scope, &mut result).await {
            result.abort(err);
        }
        result.complete();
        result
    }

    fn lock(&self, owner_scope: &str) -> Result<ScopeGuard> {
        let key = ScopeKey::new(self.kind.name(), owner_scope);
        self.locks
            .try_acquire(key.clone())
            .ok_or_else(|| SyncError::AlreadySyncing { scope: key.to_string() })
    }

    fn report(&self, emit: impl FnOnce(&ProgressReporter)) {
        if let Some(reporter) = &self.progress {
            emit(reporter);
        }
    }

    async fn run(
        &self,
        owner_scope: &str,
        account: &CloudAccount,
        lister: &dyn RemoteLister<K::Observation>,
    ) -> SyncResult {
        let mut result = SyncResult::new(self.kind.name(), owner_scope);

        let _guard = match self.lock(owner_scope) {
            Ok(guard) => guard,
            Err(err) => {
                result.abort(err);
                result.complete();
                self.report(|p| p.pass_skipped(&result));
                return result;
            }
        };

        self.report(|p| p.pass_started(&result));
        if let Err(err) = self.apply_pass(owner_scope, account, lister, &mut result).await {
            result.abort(err);
        }
        result.complete();
        self.report(|p| p.pass_completed(&result));
        result
    }

    async fn apply_pass(
        &self,
        owner_scope: &str,
        account: &CloudAccount,
        lister: &dyn RemoteLister<K::Observation>,
        result: &mut SyncResult,
    ) -> Result<()> {
        let local = self.store.query(self.kind.name(), owner_scope, &account.id).await?;
        let remote = lister
            .list(owner_scope)
            .await
            .map_err(|err| SyncError::AdapterUnavailable(err.to_string()))?;

        let diff = diff_sets(
            local,
            remote,
            |descriptor: &ResourceDescriptor<K::Attributes>| descriptor.external_id.clone(),
            |observation: &K::Observation| observation.global_id(),
        )?;
        let summary = diff.summary();
        debug!(
            removed = summary.removed,
            matched = summary.matched,
            added = summary.added,
            "Computed diff"
        );

        for descriptor in &diff.removed {
            self.apply_removed(descriptor, result).await;
        }
        for (descriptor, observation) in &diff.matched {
            self.apply_matched(descriptor, observation, &account.id, Some(account), result).await;
        }
        for observation in &diff.added {
            self.apply_added(owner_scope, account, observation, result).await;
        }
        Ok(())
    }

    async fn apply_removed(&self, descriptor: &ResourceDescriptor<K::Attributes>, result: &mut SyncResult) {
        if !descriptor.is_external() || descriptor.is_pending_delete() {
            return;
        }

        match self.retire(descriptor).await {
            Ok(()) => {
                debug!(external_id = %descriptor.external_id, name = %descriptor.name, "Removed record missing on vendor");
                result.record_deleted();
                self.report(|p| p.item_applied(result, SyncOperation::Delete, &descriptor.external_id));
            }
            Err(err) => {
                result.record_failure(SyncOperation::Delete, descriptor.external_id.as_str(), err);
                self.report(|p| p.item_failed(result));
            }
        }
    }

    async fn apply_matched(
        &self,
        descriptor: &ResourceDescriptor<K::Attributes>,
        observation: &K::Observation,
        manager_id: &str,
        account: Option<&CloudAccount>,
        result: &mut SyncResult,
    ) {
        let outcome = match self.merge(descriptor, observation, manager_id).await {
            Ok(changed) => match account {
                Some(account) => self.follow_up(descriptor.id, account).await.map(|()| changed),
                None => Ok(changed),
            },
            Err(err) => Err(err),
        };
        match outcome {
            Ok(true) => {
                result.record_updated();
                self.report(|p| p.item_applied(result, SyncOperation::Update, &descriptor.external_id));
            }
            Ok(false) => result.record_unchanged(),
            Err(err) => {
                result.record_failure(SyncOperation::Update, descriptor.external_id.as_str(), err);
                self.report(|p| p.item_failed(result));
            }
        }
    }

    async fn apply_added(
        &self,
        owner_scope: &str,
        account: &CloudAccount,
        observation: &K::Observation,
        result: &mut SyncResult,
    ) {
        let external_id = observation.global_id();
        let outcome = match self.create(owner_scope, &account.id, observation).await {
            Ok(descriptor) => self.kind.after_apply(&descriptor, account).await.map(|()| descriptor),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(descriptor) => {
                debug!(external_id = %external_id, name = %descriptor.name, "Added record for new vendor resource");
                result.record_added();
                self.report(|p| p.item_applied(result, SyncOperation::Add, &external_id));
            }
            Err(err) => {
                result.record_failure(SyncOperation::Add, external_id, err);
                self.report(|p| p.item_failed(result));
            }
        }
    }

    /// Returns whether the stored record changed
    async fn merge(
        &self,
        descriptor: &ResourceDescriptor<K::Attributes>,
        observation: &K::Observation,
        manager_id: &str,
    ) -> Result<bool> {
        let attributes = match self.kind.construct(observation).await {
            Ok(attributes) => attributes,
            Err(err) => {
                self.mark_status(descriptor.id, ResourceStatus::Error).await;
                return Err(err);
            }
        };

        let current = self.reload(descriptor.id).await?;
        let remote_name = observation.name();
        let blank = remote_name.trim().is_empty();
        // only a vendor-side rename moves the local name; a suffixed name stays put
        let renamed = !blank && remote_name != current.remote_name && remote_name != current.name;
        // a revived record gave up its name when it was soft-deleted
        let name = if renamed || current.is_pending_delete() {
            let proposed = if blank { current.name.as_str() } else { remote_name.as_str() };
            self.names
                .generate_unique_name(self.kind.name(), &current.owner_scope, proposed, Some(current.id))
                .await?
        } else {
            current.name.clone()
        };

        let manager_id = manager_id.to_string();
        let changed = self
            .store
            .update_if_unchanged(&current, &move |record: &mut ResourceDescriptor<K::Attributes>| {
                record.name = name.clone();
                record.remote_name = remote_name.clone();
                record.attributes = attributes.clone();
                record.manager_id = Some(manager_id.clone());
                record.status = ResourceStatus::Ready;
                record.pending_deleted_at = None;
            })
            .await?;

        if changed {
            debug!(external_id = %current.external_id, "Updated record from vendor observation");
        }
        Ok(changed)
    }

    async fn create(
        &self,
        owner_scope: &str,
        manager_id: &str,
        observation: &K::Observation,
    ) -> Result<ResourceDescriptor<K::Attributes>> {
        let attributes = self.kind.construct(observation).await?;
        let name = self
            .names
            .generate_unique_name(self.kind.name(), owner_scope, &observation.name(), None)
            .await?;

        let descriptor = ResourceDescriptor::new(self.kind.name(), owner_scope, name, attributes)
            .with_external_id(observation.global_id())
            .with_remote_name(observation.name())
            .with_manager(manager_id)
            .with_status(ResourceStatus::Ready);
        self.store.insert(descriptor.clone()).await?;
        Ok(descriptor)
    }

    async fn follow_up(&self, id: Uuid, account: &CloudAccount) -> Result<()> {
        let current = self.reload(id).await?;
        self.kind.after_apply(&current, account).await
    }

    async fn retire(&self, descriptor: &ResourceDescriptor<K::Attributes>) -> Result<()> {
        match self.options.retention {
            RetentionPolicy::SoftDelete => self.store.soft_delete(descriptor).await?,
            RetentionPolicy::HardDelete => self.store.hard_delete(descriptor).await?,
        }
        Ok(())
    }

    async fn purge(&self, owner_scope: &str, result: &mut SyncResult) -> Result<()> {
        let grace = chrono::Duration::from_std(self.options.pending_delete_grace)
            .map_err(|err| SyncError::Config(format!("pending delete grace out of range: {}", err)))?;
        let cutoff = Utc::now() - grace;

        let expired = self
            .store
            .query_pending_deletes(self.kind.name(), owner_scope, cutoff)
            .await?;
        for descriptor in &expired {
            match self.store.hard_delete(descriptor).await {
                Ok(()) => result.record_deleted(),
                Err(err) => result.record_failure(SyncOperation::Delete, descriptor.external_id.as_str(), err.into()),
            }
        }
        Ok(())
    }

    async fn reload(&self, id: Uuid) -> Result<ResourceDescriptor<K::Attributes>> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SyncError::from(StoreError::NotFound(id)))
    }

    async fn set_status(&self, id: Uuid, status: ResourceStatus) -> Result<()> {
        let current = self.reload(id).await?;
        self.store
            .update_if_unchanged(&current, &move |record: &mut ResourceDescriptor<K::Attributes>| {
                record.status = status;
            })
            .await?;
        Ok(())
    }

    async fn mark_status(&self, id: Uuid, status: ResourceStatus) {
        if let Err(err) = self.set_status(id, status).await {
            warn!(id = %id, status = %status, error = %err, "Failed to record resource status");
        }
    }
}
