//! Reconcile pass scenarios against fake vendor adapters

use super::error::SyncError;
use super::kinds::{LoadbalancerAttributes, LoadbalancerKind};
use super::lock::{ScopeKey, ScopeLockManager};
use super::progress::{ProgressChannel, ProgressEvent};
use super::reconciler::*;
use super::result::{SyncOperation, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudsync_core::cloudprovider::Result as CloudResult;
use cloudsync_core::{
    Capability, CloudAccount, CloudError, CloudListener, CloudLoadbalancer, CloudProvider, CloudResource,
    ListenerProtocol, ListenerSpec, MemoryStore, RemoteLister, ResourceDescriptor, ResourceStatus, ResourceStore,
    StoreError, StoreResult, VirtualResource,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

const SCOPE: &str = "domain-a";
const KIND: &str = "loadbalancer";

// Fake vendor

struct FakeListener {
    id: String,
    port: u16,
}

impl CloudResource for FakeListener {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        format!("listener-{}", self.port)
    }

    fn status(&self) -> ResourceStatus {
        ResourceStatus::Ready
    }
}

impl CloudListener for FakeListener {
    fn protocol(&self) -> ListenerProtocol {
        ListenerProtocol::Tcp
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn backend_port(&self) -> u16 {
        self.port
    }
}

/// Vendor-side state shared by every handle to the same load balancer
#[derive(Default)]
struct VendorState {
    gone: AtomicBool,
    /// Deletes are accepted but never finish
    stuck: AtomicBool,
    reject_delete: AtomicBool,
    broken_listeners: AtomicBool,
}

#[derive(Clone)]
struct FakeLoadbalancer {
    id: String,
    name: String,
    ports: Vec<u16>,
    vendor: Arc<VendorState>,
}

fn lb(id: &str, name: &str) -> FakeLoadbalancer {
    FakeLoadbalancer {
        id: id.to_string(),
        name: name.to_string(),
        ports: vec![80],
        vendor: Arc::new(VendorState::default()),
    }
}

impl FakeLoadbalancer {
    fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    fn boxed(&self) -> Box<dyn CloudLoadbalancer> {
        Box::new(self.clone())
    }
}

impl CloudResource for FakeLoadbalancer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn status(&self) -> ResourceStatus {
        ResourceStatus::Ready
    }
}

#[async_trait]
impl VirtualResource for FakeLoadbalancer {
    async fn refresh(&mut self) -> CloudResult<()> {
        if self.vendor.gone.load(Ordering::SeqCst) {
            return Err(CloudError::NotFound(self.id.clone()));
        }
        Ok(())
    }

    async fn delete(&self) -> CloudResult<()> {
        if self.vendor.reject_delete.load(Ordering::SeqCst) {
            return Err(CloudError::Authentication("token expired".to_string()));
        }
        if !self.vendor.stuck.load(Ordering::SeqCst) {
            self.vendor.gone.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl CloudLoadbalancer for FakeLoadbalancer {
    fn address(&self) -> String {
        "10.0.0.1".to_string()
    }

    fn address_type(&self) -> String {
        "intranet".to_string()
    }

    fn network_type(&self) -> String {
        "vpc".to_string()
    }

    fn charge_type(&self) -> String {
        "traffic".to_string()
    }

    async fn create_listener(&self, _spec: &ListenerSpec) -> CloudResult<Box<dyn CloudListener>> {
        Err(CloudError::NotSupported("create listener".to_string()))
    }

    async fn listeners(&self) -> CloudResult<Vec<Box<dyn CloudListener>>> {
        if self.vendor.broken_listeners.load(Ordering::SeqCst) {
            return Err(CloudError::Network("listener api unreachable".to_string()));
        }
        Ok(self
            .ports
            .iter()
            .map(|&port| {
                Box::new(FakeListener {
                    id: format!("{}-lsn-{}", self.id, port),
                    port,
                }) as Box<dyn CloudListener>
            })
            .collect())
    }
}

#[derive(Default)]
struct FakeLister {
    remote: Mutex<Vec<FakeLoadbalancer>>,
    failure: Mutex<Option<CloudError>>,
}

#[async_trait]
impl RemoteLister<Box<dyn CloudLoadbalancer>> for FakeLister {
    async fn list(&self, _owner_scope: &str) -> CloudResult<Vec<Box<dyn CloudLoadbalancer>>> {
        let failure = self.failure.lock().clone();
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(self.remote.lock().iter().map(FakeLoadbalancer::boxed).collect())
    }
}

#[derive(Default)]
struct FakeProvider {
    lister: FakeLister,
}

impl CloudProvider for FakeProvider {
    fn provider(&self) -> &str {
        "fake"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Loadbalancer]
    }

    fn loadbalancers(&self) -> Option<&dyn RemoteLister<Box<dyn CloudLoadbalancer>>> {
        Some(&self.lister)
    }
}

/// A vendor with no load balancer support
struct BareProvider;

impl CloudProvider for BareProvider {
    fn provider(&self) -> &str {
        "bare"
    }

    fn capabilities(&self) -> Vec<Capability> {
        Vec::new()
    }
}

/// Lists nothing, but only after `release` is notified
#[derive(Default)]
struct BlockingLister {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl RemoteLister<Box<dyn CloudLoadbalancer>> for BlockingLister {
    async fn list(&self, _owner_scope: &str) -> CloudResult<Vec<Box<dyn CloudLoadbalancer>>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }
}

/// Memory store whose updates to one external id always lose the race
struct ConflictingStore {
    inner: MemoryStore<LoadbalancerAttributes>,
    conflict_on: String,
}

#[async_trait]
impl ResourceStore<LoadbalancerAttributes> for ConflictingStore {
    async fn query(
        &self,
        kind: &str,
        owner_scope: &str,
        manager_id: &str,
    ) -> StoreResult<Vec<ResourceDescriptor<LoadbalancerAttributes>>> {
        self.inner.query(kind, owner_scope, manager_id).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ResourceDescriptor<LoadbalancerAttributes>>> {
        self.inner.get(id).await
    }

    async fn insert(&self, descriptor: ResourceDescriptor<LoadbalancerAttributes>) -> StoreResult<()> {
        self.inner.insert(descriptor).await
    }

    async fn update_if_unchanged(
        &self,
        descriptor: &ResourceDescriptor<LoadbalancerAttributes>,
        mutator: &(dyn for<'r> Fn(&'r mut ResourceDescriptor<LoadbalancerAttributes>) + Send + Sync),
    ) -> StoreResult<bool> {
        if descriptor.external_id == self.conflict_on {
            return Err(StoreError::Conflict {
                id: descriptor.id,
                expected: descriptor.version,
                found: descriptor.version + 1,
            });
        }
        self.inner.update_if_unchanged(descriptor, mutator).await
    }

    async fn soft_delete(&self, descriptor: &ResourceDescriptor<LoadbalancerAttributes>) -> StoreResult<()> {
        self.inner.soft_delete(descriptor).await
    }

    async fn hard_delete(&self, descriptor: &ResourceDescriptor<LoadbalancerAttributes>) -> StoreResult<()> {
        self.inner.hard_delete(descriptor).await
    }

    async fn query_pending_deletes(
        &self,
        kind: &str,
        owner_scope: &str,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<ResourceDescriptor<LoadbalancerAttributes>>> {
        self.inner.query_pending_deletes(kind, owner_scope, before).await
    }

    async fn name_exists(&self, kind: &str, owner_scope: &str, name: &str, exclude: Option<Uuid>) -> StoreResult<bool> {
        self.inner.name_exists(kind, owner_scope, name, exclude).await
    }
}

// Fixture

type LbStore = MemoryStore<LoadbalancerAttributes>;

struct Fixture {
    store: Arc<LbStore>,
    reconciler: Reconciler<LoadbalancerKind, LbStore>,
    provider: FakeProvider,
    account: CloudAccount,
}

fn fixture() -> Fixture {
    fixture_with(ReconcilerOptions::default())
}

fn fixture_with(options: ReconcilerOptions) -> Fixture {
    let store = Arc::new(LbStore::new());
    let reconciler = Reconciler::new(LoadbalancerKind, store.clone(), ScopeLockManager::new()).with_options(options);
    Fixture {
        store,
        reconciler,
        provider: FakeProvider::default(),
        account: CloudAccount::new("acct-1", "primary", "fake", "domain-1"),
    }
}

fn blank_attributes() -> LoadbalancerAttributes {
    LoadbalancerAttributes {
        address: String::new(),
        address_type: String::new(),
        network_type: String::new(),
        vpc_id: None,
        zone_id: None,
        charge_type: String::new(),
        egress_mbps: 0,
        vendor_status: ResourceStatus::Init,
        metadata: None,
        listeners: Vec::new(),
        backend_groups: Vec::new(),
    }
}

impl Fixture {
    fn set_remote(&self, lbs: &[FakeLoadbalancer]) {
        *self.provider.lister.remote.lock() = lbs.to_vec();
    }

    async fn sync(&self) -> SyncResult {
        self.reconciler.sync(SCOPE, &self.account, &self.provider).await
    }

    async fn record(&self, external_id: &str) -> ResourceDescriptor<LoadbalancerAttributes> {
        self.store
            .find_by_external_id(KIND, external_id)
            .await
            .unwrap_or_else(|| panic!("no record for {}", external_id))
    }

    async fn seed(&self, lbs: &[FakeLoadbalancer]) {
        self.set_remote(lbs);
        let result = self.sync().await;
        assert!(result.is_successful(), "seeding failed: {}", result.summary());
        assert_eq!(result.added, lbs.len());
    }
}

mod pass_tests {
    use super::*;

    #[tokio::test]
    async fn test_rename_and_add() {
        let f = fixture();
        let web = lb("lb-1", "web");
        f.seed(&[web.clone()]).await;
        let before = f.record("lb-1").await;

        f.set_remote(&[web.renamed("frontend"), lb("lb-2", "api")]);
        let result = f.sync().await;

        assert!(result.is_successful());
        assert_eq!(result.updated, 1);
        assert_eq!(result.added, 1);
        assert_eq!(result.deleted, 0);

        let renamed = f.record("lb-1").await;
        assert_eq!(renamed.id, before.id);
        assert_eq!(renamed.name, "frontend");
        assert_eq!(renamed.version, before.version + 1);

        let added = f.record("lb-2").await;
        assert_eq!(added.name, "api");
        assert_eq!(added.status, ResourceStatus::Ready);
        assert_eq!(added.manager_id.as_deref(), Some("acct-1"));
        assert_eq!(added.owner_scope, SCOPE);
        assert_eq!(added.attributes.listeners.len(), 1);
        assert_eq!(added.attributes.listeners[0].port, 80);
    }

    #[tokio::test]
    async fn test_missing_remote_is_soft_deleted_once() {
        let f = fixture();
        let web = lb("lb-1", "web");
        f.seed(&[web.clone(), lb("lb-9", "old")]).await;

        f.set_remote(&[web]);
        let result = f.sync().await;
        assert_eq!(result.deleted, 1);
        assert_eq!(result.unchanged, 1);
        assert_eq!(result.updated, 0);
        assert_eq!(f.store.len().await, 2);
        assert!(f.record("lb-9").await.is_pending_delete());

        let again = f.sync().await;
        assert_eq!(again.deleted, 0);
        assert!(!again.has_changes());
    }

    #[tokio::test]
    async fn test_second_pass_is_a_noop() {
        let f = fixture();
        f.seed(&[lb("lb-1", "web"), lb("lb-2", "api")]).await;
        let before = f.store.snapshot().await;

        let result = f.sync().await;

        assert!(result.is_successful());
        assert!(!result.has_changes());
        assert_eq!(result.unchanged, 2);
        assert_eq!(f.store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_duplicate_remote_ids_abort_without_writes() {
        let f = fixture();
        f.seed(&[lb("lb-1", "web")]).await;
        let before = f.store.snapshot().await;

        f.set_remote(&[lb("lb-1", "web"), lb("lb-2", "api"), lb("lb-1", "web-again")]);
        let result = f.sync().await;

        assert_eq!(result.error, Some(SyncError::DuplicateExternalId("lb-1".to_string())));
        assert!(result.is_aborted());
        assert!(!result.has_changes());
        assert_eq!(f.store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_lister_failure_aborts_pass() {
        let f = fixture();
        f.seed(&[lb("lb-1", "web")]).await;
        *f.provider.lister.failure.lock() = Some(CloudError::Network("connection reset".to_string()));

        let result = f.sync().await;

        assert!(matches!(result.error, Some(SyncError::AdapterUnavailable(_))));
        assert!(!f.record("lb-1").await.is_pending_delete());
    }

    #[tokio::test]
    async fn test_provider_without_capability_is_unsupported() {
        let f = fixture();
        let result = f.reconciler.sync(SCOPE, &f.account, &BareProvider).await;

        assert_eq!(
            result.error,
            Some(SyncError::Unsupported {
                kind: KIND.to_string(),
                provider: "bare".to_string(),
            })
        );
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_colliding_names_get_suffix_and_stay_stable() {
        let f = fixture();
        f.seed(&[lb("lb-1", "web"), lb("lb-2", "web")]).await;

        assert_eq!(f.record("lb-1").await.name, "web");
        assert_eq!(f.record("lb-2").await.name, "web-1");

        let result = f.sync().await;
        assert_eq!(result.unchanged, 2);
        assert_eq!(result.updated, 0);
        assert_eq!(f.record("lb-2").await.name, "web-1");
    }

    #[tokio::test]
    async fn test_rename_onto_taken_name() {
        let f = fixture();
        let web = lb("lb-1", "web");
        let api = lb("lb-2", "api");
        f.seed(&[web.clone(), api.clone()]).await;

        f.set_remote(&[web.renamed("api"), api]);
        let result = f.sync().await;

        assert_eq!(result.updated, 1);
        assert_eq!(f.record("lb-1").await.name, "api-1");
        assert_eq!(f.record("lb-2").await.name, "api");
    }

    #[tokio::test]
    async fn test_swapped_vendor_names_settle_in_one_pass() {
        let f = fixture();
        let web = lb("lb-1", "web");
        let api = lb("lb-2", "api");
        f.seed(&[web.clone(), api.clone()]).await;

        f.set_remote(&[web.renamed("api"), api.renamed("web")]);
        let first = f.sync().await;
        assert!(first.is_successful());
        assert_eq!(first.updated, 2);
        let settled = f.store.snapshot().await;

        let lb1 = f.record("lb-1").await;
        let lb2 = f.record("lb-2").await;
        assert!(lb1.name.starts_with("api"), "lb-1 named {}", lb1.name);
        assert!(lb2.name.starts_with("web"), "lb-2 named {}", lb2.name);
        assert_ne!(lb1.name, lb2.name);
        assert_eq!(lb1.remote_name, "api");
        assert_eq!(lb2.remote_name, "web");

        let second = f.sync().await;
        assert!(second.is_successful());
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(f.store.snapshot().await, settled);
    }

    #[tokio::test]
    async fn test_deleted_name_is_free_for_same_pass_add() {
        let f = fixture();
        let old = lb("lb-9", "web");
        f.seed(&[old.clone()]).await;

        f.set_remote(&[lb("lb-3", "web")]);
        let result = f.sync().await;

        assert_eq!(result.deleted, 1);
        assert_eq!(result.added, 1);
        assert!(f.record("lb-9").await.is_pending_delete());
        assert_eq!(f.record("lb-3").await.name, "web");

        // the deleted resource comes back while its name is in use
        f.set_remote(&[lb("lb-3", "web"), old]);
        let revived = f.sync().await;
        assert_eq!(revived.updated, 1);
        let record = f.record("lb-9").await;
        assert!(!record.is_pending_delete());
        assert_eq!(record.name, "web-1");
        assert_eq!(f.record("lb-3").await.name, "web");

        assert!(!f.sync().await.has_changes());
    }

    #[tokio::test]
    async fn test_hard_delete_retention() {
        let f = fixture_with(ReconcilerOptions {
            retention: RetentionPolicy::HardDelete,
            ..ReconcilerOptions::default()
        });
        f.seed(&[lb("lb-1", "web"), lb("lb-9", "old")]).await;

        f.set_remote(&[lb("lb-1", "web")]);
        let result = f.sync().await;

        assert_eq!(result.deleted, 1);
        assert_eq!(f.store.len().await, 1);
        assert!(f.store.find_by_external_id(KIND, "lb-9").await.is_none());
    }

    #[tokio::test]
    async fn test_reappearing_resource_is_revived() {
        let f = fixture();
        let old = lb("lb-9", "old");
        f.seed(&[old.clone()]).await;
        f.set_remote(&[]);
        f.sync().await;
        assert!(f.record("lb-9").await.is_pending_delete());

        f.set_remote(&[old]);
        let result = f.sync().await;

        assert_eq!(result.updated, 1);
        assert_eq!(result.added, 0);
        let revived = f.record("lb-9").await;
        assert!(!revived.is_pending_delete());
        assert_eq!(revived.status, ResourceStatus::Ready);
    }

    #[tokio::test]
    async fn test_records_outside_the_pass_are_left_alone() {
        let f = fixture();
        let local_only = ResourceDescriptor::new(KIND, SCOPE, "manual", blank_attributes()).with_manager("acct-1");
        let other_account = ResourceDescriptor::new(KIND, SCOPE, "theirs", blank_attributes())
            .with_external_id("lb-5")
            .with_manager("acct-2");
        f.store.insert(local_only.clone()).await.unwrap();
        f.store.insert(other_account.clone()).await.unwrap();

        let result = f.sync().await;

        assert!(result.is_successful());
        assert_eq!(result.deleted, 0);
        let snapshot = f.store.snapshot().await;
        assert!(!snapshot[&local_only.id].is_pending_delete());
        assert!(!snapshot[&other_account.id].is_pending_delete());
    }

    #[tokio::test]
    async fn test_construct_failure_marks_record_error() {
        let f = fixture();
        let web = lb("lb-1", "web");
        f.seed(&[web.clone()]).await;

        web.vendor.broken_listeners.store(true, Ordering::SeqCst);
        let broken_new = lb("lb-2", "api");
        broken_new.vendor.broken_listeners.store(true, Ordering::SeqCst);
        f.set_remote(&[web.renamed("frontend"), broken_new, lb("lb-3", "db")]);
        let result = f.sync().await;

        assert_eq!(result.update_errors, 1);
        assert_eq!(result.add_errors, 1);
        assert_eq!(result.added, 1);
        assert!(result.error.is_none());
        assert!(!result.is_successful());

        let record = f.record("lb-1").await;
        assert_eq!(record.status, ResourceStatus::Error);
        assert_eq!(record.name, "web");
        assert!(f.store.find_by_external_id(KIND, "lb-2").await.is_none());
    }

    #[tokio::test]
    async fn test_conflict_fails_only_that_item() {
        let store = Arc::new(ConflictingStore {
            inner: MemoryStore::new(),
            conflict_on: "lb-1".to_string(),
        });
        let reconciler = Reconciler::new(LoadbalancerKind, store.clone(), ScopeLockManager::new());
        let provider = FakeProvider::default();
        let account = CloudAccount::new("acct-1", "primary", "fake", "domain-1");

        let web = lb("lb-1", "web");
        let api = lb("lb-2", "api");
        *provider.lister.remote.lock() = vec![web.clone(), api.clone()];
        assert_eq!(reconciler.sync(SCOPE, &account, &provider).await.added, 2);

        *provider.lister.remote.lock() = vec![web.renamed("frontend"), api.renamed("backend")];
        let result = reconciler.sync(SCOPE, &account, &provider).await;

        assert!(result.error.is_none());
        assert_eq!(result.updated, 1);
        assert_eq!(result.update_errors, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].operation, SyncOperation::Update);
        assert_eq!(result.failures[0].external_id, "lb-1");
        assert!(matches!(result.failures[0].error, SyncError::PersistenceConflict { .. }));

        let renamed = store.inner.find_by_external_id(KIND, "lb-2").await.unwrap();
        assert_eq!(renamed.name, "backend");
    }
}

mod lock_tests {
    use super::*;

    #[tokio::test]
    async fn test_same_scope_is_skipped_while_other_scope_runs() {
        let f = fixture();
        f.set_remote(&[lb("lb-1", "web")]);
        let blocking = BlockingLister::default();

        let (first, (second, other)) = tokio::join!(f.reconciler.sync_with(SCOPE, &f.account, &blocking), async {
            blocking.entered.notified().await;
            let second = f.sync().await;
            let other = f.reconciler.sync("domain-b", &f.account, &f.provider).await;
            blocking.release.notify_one();
            (second, other)
        });

        assert!(first.is_successful());
        assert!(second.is_skipped());
        assert_eq!(
            second.error,
            Some(SyncError::AlreadySyncing {
                scope: "loadbalancer/domain-a".to_string()
            })
        );
        assert!(!second.has_changes());
        assert!(other.is_successful());
        assert_eq!(other.added, 1);

        // released once the first pass returns
        let after = f.sync().await;
        assert!(!after.is_skipped());
        assert_eq!(after.added, 1);
    }

    #[tokio::test]
    async fn test_skipped_pass_reports_progress() {
        let (reporter, mut channel) = ProgressChannel::new();
        let store = Arc::new(LbStore::new());
        let locks = ScopeLockManager::new();
        let reconciler = Reconciler::new(LoadbalancerKind, store, locks.clone()).with_progress(reporter);
        let account = CloudAccount::new("acct-1", "primary", "fake", "domain-1");

        let _held = locks.try_acquire(ScopeKey::new(KIND, SCOPE)).unwrap();
        let result = reconciler.sync(SCOPE, &account, &FakeProvider::default()).await;

        assert!(result.is_skipped());
        assert!(matches!(channel.try_recv(), Some(ProgressEvent::PassSkipped { .. })));
        assert!(channel.try_recv().is_none());
    }
}

mod maintenance_tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Duration::ZERO, 1 ; "grace elapsed")]
    #[test_case(Duration::from_secs(60 * 60), 0 ; "within grace")]
    #[tokio::test]
    async fn test_purge_pending_deletes(grace: Duration, purged: usize) {
        let f = fixture_with(ReconcilerOptions {
            pending_delete_grace: grace,
            ..ReconcilerOptions::default()
        });
        f.seed(&[lb("lb-1", "web"), lb("lb-9", "old")]).await;
        f.set_remote(&[lb("lb-1", "web")]);
        f.sync().await;

        let result = f.reconciler.purge_pending_deletes(SCOPE).await;

        assert!(result.is_successful());
        assert_eq!(result.deleted, purged);
        assert_eq!(f.store.len().await, 2 - purged);
        assert!(f.store.find_by_external_id(KIND, "lb-1").await.is_some());
    }

    #[tokio::test]
    async fn test_delete_resource_waits_for_vendor() {
        let f = fixture();
        let web = lb("lb-1", "web");
        f.seed(&[web.clone()]).await;
        let record = f.record("lb-1").await;

        let mut handle = web.boxed();
        f.reconciler.delete_resource(&record, &mut handle).await.unwrap();

        assert!(web.vendor.gone.load(Ordering::SeqCst));
        let deleted = f.record("lb-1").await;
        assert!(deleted.is_pending_delete());
        assert_eq!(deleted.status, ResourceStatus::Deleting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_resource_timeout_leaves_status_unknown() {
        let f = fixture_with(ReconcilerOptions {
            wait_interval: Duration::from_secs(1),
            wait_timeout: Duration::from_secs(3),
            ..ReconcilerOptions::default()
        });
        let web = lb("lb-1", "web");
        f.seed(&[web.clone()]).await;
        web.vendor.stuck.store(true, Ordering::SeqCst);
        let record = f.record("lb-1").await;

        let mut handle = web.boxed();
        let err = f.reconciler.delete_resource(&record, &mut handle).await.unwrap_err();

        assert_eq!(err, SyncError::Timeout(Duration::from_secs(3)));
        let current = f.record("lb-1").await;
        assert_eq!(current.status, ResourceStatus::Unknown);
        assert!(!current.is_pending_delete());
    }

    #[tokio::test]
    async fn test_delete_resource_vendor_rejection_leaves_status_error() {
        let f = fixture();
        let web = lb("lb-1", "web");
        f.seed(&[web.clone()]).await;
        web.vendor.reject_delete.store(true, Ordering::SeqCst);
        let record = f.record("lb-1").await;

        let mut handle = web.boxed();
        let err = f.reconciler.delete_resource(&record, &mut handle).await.unwrap_err();

        assert!(matches!(err, SyncError::Vendor(_)));
        assert_eq!(f.record("lb-1").await.status, ResourceStatus::Error);
    }

    #[tokio::test]
    async fn test_delete_local_only_record_skips_vendor() {
        let f = fixture();
        let record = ResourceDescriptor::new(KIND, SCOPE, "draft", blank_attributes());
        f.store.insert(record.clone()).await.unwrap();
        let web = lb("lb-1", "web");

        let mut handle = web.boxed();
        f.reconciler.delete_resource(&record, &mut handle).await.unwrap();

        assert!(!web.vendor.gone.load(Ordering::SeqCst));
        assert!(f.store.snapshot().await[&record.id].is_pending_delete());
    }

    #[tokio::test]
    async fn test_sync_status_merges_refreshed_handle() {
        let f = fixture();
        let web = lb("lb-1", "web");
        f.seed(&[web.clone()]).await;
        let record = f.record("lb-1").await;

        let mut handle = web.renamed("frontend").boxed();
        let result = f.reconciler.sync_status(&record, &mut handle).await.unwrap();

        assert_eq!(result.updated, 1);
        assert_eq!(f.record("lb-1").await.name, "frontend");
    }

    #[tokio::test]
    async fn test_sync_status_vanished_resource_is_removed() {
        let f = fixture();
        let web = lb("lb-1", "web");
        f.seed(&[web.clone()]).await;
        web.vendor.gone.store(true, Ordering::SeqCst);
        let record = f.record("lb-1").await;

        let mut handle = web.boxed();
        let result = f.reconciler.sync_status(&record, &mut handle).await.unwrap();

        assert_eq!(result.deleted, 1);
        assert!(f.record("lb-1").await.is_pending_delete());
    }

    #[tokio::test]
    async fn test_sync_status_ignores_unmanaged_record() {
        let f = fixture();
        let record = ResourceDescriptor::new(KIND, SCOPE, "manual", blank_attributes()).with_external_id("lb-1");
        f.store.insert(record.clone()).await.unwrap();
        let before = f.store.snapshot().await;

        let mut handle = lb("lb-1", "renamed").boxed();
        let result = f.reconciler.sync_status(&record, &mut handle).await.unwrap();

        assert!(result.is_successful());
        assert!(!result.has_changes());
        assert_eq!(f.store.snapshot().await, before);
    }
}

mod progress_tests {
    use super::*;

    #[tokio::test]
    async fn test_pass_emits_started_items_completed() {
        let (reporter, mut channel) = ProgressChannel::new();
        let f = fixture();
        let reconciler = Reconciler::new(LoadbalancerKind, f.store.clone(), ScopeLockManager::new()).with_progress(reporter);
        f.set_remote(&[lb("lb-1", "web")]);

        let result = reconciler.sync(SCOPE, &f.account, &f.provider).await;

        match channel.try_recv() {
            Some(ProgressEvent::PassStarted { session_id, kind, .. }) => {
                assert_eq!(session_id, result.session_id);
                assert_eq!(kind, KIND);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            channel.try_recv(),
            Some(ProgressEvent::ItemApplied {
                session_id: result.session_id,
                operation: SyncOperation::Add,
                external_id: "lb-1".to_string(),
            })
        );
        match channel.try_recv() {
            Some(ProgressEvent::PassCompleted { added, errors, aborted, .. }) => {
                assert_eq!(added, 1);
                assert_eq!(errors, 0);
                assert!(!aborted);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(channel.try_recv().is_none());
    }
}

mod trigger_tests {
    use super::*;
    use crate::trigger::{SyncRegistry, SyncTrigger};

    fn registry(f: &Fixture) -> SyncRegistry {
        let trigger: Arc<dyn SyncTrigger> = Arc::new(Reconciler::new(
            LoadbalancerKind,
            f.store.clone(),
            ScopeLockManager::new(),
        ));
        let mut registry = SyncRegistry::new();
        registry.register(trigger).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_registry_runs_registered_kind() {
        let f = fixture();
        f.set_remote(&[lb("lb-1", "web")]);
        let registry = registry(&f);

        assert_eq!(registry.kinds(), vec![KIND]);
        let result = registry.sync(SCOPE, KIND, &f.account, &f.provider).await.unwrap();
        assert_eq!(result.added, 1);

        let all = registry.sync_all(SCOPE, &f.account, &f.provider).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].unchanged, 1);
    }

    #[tokio::test]
    async fn test_registry_rejects_unknown_and_duplicate_kinds() {
        let f = fixture();
        let mut registry = registry(&f);

        let err = registry.sync(SCOPE, "network", &f.account, &f.provider).await.unwrap_err();
        assert!(matches!(err, SyncError::Unsupported { .. }));

        let duplicate: Arc<dyn SyncTrigger> =
            Arc::new(Reconciler::new(LoadbalancerKind, f.store.clone(), ScopeLockManager::new()));
        assert!(matches!(registry.register(duplicate), Err(SyncError::Config(_))));
    }
}
