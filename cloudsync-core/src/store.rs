//! Store contract consumed by reconcilers, plus an in-memory implementation
//!
//! The relational store of a real deployment lives elsewhere; anything that
//! satisfies [`ResourceStore`] can back a reconciler. [`MemoryStore`] is used
//! for embedding and tests.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::model::ResourceDescriptor;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("Version conflict on {id}: expected version {expected}, found {found}")]
    Conflict { id: Uuid, expected: u64, found: u64 },

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence operations a reconciler needs for one attribute type
#[async_trait]
pub trait ResourceStore<A: Send + Sync + 'static>: Send + Sync {
    /// All records of `kind` in `owner_scope` produced by `manager_id`,
    /// pending deletes included
    async fn query(
        &self,
        kind: &str,
        owner_scope: &str,
        manager_id: &str,
    ) -> StoreResult<Vec<ResourceDescriptor<A>>>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<ResourceDescriptor<A>>>;

    async fn insert(&self, descriptor: ResourceDescriptor<A>) -> StoreResult<()>;

    /// Apply `mutator` if the stored version still equals `descriptor.version`.
    ///
    /// Returns `Ok(false)` when the mutator left the record untouched and
    /// `StoreError::Conflict` when someone else wrote first.
    async fn update_if_unchanged(
        &self,
        descriptor: &ResourceDescriptor<A>,
        mutator: &(dyn for<'r> Fn(&'r mut ResourceDescriptor<A>) + Send + Sync),
    ) -> StoreResult<bool>;

    /// Mark for purge.
    ///
    /// The record keeps its external id, so a reappearing resource is matched
    /// back to it, but its name is released to live records.
    async fn soft_delete(&self, descriptor: &ResourceDescriptor<A>) -> StoreResult<()>;

    async fn hard_delete(&self, descriptor: &ResourceDescriptor<A>) -> StoreResult<()>;

    /// Soft-deleted records of `kind` in `owner_scope` marked at or before `before`
    async fn query_pending_deletes(
        &self,
        kind: &str,
        owner_scope: &str,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<ResourceDescriptor<A>>>;

    /// Whether `name` is taken in (`kind`, `owner_scope`) by a live record other
    /// than `exclude`; records pending delete do not hold their name
    async fn name_exists(
        &self,
        kind: &str,
        owner_scope: &str,
        name: &str,
        exclude: Option<Uuid>,
    ) -> StoreResult<bool>;
}

/// In-memory store keyed by local id
pub struct MemoryStore<A> {
    records: RwLock<HashMap<Uuid, ResourceDescriptor<A>>>,
}

impl<A> Default for MemoryStore<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> MemoryStore<A> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl<A: Clone> MemoryStore<A> {
    /// Copy of every record, for comparing store state before and after a pass
    pub async fn snapshot(&self) -> HashMap<Uuid, ResourceDescriptor<A>> {
        self.records.read().await.clone()
    }

    pub async fn find_by_external_id(&self, kind: &str, external_id: &str) -> Option<ResourceDescriptor<A>> {
        self.records
            .read()
            .await
            .values()
            .find(|record| record.kind == kind && record.external_id == external_id)
            .cloned()
    }
}

fn sorted<A>(mut records: Vec<ResourceDescriptor<A>>) -> Vec<ResourceDescriptor<A>> {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    records
}

#[async_trait]
impl<A> ResourceStore<A> for MemoryStore<A>
where
    A: Clone + PartialEq + Send + Sync + 'static,
{
    async fn query(
        &self,
        kind: &str,
        owner_scope: &str,
        manager_id: &str,
    ) -> StoreResult<Vec<ResourceDescriptor<A>>> {
        let records = self.records.read().await;
        let matching = records
            .values()
            .filter(|r| {
                r.kind == kind && r.owner_scope == owner_scope && r.manager_id.as_deref() == Some(manager_id)
            })
            .cloned()
            .collect();
        Ok(sorted(matching))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ResourceDescriptor<A>>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn insert(&self, descriptor: ResourceDescriptor<A>) -> StoreResult<()> {
        let mut records = self.records.write().await;

        if records.contains_key(&descriptor.id) {
            return Err(StoreError::Duplicate(format!("id {}", descriptor.id)));
        }
        if descriptor.is_external() {
            let clash = records.values().any(|r| {
                r.kind == descriptor.kind
                    && r.owner_scope == descriptor.owner_scope
                    && r.external_id == descriptor.external_id
            });
            if clash {
                return Err(StoreError::Duplicate(format!(
                    "{} '{}' in scope '{}'",
                    descriptor.kind, descriptor.external_id, descriptor.owner_scope
                )));
            }
        }

        debug!(id = %descriptor.id, kind = %descriptor.kind, name = %descriptor.name, "Inserted record");
        records.insert(descriptor.id, descriptor);
        Ok(())
    }

    async fn update_if_unchanged(
        &self,
        descriptor: &ResourceDescriptor<A>,
        mutator: &(dyn for<'r> Fn(&'r mut ResourceDescriptor<A>) + Send + Sync),
    ) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(&descriptor.id)
            .ok_or(StoreError::NotFound(descriptor.id))?;

        if current.version != descriptor.version {
            return Err(StoreError::Conflict {
                id: descriptor.id,
                expected: descriptor.version,
                found: current.version,
            });
        }

        let mut updated = current.clone();
        mutator(&mut updated);
        if updated == *current {
            return Ok(false);
        }

        // identity is immutable whatever the mutator did
        updated.id = current.id;
        updated.created_at = current.created_at;
        updated.version = current.version + 1;
        updated.updated_at = Utc::now();
        *current = updated;
        Ok(true)
    }

    async fn soft_delete(&self, descriptor: &ResourceDescriptor<A>) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(&descriptor.id)
            .ok_or(StoreError::NotFound(descriptor.id))?;

        if current.pending_deleted_at.is_none() {
            let now = Utc::now();
            current.pending_deleted_at = Some(now);
            current.updated_at = now;
            current.version += 1;
        }
        Ok(())
    }

    async fn hard_delete(&self, descriptor: &ResourceDescriptor<A>) -> StoreResult<()> {
        self.records
            .write()
            .await
            .remove(&descriptor.id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(descriptor.id))
    }

    async fn query_pending_deletes(
        &self,
        kind: &str,
        owner_scope: &str,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<ResourceDescriptor<A>>> {
        let records = self.records.read().await;
        let expired = records
            .values()
            .filter(|r| {
                r.kind == kind
                    && r.owner_scope == owner_scope
                    && r.pending_deleted_at.map_or(false, |at| at <= before)
            })
            .cloned()
            .collect();
        Ok(sorted(expired))
    }

    async fn name_exists(
        &self,
        kind: &str,
        owner_scope: &str,
        name: &str,
        exclude: Option<Uuid>,
    ) -> StoreResult<bool> {
        let records = self.records.read().await;
        Ok(records.values().any(|r| {
            r.kind == kind
                && r.owner_scope == owner_scope
                && r.name == name
                && r.pending_deleted_at.is_none()
                && Some(r.id) != exclude
        }))
    }
}

/// Produces names unique within (kind, owner scope)
#[async_trait]
pub trait NameGenerator: Send + Sync {
    /// Return `proposed` if free, otherwise the first free `proposed-N`.
    ///
    /// `exclude` is the record being renamed, so it never collides with itself.
    async fn generate_unique_name(
        &self,
        kind: &str,
        owner_scope: &str,
        proposed: &str,
        exclude: Option<Uuid>,
    ) -> StoreResult<String>;
}

const MAX_NAME_SUFFIX: u32 = 10_000;

/// [`NameGenerator`] backed by any [`ResourceStore`]
pub struct StoreNameGenerator<S, A> {
    store: Arc<S>,
    _attributes: PhantomData<fn() -> A>,
}

impl<S, A> StoreNameGenerator<S, A> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _attributes: PhantomData,
        }
    }
}

#[async_trait]
impl<S, A> NameGenerator for StoreNameGenerator<S, A>
where
    S: ResourceStore<A>,
    A: Send + Sync + 'static,
{
    async fn generate_unique_name(
        &self,
        kind: &str,
        owner_scope: &str,
        proposed: &str,
        exclude: Option<Uuid>,
    ) -> StoreResult<String> {
        let base = match proposed.trim() {
            "" => kind,
            trimmed => trimmed,
        };

        if !self.store.name_exists(kind, owner_scope, base, exclude).await? {
            return Ok(base.to_string());
        }
        for suffix in 1..=MAX_NAME_SUFFIX {
            let candidate = format!("{}-{}", base, suffix);
            if !self.store.name_exists(kind, owner_scope, &candidate, exclude).await? {
                return Ok(candidate);
            }
        }
        Err(StoreError::Duplicate(format!(
            "no free name for '{}' in scope '{}'",
            base, owner_scope
        )))
    }
}
