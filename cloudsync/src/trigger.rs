//! Entry points for whatever schedules reconcile passes

use std::sync::Arc;

use async_trait::async_trait;
use cloudsync_core::{CloudAccount, CloudProvider, ResourceStore};
use futures::future::join_all;
use tracing::info;

use crate::error::{Result, SyncError};
use crate::reconciler::{Reconciler, ResourceKind};
use crate::result::SyncResult;

/// One resource kind that can be synced on demand
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    fn kind(&self) -> &str;

    async fn sync(&self, owner_scope: &str, account: &CloudAccount, provider: &dyn CloudProvider) -> SyncResult;
}

#[async_trait]
impl<K, S> SyncTrigger for Reconciler<K, S>
where
    K: ResourceKind,
    S: ResourceStore<K::Attributes> + 'static,
{
    fn kind(&self) -> &str {
        self.kind().name()
    }

    async fn sync(&self, owner_scope: &str, account: &CloudAccount, provider: &dyn CloudProvider) -> SyncResult {
        Reconciler::sync(self, owner_scope, account, provider).await
    }
}

/// Triggers by kind name, in registration order
#[derive(Default)]
pub struct SyncRegistry {
    triggers: Vec<Arc<dyn SyncTrigger>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if a trigger for the same kind is already registered
    pub fn register(&mut self, trigger: Arc<dyn SyncTrigger>) -> Result<()> {
        if self.get(trigger.kind()).is_some() {
            return Err(SyncError::Config(format!(
                "a trigger for {} is already registered",
                trigger.kind()
            )));
        }
        self.triggers.push(trigger);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn SyncTrigger>> {
        self.triggers.iter().find(|trigger| trigger.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.triggers.iter().map(|trigger| trigger.kind()).collect()
    }

    /// Run one pass for `kind`
    pub async fn sync(
        &self,
        owner_scope: &str,
        kind: &str,
        account: &CloudAccount,
        provider: &dyn CloudProvider,
    ) -> Result<SyncResult> {
        let trigger = self.get(kind).ok_or_else(|| SyncError::Unsupported {
            kind: kind.to_string(),
            provider: provider.provider().to_string(),
        })?;
        Ok(trigger.sync(owner_scope, account, provider).await)
    }

    /// Run one pass per registered kind concurrently; results follow registration order
    pub async fn sync_all(
        &self,
        owner_scope: &str,
        account: &CloudAccount,
        provider: &dyn CloudProvider,
    ) -> Vec<SyncResult> {
        let results = join_all(
            self.triggers
                .iter()
                .map(|trigger| trigger.sync(owner_scope, account, provider)),
        )
        .await;

        info!(
            owner_scope = %owner_scope,
            provider = %provider.provider(),
            kinds = results.len(),
            changed = results.iter().filter(|r| r.has_changes()).count(),
            failed = results.iter().filter(|r| !r.is_successful()).count(),
            "Completed sync for all kinds"
        );
        results
    }
}
