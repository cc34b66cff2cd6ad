//! Non-blocking mutual exclusion per (resource kind, owner scope)
//!
//! A pass that cannot take its scope lock is skipped, never queued. Locks
//! have no implicit timeout; a [`ScopeGuard`] releases on drop, including
//! during panic unwinding.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

/// Lock name, `"<kind>/<owner scope>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey(String);

impl ScopeKey {
    pub fn new(kind: &str, owner_scope: &str) -> Self {
        Self(format!("{}/{}", kind, owner_scope))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for the set of held keys.
///
/// `try_insert` must be atomic: of any number of concurrent callers with the
/// same key, exactly one sees `true`.
pub trait LockBackend: Send + Sync {
    fn try_insert(&self, key: &ScopeKey) -> bool;

    fn remove(&self, key: &ScopeKey);

    fn contains(&self, key: &ScopeKey) -> bool;
}

/// Held keys for a single process
#[derive(Debug, Default)]
pub struct InProcessLocks {
    held: Mutex<HashSet<ScopeKey>>,
}

impl LockBackend for InProcessLocks {
    fn try_insert(&self, key: &ScopeKey) -> bool {
        self.held.lock().insert(key.clone())
    }

    fn remove(&self, key: &ScopeKey) {
        self.held.lock().remove(key);
    }

    fn contains(&self, key: &ScopeKey) -> bool {
        self.held.lock().contains(key)
    }
}

/// Shared handle over a [`LockBackend`]; clones see the same locks
#[derive(Clone)]
pub struct ScopeLockManager {
    backend: Arc<dyn LockBackend>,
}

impl Default for ScopeLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeLockManager").finish_non_exhaustive()
    }
}

impl ScopeLockManager {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(InProcessLocks::default()))
    }

    pub fn with_backend(backend: Arc<dyn LockBackend>) -> Self {
        Self { backend }
    }

    /// Take `key` if nobody holds it; never waits
    pub fn try_lock(&self, key: &ScopeKey) -> bool {
        let acquired = self.backend.try_insert(key);
        trace!(key = %key, acquired, "Scope lock attempt");
        acquired
    }

    pub fn release(&self, key: &ScopeKey) {
        self.backend.remove(key);
        trace!(key = %key, "Scope lock released");
    }

    pub fn is_held(&self, key: &ScopeKey) -> bool {
        self.backend.contains(key)
    }

    /// Scoped form of [`try_lock`](Self::try_lock)
    pub fn try_acquire(&self, key: ScopeKey) -> Option<ScopeGuard> {
        if !self.try_lock(&key) {
            debug!(key = %key, "Scope already locked");
            return None;
        }
        Some(ScopeGuard {
            manager: self.clone(),
            key,
        })
    }
}

/// Releases its key when dropped
#[must_use = "the scope lock is released as soon as the guard is dropped"]
pub struct ScopeGuard {
    manager: ScopeLockManager,
    key: ScopeKey,
}

impl ScopeGuard {
    pub fn key(&self) -> &ScopeKey {
        &self.key
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.manager.release(&self.key);
    }
}
