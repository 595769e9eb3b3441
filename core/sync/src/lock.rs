//! Non-blocking per-kind sync locks.

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What a lock entry guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// One entity kind.
    Kind(TypeId),
    /// A coordinator-wide group sync.
    Group,
}

impl LockKey {
    /// Lock key for record type `R`.
    pub fn kind<R: 'static>() -> Self {
        LockKey::Kind(TypeId::of::<R>())
    }
}

/// Set of keys currently being synced.
///
/// `try_lock` checks and inserts under one mutex acquisition and never
/// waits for the current holder.
#[derive(Debug, Default)]
pub struct KindLocks {
    held: Mutex<HashSet<LockKey>>,
}

impl KindLocks {
    /// Create an empty lock set.
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<LockKey>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to take `key`. Returns `None` if someone else holds it.
    ///
    /// The key is released when the returned guard is dropped.
    pub fn try_lock(self: &Arc<Self>, key: LockKey) -> Option<KindGuard> {
        if !self.held().insert(key) {
            return None;
        }

        Some(KindGuard {
            locks: Arc::clone(self),
            key,
        })
    }

    /// Whether `key` is currently held.
    pub fn is_locked(&self, key: LockKey) -> bool {
        self.held().contains(&key)
    }

    fn unlock(&self, key: LockKey) {
        self.held().remove(&key);
    }
}

/// Scoped hold on one [`LockKey`].
#[derive(Debug)]
pub struct KindGuard {
    locks: Arc<KindLocks>,
    key: LockKey,
}

impl KindGuard {
    /// The key this guard holds.
    pub fn key(&self) -> LockKey {
        self.key
    }
}

impl Drop for KindGuard {
    fn drop(&mut self) {
        self.locks.unlock(self.key);
    }
}
