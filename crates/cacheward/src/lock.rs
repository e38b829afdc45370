//! Distributed recompute locks.
//!
//! A lock is a store key holding a random owner token, written with
//! set-if-absent and an expiry, and released with compare-and-delete so only
//! the holder can remove it. When the store is unreachable, `acquire` hands
//! out a degraded guard instead of failing: the caller proceeds without
//! mutual exclusion.

use std::time::Duration;

use uuid::Uuid;

use crate::store::{SetIfAbsent, Store};

#[derive(Debug, Clone)]
pub struct LockManager {
    store: Store,
}

impl LockManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Tries to take the lock for `ttl`.
    ///
    /// Returns `None` if another owner holds it.
    pub async fn acquire(&self, lock_key: &str, ttl: Duration) -> Option<LockGuard> {
        let token = Uuid::new_v4().simple().to_string();

        match self
            .store
            .set_if_absent(lock_key, token.as_bytes(), ttl)
            .await
        {
            SetIfAbsent::Stored => {
                tracing::trace!(lock = %lock_key, "lock acquired");
                Some(LockGuard::new(self.store.clone(), lock_key, token, false))
            }
            SetIfAbsent::Exists => None,
            SetIfAbsent::Unavailable => {
                tracing::warn!(lock = %lock_key, "store unreachable, proceeding without lock");
                Some(LockGuard::new(self.store.clone(), lock_key, token, true))
            }
        }
    }

    /// Releases the lock if `token` still owns it.
    ///
    /// Returns false when the lock expired or belongs to someone else.
    pub async fn release(&self, lock_key: &str, token: &str) -> bool {
        self.store
            .compare_and_delete(lock_key, token.as_bytes())
            .await
    }
}

/// Proof of holding a lock.
///
/// Release it with `release`; a guard dropped while still armed (the
/// computation panicked or its future was cancelled) releases in a spawned task.
#[derive(Debug)]
pub struct LockGuard {
    store: Store,
    key: String,
    token: String,
    degraded: bool,
    armed: bool,
}

impl LockGuard {
    fn new(store: Store, key: &str, token: String, degraded: bool) -> Self {
        Self {
            store,
            key: key.to_string(),
            token,
            degraded,
            armed: !degraded,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// True when the lock was granted without reaching the store.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Releases the lock. Returns false if it had already expired or was taken over.
    pub async fn release(mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;
        let released = self
            .store
            .compare_and_delete(&self.key, self.token.as_bytes())
            .await;
        if !released {
            tracing::debug!(lock = %self.key, "lock expired before release");
        }
        released
    }

    /// Disarms the guard and hands back the owner token for manual release.
    pub fn into_token(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.token)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(lock = %self.key, "no runtime to release lock, it will expire");
            return;
        };

        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        runtime.spawn(async move {
            if store.compare_and_delete(&key, token.as_bytes()).await {
                tracing::debug!(lock = %key, "released abandoned lock");
            }
        });
    }
}
