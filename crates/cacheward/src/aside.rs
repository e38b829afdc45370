//! Cache-aside orchestration.
//!
//! `get_or_compute` serves a request from the store when it can and falls
//! back to the caller's computation otherwise:
//!
//! 1. A forced refresh deletes the key first.
//! 2. An active cooldown marker bypasses the cache for both read and write.
//! 3. A valid cached value is a hit.
//! 4. On a miss one caller takes the recompute lock, computes, validates and
//!    writes back. Everyone else waits once, re-reads, and computes without
//!    caching if the value still is not there.
//!
//! Cache failures never fail the request; only `compute` errors propagate.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use cacheward_core::cache::{lock_key, serialization, CacheRequest, ResourceType};
use cacheward_core::observability::Metrics;
use cacheward_core::validation::ValidatorRegistry;

use crate::lock::LockManager;
use crate::store::Store;

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);
pub const DEFAULT_RECHECK_WAIT: Duration = Duration::from_millis(50);
pub const DEFAULT_COOLDOWN_TTL: Duration = Duration::from_secs(2);

/// How a value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the store.
    Hit,
    /// Computed under the lock and written back.
    Miss,
    /// Another caller computed it while this one waited.
    RaceHit,
    /// The cache was skipped entirely.
    Bypass(BypassReason),
    /// Computed but not written (contention, rejection, or an unreachable store).
    Uncached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    Cooldown,
}

impl CacheOutcome {
    /// Value for the `X-Cache` response header.
    pub fn header_value(&self) -> &'static str {
        match self {
            Self::Hit | Self::RaceHit => "HIT",
            Self::Miss | Self::Uncached => "MISS",
            Self::Bypass(_) => "BYPASS",
        }
    }
}

/// A value together with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub outcome: CacheOutcome,
}

impl<T> Cached<T> {
    fn new(value: T, outcome: CacheOutcome) -> Self {
        Self { value, outcome }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Which resource kinds get a cooldown marker after invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownScope {
    All,
    Only(HashSet<ResourceType>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub ttl: Duration,
    pub scope: CooldownScope,
}

impl CooldownPolicy {
    pub fn applies_to(&self, resource: &ResourceType) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        match &self.scope {
            CooldownScope::All => true,
            CooldownScope::Only(kinds) => kinds.contains(resource),
        }
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_COOLDOWN_TTL,
            scope: CooldownScope::All,
        }
    }
}

/// Post-invalidation markers that keep in-flight readers from writing stale data back.
#[derive(Debug, Clone)]
pub struct Cooldowns {
    store: Store,
    policy: CooldownPolicy,
}

impl Cooldowns {
    pub fn new(store: Store, policy: CooldownPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    /// Sets a marker for the resource kind, or for one id of it.
    ///
    /// Returns false when the policy excludes the kind or the write failed.
    pub async fn start(&self, resource: &ResourceType, resource_id: Option<&str>) -> bool {
        if !self.policy.applies_to(resource) {
            return false;
        }
        let key = self.store.keys().cooldown_key(resource, resource_id);
        let started = self
            .store
            .set_value(&key, &Value::Bool(true), self.policy.ttl)
            .await;
        if started {
            tracing::debug!(resource = %resource, id = ?resource_id, "cooldown started");
        }
        started
    }

    /// True if a marker covers the kind as a whole or the given id.
    pub async fn is_active(&self, resource: &ResourceType, resource_id: Option<&str>) -> bool {
        if !self.policy.applies_to(resource) {
            return false;
        }
        let keys = self.store.keys();
        if self.store.contains(&keys.cooldown_key(resource, None)).await {
            return true;
        }
        match resource_id {
            Some(id) => self.store.contains(&keys.cooldown_key(resource, Some(id))).await,
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AsideConfig {
    /// Lifetime of a recompute lock; must exceed the slowest computation.
    pub lock_ttl: Duration,
    /// How long a caller that lost the lock waits before re-reading.
    pub recheck_wait: Duration,
    pub cooldown: CooldownPolicy,
}

impl Default for AsideConfig {
    fn default() -> Self {
        Self {
            lock_ttl: DEFAULT_LOCK_TTL,
            recheck_wait: DEFAULT_RECHECK_WAIT,
            cooldown: CooldownPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheAside {
    store: Store,
    locks: LockManager,
    cooldowns: Cooldowns,
    validators: Arc<ValidatorRegistry>,
    config: AsideConfig,
}

impl CacheAside {
    pub fn new(store: Store, validators: Arc<ValidatorRegistry>, config: AsideConfig) -> Self {
        Self {
            locks: LockManager::new(store.clone()),
            cooldowns: Cooldowns::new(store.clone(), config.cooldown.clone()),
            store,
            validators,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cooldowns(&self) -> &Cooldowns {
        &self.cooldowns
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    fn metrics(&self) -> &Metrics {
        self.store.metrics()
    }

    /// Returns the cached value for `request`, or computes and caches it.
    ///
    /// # Errors
    ///
    /// Only errors returned by `compute` are propagated; the recompute lock is
    /// released before they are.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        request: &CacheRequest,
        compute: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.store.keys().build(request);
        let resource = &request.resource;
        let resource_id = request.resource_id.as_deref();

        if request.force_refresh {
            self.store.delete(&key).await;
            self.metrics().record_forced_refresh();
            tracing::debug!(key = %key, "forced refresh");
        }

        if self.cooldowns.is_active(resource, resource_id).await {
            self.metrics().record_cooldown_skip();
            tracing::debug!(key = %key, "cooldown active, bypassing cache");
            let value = compute().await?;
            return Ok(Cached::new(value, CacheOutcome::Bypass(BypassReason::Cooldown)));
        }

        if !request.force_refresh {
            if let Some(value) = self.lookup(resource, &key).await {
                self.metrics().record_hit();
                tracing::trace!(key = %key, "cache hit");
                return Ok(Cached::new(value, CacheOutcome::Hit));
            }
        }
        self.metrics().record_miss();

        let Some(guard) = self.locks.acquire(&lock_key(&key), self.config.lock_ttl).await else {
            return self.contended(request, &key, compute).await;
        };

        let value = match compute().await {
            Ok(value) => value,
            Err(err) => {
                guard.release().await;
                return Err(err);
            }
        };
        let stored = self.write_back(request, &key, &value).await;
        guard.release().await;

        let outcome = if stored {
            CacheOutcome::Miss
        } else {
            CacheOutcome::Uncached
        };
        Ok(Cached::new(value, outcome))
    }

    /// Another caller holds the lock: wait once, re-read, else compute uncached.
    async fn contended<T, E, F, Fut>(
        &self,
        request: &CacheRequest,
        key: &str,
        compute: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        tokio::time::sleep(self.config.recheck_wait).await;

        if let Some(value) = self.lookup(&request.resource, key).await {
            self.metrics().record_race_prevented();
            tracing::debug!(key = %key, "recompute avoided, value appeared while waiting");
            return Ok(Cached::new(value, CacheOutcome::RaceHit));
        }

        self.metrics().record_lock_timeout();
        tracing::debug!(key = %key, "lock still held after wait, computing uncached");
        let value = compute().await?;
        Ok(Cached::new(value, CacheOutcome::Uncached))
    }

    /// Reads and validates a cached value. Rejected values are deleted.
    async fn lookup<T: DeserializeOwned>(&self, resource: &ResourceType, key: &str) -> Option<T> {
        let value = self.store.get_value(key).await?;

        let outcome = self.validators.validate(resource, &value);
        if !outcome.valid {
            self.reject_cached(key, &outcome.reason).await;
            return None;
        }

        match serialization::from_value(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                self.reject_cached(key, &err.to_string()).await;
                None
            }
        }
    }

    async fn reject_cached(&self, key: &str, reason: &str) {
        tracing::warn!(key = %key, reason, "dropping invalid cached value");
        self.metrics().record_validation_failure();
        self.store.delete(key).await;
    }

    /// Validates and stores a fresh value. Returns true if it was written.
    async fn write_back<T: Serialize>(&self, request: &CacheRequest, key: &str, value: &T) -> bool {
        let value = match serialization::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "computed value not serializable");
                return false;
            }
        };

        if value.is_null() {
            tracing::trace!(key = %key, "nothing to cache");
            return false;
        }

        let outcome = self.validators.validate(&request.resource, &value);
        if !outcome.valid {
            self.metrics().record_validation_failure();
            tracing::warn!(key = %key, reason = %outcome.reason, "computed value failed validation, not caching");
            return false;
        }

        // An invalidation may have landed while computing.
        if self
            .cooldowns
            .is_active(&request.resource, request.resource_id.as_deref())
            .await
        {
            self.metrics().record_cooldown_skip();
            tracing::debug!(key = %key, "cooldown started during compute, not caching");
            return false;
        }

        let written = self.store.set_value(key, &value, request.ttl).await;
        if written {
            self.metrics().record_write();
        }
        written
    }
}
