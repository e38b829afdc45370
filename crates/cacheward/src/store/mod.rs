//! The best-effort store every cache component talks to.
//!
//! `Store` wraps a `StoreBackend` and owns three policies: every key and
//! pattern is confined to the namespace, values are JSON, and backend
//! failures never escape. A failed read is a miss and a failed write is
//! `false`; the error is logged, counted and flips `is_available`.

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_impl;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use cacheward_core::cache::{
    has_char_class, is_lock_key, serialization, CacheError, KeyBuilder, KeyTtl, MemoryUsage,
    Result, StoreBackend,
};
use cacheward_core::observability::Metrics;

pub use memory::{Clock, ManualClock, MemoryBackend, SystemClock};

#[cfg(feature = "redis")]
pub use redis_impl::RedisBackend;

/// Keys removed per backend call during pattern deletes.
const DELETE_CHUNK: usize = 500;

/// Result of an atomic set-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetIfAbsent {
    Stored,
    Exists,
    /// The store could not be reached; nothing is known about the key.
    Unavailable,
}

#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StoreBackend>,
    keys: KeyBuilder,
    metrics: Arc<Metrics>,
    available: Arc<AtomicBool>,
}

impl Store {
    pub fn new(backend: Arc<dyn StoreBackend>, keys: KeyBuilder, metrics: Arc<Metrics>) -> Self {
        Self {
            backend,
            keys,
            metrics,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A store over a fresh in-memory backend with the default namespace.
    pub fn in_memory(max_entries: usize) -> Self {
        Self::new(
            Arc::new(MemoryBackend::new(max_entries)),
            KeyBuilder::default(),
            Arc::new(Metrics::new()),
        )
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// False after an operation failed because the backend was unreachable,
    /// until the next successful operation.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Converts a backend result into an optional value, logging failures.
    fn settle<T>(&self, operation: &'static str, key: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.mark_available();
                Some(value)
            }
            Err(err) => {
                self.record_failure(operation, key, &err);
                None
            }
        }
    }

    fn mark_available(&self) {
        if !self.available.swap(true, Ordering::Relaxed) {
            tracing::info!("cache store reachable again");
        }
    }

    fn record_failure(&self, operation: &'static str, key: &str, err: &CacheError) {
        self.metrics.record_store_error();
        if err.is_unavailable() {
            self.available.store(false, Ordering::Relaxed);
        }
        tracing::warn!(operation, key = %key, error = %err, "cache store operation failed");
    }

    /// Reads a JSON value. Undecodable bytes are deleted and counted as a
    /// validation failure.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        let key = self.keys.confine(key);
        let bytes = self.settle("get", &key, self.backend.get(&key).await)??;

        match serialization::decode(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "dropping undecodable cache entry");
                self.metrics.record_validation_failure();
                self.delete(&key).await;
                None
            }
        }
    }

    /// Reads and deserializes a value; a shape mismatch reads as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key).await?;
        match serialization::from_value(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                tracing::debug!(key = %key, error = %err, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Returns true if a live entry exists under the key.
    pub async fn contains(&self, key: &str) -> bool {
        let key = self.keys.confine(key);
        matches!(
            self.settle("get", &key, self.backend.get(&key).await),
            Some(Some(_))
        )
    }

    pub async fn set_value(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        let key = self.keys.confine(key);
        let bytes = match serialization::encode(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "value not serializable, skipping write");
                return false;
            }
        };
        self.settle("set", &key, self.backend.set(&key, &bytes, ttl).await)
            .is_some()
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        match serialization::to_value(value) {
            Ok(value) => self.set_value(key, &value, ttl).await,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "value not serializable, skipping write");
                false
            }
        }
    }

    /// Atomically stores `value` unless the key already exists.
    pub async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> SetIfAbsent {
        let key = self.keys.confine(key);
        match self.settle(
            "set_if_absent",
            &key,
            self.backend.set_if_absent(&key, value, ttl).await,
        ) {
            Some(true) => SetIfAbsent::Stored,
            Some(false) => SetIfAbsent::Exists,
            None => SetIfAbsent::Unavailable,
        }
    }

    /// Deletes the key only if it still holds `expected`.
    pub async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> bool {
        let key = self.keys.confine(key);
        self.settle(
            "compare_and_delete",
            &key,
            self.backend.compare_and_delete(&key, expected).await,
        )
        .unwrap_or(false)
    }

    /// Deletes one key and returns how many were removed (0 or 1).
    pub async fn delete(&self, key: &str) -> u64 {
        self.try_delete(key).await.unwrap_or(0)
    }

    /// Like `delete`, but reports a failed delete as an error (already logged).
    pub async fn try_delete(&self, key: &str) -> Result<u64> {
        let key = self.keys.confine(key);
        let result = self.backend.delete(std::slice::from_ref(&key)).await;
        self.settle_result("delete", &key, result)
    }

    fn settle_result<T>(&self, operation: &'static str, key: &str, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.mark_available();
                Ok(value)
            }
            Err(err) => {
                self.record_failure(operation, key, &err);
                Err(err)
            }
        }
    }

    /// Lists live keys matching a glob confined to the namespace.
    pub async fn scan(&self, pattern: &str) -> Vec<String> {
        self.try_scan(pattern).await.unwrap_or_default()
    }

    /// Like [`Store::scan`] but surfaces failures. Patterns with `[...]`
    /// classes are refused; the in-memory backend cannot match them.
    pub async fn try_scan(&self, pattern: &str) -> Result<Vec<String>> {
        if has_char_class(pattern) {
            return Err(CacheError::InvalidPattern(pattern.to_string()));
        }
        let pattern = self.keys.confine(pattern);
        let result = self.backend.scan(&pattern).await;
        self.settle_result("scan", &pattern, result)
    }

    /// Deletes every key matching the pattern and returns the count.
    ///
    /// Lock keys are never removed; they belong to their holder and expire.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        self.try_delete_pattern(pattern).await.unwrap_or(0)
    }

    pub async fn try_delete_pattern(&self, pattern: &str) -> Result<u64> {
        self.try_delete_pattern_except(pattern, |_| false).await
    }

    /// Deletes keys matching the pattern, sparing locks and any key `keep` accepts.
    pub async fn try_delete_pattern_except(
        &self,
        pattern: &str,
        keep: impl Fn(&str) -> bool,
    ) -> Result<u64> {
        let keys: Vec<String> = self
            .try_scan(pattern)
            .await?
            .into_iter()
            .filter(|key| !is_lock_key(key) && !keep(key))
            .collect();

        let mut removed = 0;
        for chunk in keys.chunks(DELETE_CHUNK) {
            let result = self.backend.delete(chunk).await;
            removed += self.settle_result("delete_pattern", pattern, result)?;
        }

        tracing::debug!(pattern = %pattern, removed, "deleted keys by pattern");
        Ok(removed)
    }

    /// Remaining lifetime of a key; `Missing` when absent or unreachable.
    pub async fn ttl_of(&self, key: &str) -> KeyTtl {
        let key = self.keys.confine(key);
        self.settle("ttl", &key, self.backend.ttl(&key).await)
            .unwrap_or(KeyTtl::Missing)
    }

    /// Pings the backend and returns the round trip.
    pub async fn ping(&self) -> Result<Duration> {
        let started = Instant::now();
        let result = self.backend.ping().await;
        self.settle_result("ping", "", result)?;
        Ok(started.elapsed())
    }

    pub async fn memory_usage(&self) -> Result<MemoryUsage> {
        let result = self.backend.memory_usage().await;
        self.settle_result("memory_usage", "", result)
    }

    /// Pings the backend every `interval` so `is_available` recovers without traffic.
    pub fn spawn_probe(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.ping().await {
                    Ok(latency) => {
                        tracing::trace!(latency_ms = latency.as_millis() as u64, "cache probe ok")
                    }
                    Err(err) => tracing::debug!(error = %err, "cache probe failed"),
                }
            }
        })
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("namespace", &self.keys.namespace())
            .field("available", &self.is_available())
            .finish()
    }
}
