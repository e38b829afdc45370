//! In-memory store backend with LRU eviction.
//!
//! Mirrors the Redis backend closely enough to run every cache component
//! without a server: TTLs expire lazily against an injectable clock, and
//! pattern scans use the same glob rules as `SCAN MATCH`.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;

use cacheward_core::cache::{pattern_matches, KeyTtl, MemoryUsage, Result, StoreBackend};

/// Source of the current instant for expiry decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_millis: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory backend bounded by entry count.
///
/// Expired entries are dropped when touched or during scans.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    store: Arc<RwLock<LruCache<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    /// Creates a backend holding at most `max_entries` keys (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Arc::new(RwLock::new(LruCache::new(capacity))),
            clock,
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let store = self.store.read().await;
        store.iter().filter(|(_, entry)| !entry.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut store = self.store.write().await;

        match store.get(key).map(|entry| (entry.is_expired(now), entry.value.clone())) {
            Some((true, _)) => {
                store.pop(key);
                Ok(None)
            }
            Some((false, value)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let entry = Entry {
            value: value.to_vec(),
            expires_at: self.clock.now() + ttl,
        };
        self.store.write().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let mut store = self.store.write().await;

        if store.peek(key).is_some_and(|entry| !entry.is_expired(now)) {
            return Ok(false);
        }
        store.put(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let now = self.clock.now();
        let mut store = self.store.write().await;

        let matches = store
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now) && entry.value == expected);
        if matches {
            store.pop(key);
        }
        Ok(matches)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let now = self.clock.now();
        let mut store = self.store.write().await;

        let removed = keys
            .iter()
            .filter_map(|key| store.pop(key))
            .filter(|entry| !entry.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let mut store = self.store.write().await;

        let mut expired = Vec::new();
        let mut matched = Vec::new();
        for (key, entry) in store.iter() {
            if entry.is_expired(now) {
                expired.push(key.clone());
            } else if pattern_matches(pattern, key) {
                matched.push(key.clone());
            }
        }
        for key in &expired {
            store.pop(key);
        }
        Ok(matched)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let now = self.clock.now();
        let store = self.store.read().await;

        Ok(match store.peek(key) {
            Some(entry) if !entry.is_expired(now) => {
                let remaining = entry.expires_at.duration_since(now);
                KeyTtl::Seconds((remaining.as_millis() as u64 + 500) / 1000)
            }
            _ => KeyTtl::Missing,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn memory_usage(&self) -> Result<MemoryUsage> {
        let store = self.store.read().await;
        let used_bytes = store
            .iter()
            .map(|(key, entry)| (key.len() + entry.value.len()) as u64)
            .sum();
        Ok(MemoryUsage {
            used_bytes,
            max_bytes: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn backend_with_clock() -> (MemoryBackend, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (MemoryBackend::with_clock(100, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::new(100);
        backend.set("key1", b"value1", MINUTE).await.unwrap();

        let result = backend.get("key1").await.unwrap();
        assert_eq!(result, Some(b"value1".to_vec()));
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire_on_the_clock() {
        let (backend, clock) = backend_with_clock();
        backend
            .set("job", b"{}", Duration::from_secs(180))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(179));
        assert!(backend.get("job").await.unwrap().is_some());

        clock.advance(Duration::from_secs(2));
        assert!(backend.get("job").await.unwrap().is_none());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let backend = MemoryBackend::new(2);
        backend.set("a", b"1", MINUTE).await.unwrap();
        backend.set("b", b"2", MINUTE).await.unwrap();
        backend.get("a").await.unwrap();
        backend.set("c", b"3", MINUTE).await.unwrap();

        assert!(backend.get("a").await.unwrap().is_some());
        assert!(backend.get("b").await.unwrap().is_none());
        assert!(backend.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let (backend, clock) = backend_with_clock();
        assert!(backend.set_if_absent("lock", b"t1", MINUTE).await.unwrap());
        assert!(!backend.set_if_absent("lock", b"t2", MINUTE).await.unwrap());
        assert_eq!(backend.get("lock").await.unwrap(), Some(b"t1".to_vec()));

        clock.advance(MINUTE);
        assert!(backend.set_if_absent("lock", b"t3", MINUTE).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let backend = MemoryBackend::new(10);
        backend.set("lock", b"t1", MINUTE).await.unwrap();

        assert!(!backend.compare_and_delete("lock", b"other").await.unwrap());
        assert!(backend.get("lock").await.unwrap().is_some());
        assert!(backend.compare_and_delete("lock", b"t1").await.unwrap());
        assert!(!backend.compare_and_delete("lock", b"t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_counts_live_keys() {
        let (backend, clock) = backend_with_clock();
        backend.set("a", b"1", MINUTE).await.unwrap();
        backend.set("b", b"1", Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(backend.delete(&keys).await.unwrap(), 1);
        assert_eq!(backend.delete(&keys).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_matches_and_purges() {
        let (backend, clock) = backend_with_clock();
        backend.set("ns:job:1", b"1", MINUTE).await.unwrap();
        backend.set("ns:job:2", b"1", Duration::from_secs(1)).await.unwrap();
        backend.set("ns:team:1", b"1", MINUTE).await.unwrap();
        clock.advance(Duration::from_secs(5));

        let mut keys = backend.scan("ns:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ns:job:1", "ns:team:1"]);
        assert_eq!(backend.scan("ns:job:*").await.unwrap(), vec!["ns:job:1"]);
        assert_eq!(backend.len().await, 2);
    }

    #[tokio::test]
    async fn test_ttl() {
        let (backend, clock) = backend_with_clock();
        backend.set("k", b"1", Duration::from_secs(180)).await.unwrap();
        assert_eq!(backend.ttl("k").await.unwrap(), KeyTtl::Seconds(180));

        clock.advance(Duration::from_secs(30));
        assert_eq!(backend.ttl("k").await.unwrap(), KeyTtl::Seconds(150));
        assert_eq!(backend.ttl("nope").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_memory_usage_counts_keys_and_values() {
        let backend = MemoryBackend::new(10);
        backend.set("ab", b"1234", MINUTE).await.unwrap();
        let usage = backend.memory_usage().await.unwrap();
        assert_eq!(usage.used_bytes, 6);
        assert_eq!(usage.max_bytes, None);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let _backend = MemoryBackend::new(0);
    }
}
