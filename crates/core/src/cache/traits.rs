use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::Result;

/// Remaining lifetime of a key, as reported by `TTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "seconds")]
pub enum KeyTtl {
    /// The key does not exist (or has already expired).
    Missing,
    /// The key exists and never expires.
    NoExpiry,
    /// The key expires after this many whole seconds.
    Seconds(u64),
}

impl KeyTtl {
    /// Maps the raw `TTL` reply (`-2` missing, `-1` persistent) into a `KeyTtl`.
    pub fn from_redis_reply(reply: i64) -> Self {
        match reply {
            -1 => Self::NoExpiry,
            n if n < 0 => Self::Missing,
            n => Self::Seconds(n as u64),
        }
    }
}

/// Memory consumption reported by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    /// `None` when the store has no configured ceiling.
    pub max_bytes: Option<u64>,
}

/// Key/value operations a cache store must provide.
///
/// Implementations report failures as errors; the shell's `Store` wrapper is
/// what turns them into graceful misses.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Gets the raw value of a key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets a value with a TTL (`SET key value EX ttl`).
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Sets a value only if the key is absent (`SET key value NX EX ttl`).
    ///
    /// Returns true if the value was stored.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Atomically deletes a key only if its current value equals `expected`.
    ///
    /// Returns true if the key was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool>;

    /// Deletes keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Lists keys matching a glob pattern.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Returns the remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Round-trips a no-op command to check connectivity.
    async fn ping(&self) -> Result<()>;

    /// Reports how much memory the store is using.
    async fn memory_usage(&self) -> Result<MemoryUsage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ttl_from_redis_reply() {
        assert_eq!(KeyTtl::from_redis_reply(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_redis_reply(-1), KeyTtl::NoExpiry);
        assert_eq!(KeyTtl::from_redis_reply(0), KeyTtl::Seconds(0));
        assert_eq!(KeyTtl::from_redis_reply(180), KeyTtl::Seconds(180));
    }
}
