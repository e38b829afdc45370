use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;

use cacheward_core::cache::{CacheError, KeyTtl, MemoryUsage, Result, StoreBackend};

use super::error::{map_pool_error, map_redis_error};

/// Deletes the key only while it still holds the caller's token.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Redis backend over a bounded connection pool.
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    timeout: Duration,
}

impl RedisBackend {
    /// Creates the pool. No connection is opened until the first command.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the URL is invalid.
    pub fn connect(url: &str, pool_size: usize, timeout: Duration) -> Result<Self> {
        let mut pool_config = PoolConfig::new(pool_size.max(1));
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let mut config = Config::from_url(url);
        config.pool = Some(pool_config);

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        Ok(Self { pool, timeout })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool.get().await.map_err(map_pool_error)
    }

    async fn bounded<T>(
        &self,
        command: &'static str,
        future: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T> {
        bounded(self.timeout, command, future).await
    }
}

/// Runs one Redis command, failing with `CacheError::Timeout` once `limit` elapses.
async fn bounded<T>(
    limit: Duration,
    command: &'static str,
    future: impl Future<Output = redis::RedisResult<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(map_redis_error),
        Err(_) => Err(CacheError::Timeout(format!(
            "{command} exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

/// Redis expiries are whole seconds and must be positive.
fn expiry_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Extracts a numeric field from an `INFO` reply.
fn info_field(info: &str, name: &str) -> Option<u64> {
    info.lines().find_map(|line| {
        let (field, value) = line.trim().split_once(':')?;
        (field == name).then(|| value.parse().ok()).flatten()
    })
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let result: Option<Vec<u8>> = self.bounded("GET", conn.get(key)).await?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = self
            .bounded("SETEX", conn.set_ex(key, value, expiry_seconds(ttl)))
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let mut command = redis::cmd("SET");
        command
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(expiry_seconds(ttl));
        let reply: Option<String> = self.bounded("SET NX", command.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(COMPARE_AND_DELETE);
        let mut invocation = script.key(key);
        invocation.arg(expected);
        let removed: i64 = self
            .bounded("EVALSHA", invocation.invoke_async(&mut conn))
            .await?;
        Ok(removed == 1)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = self.bounded("DEL", conn.del(keys)).await?;
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let mut command = redis::cmd("SCAN");
            command
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<String>) =
                self.bounded("SCAN", command.query_async(&mut conn)).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let mut conn = self.conn().await?;
        let reply: i64 = self.bounded("TTL", conn.ttl(key)).await?;
        Ok(KeyTtl::from_redis_reply(reply))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn memory_usage(&self) -> Result<MemoryUsage> {
        let mut conn = self.conn().await?;
        let mut command = redis::cmd("INFO");
        command.arg("memory");
        let info: String = self.bounded("INFO", command.query_async(&mut conn)).await?;

        Ok(MemoryUsage {
            used_bytes: info_field(&info, "used_memory").unwrap_or(0),
            max_bytes: info_field(&info, "maxmemory").filter(|max| *max > 0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\nmaxmemory:0\r\n";

    #[test]
    fn test_info_field() {
        assert_eq!(info_field(INFO, "used_memory"), Some(1_048_576));
        assert_eq!(info_field(INFO, "maxmemory"), Some(0));
        assert_eq!(info_field(INFO, "used_memory_human"), None);
        assert_eq!(info_field(INFO, "missing"), None);
    }

    #[test]
    fn test_expiry_is_at_least_one_second() {
        assert_eq!(expiry_seconds(Duration::from_millis(200)), 1);
        assert_eq!(expiry_seconds(Duration::from_secs(180)), 180);
    }

    #[tokio::test]
    async fn test_stalled_command_times_out() {
        let stalled = std::future::pending::<redis::RedisResult<String>>();

        let err = bounded(Duration::from_millis(20), "GET", stalled)
            .await
            .unwrap_err();

        assert_eq!(err, CacheError::Timeout("GET exceeded 20ms".into()));
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_command_errors_are_mapped_within_the_limit() {
        let failed = std::future::ready(redis::RedisResult::<String>::Err(
            (redis::ErrorKind::TypeError, "WRONGTYPE").into(),
        ));

        let err = bounded(Duration::from_secs(1), "GET", failed)
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::OperationFailed(_)));
    }

    /// Connects to `REDIS_URL`, or returns None so the test is skipped.
    async fn live_backend() -> Option<RedisBackend> {
        let url = std::env::var("REDIS_URL").ok()?;
        let backend = RedisBackend::connect(&url, 4, Duration::from_millis(500)).ok()?;
        backend.ping().await.ok()?;
        Some(backend)
    }

    #[tokio::test]
    async fn test_lock_primitives_against_redis() {
        let Some(backend) = live_backend().await else {
            eprintln!("REDIS_URL not reachable, skipping");
            return;
        };
        let key = format!("cacheward_test:{}:lock", uuid::Uuid::new_v4().simple());
        let ttl = Duration::from_secs(5);

        assert!(backend.set_if_absent(&key, b"t1", ttl).await.unwrap());
        assert!(!backend.set_if_absent(&key, b"t2", ttl).await.unwrap());
        assert!(!backend.compare_and_delete(&key, b"t2").await.unwrap());
        assert!(backend.compare_and_delete(&key, b"t1").await.unwrap());
        assert_eq!(backend.ttl(&key).await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_scan_and_delete_against_redis() {
        let Some(backend) = live_backend().await else {
            eprintln!("REDIS_URL not reachable, skipping");
            return;
        };
        let prefix = format!("cacheward_test:{}:", uuid::Uuid::new_v4().simple());
        let ttl = Duration::from_secs(30);
        for suffix in ["job:7", "job:8", "team:1"] {
            backend
                .set(&format!("{prefix}{suffix}"), b"{}", ttl)
                .await
                .unwrap();
        }

        let jobs = backend.scan(&format!("{prefix}job:*")).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(backend.delete(&jobs).await.unwrap(), 2);

        let rest = backend.scan(&format!("{prefix}*")).await.unwrap();
        assert_eq!(rest, vec![format!("{prefix}team:1")]);
        backend.delete(&rest).await.unwrap();
    }
}
