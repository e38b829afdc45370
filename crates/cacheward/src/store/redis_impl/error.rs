//! Redis and pool error mapping to CacheError.

use cacheward_core::cache::CacheError;
use deadpool_redis::PoolError;

/// Maps Redis errors to CacheError.
pub(crate) fn map_redis_error(err: redis::RedisError) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout(err.to_string())
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        CacheError::ConnectionFailed(err.to_string())
    } else {
        CacheError::OperationFailed(err.to_string())
    }
}

/// Maps connection checkout failures to CacheError.
pub(crate) fn map_pool_error(err: PoolError) -> CacheError {
    match err {
        PoolError::Timeout(_) => CacheError::Timeout(err.to_string()),
        PoolError::Backend(err) => map_redis_error(err),
        other => CacheError::ConnectionFailed(other.to_string()),
    }
}
