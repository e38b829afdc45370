use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

use cacheward_core::cache::{ResourceType, DEFAULT_NAMESPACE};

use crate::aside::{AsideConfig, CooldownPolicy, CooldownScope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Redis connection URL. Unset means the in-memory backend.
    pub redis_url: Option<String>,
    /// Key prefix for everything this process stores (default: "app:cache:")
    pub namespace: String,
    /// Maximum pooled Redis connections (default: 16)
    pub redis_pool_size: usize,
    /// Timeout in milliseconds for connecting, pool checkout and each command (default: 2,000)
    pub redis_timeout_ms: u64,
    /// Entry TTL for routes built with `AppState::route_cache` (default: 300)
    pub cache_ttl_seconds: u64,
    /// Recompute lock TTL in seconds (default: 10)
    pub lock_ttl_seconds: u64,
    /// Wait before re-reading after losing the lock, in milliseconds (default: 50)
    pub recheck_wait_ms: u64,
    /// Cooldown marker TTL in seconds, 0 disables cooldowns (default: 2)
    pub cooldown_seconds: u64,
    /// Kinds that get cooldowns; empty means all (default: all)
    pub cooldown_resources: Vec<ResourceType>,
    /// Capacity of the in-memory backend (default: 10,000)
    pub cache_max_entries: usize,
    /// Notification worker tasks (default: 2)
    pub notify_workers: usize,
    /// Notification queue capacity (default: 1,024)
    pub notify_capacity: usize,
    /// Store probe interval in seconds (default: 30)
    pub health_probe_interval_seconds: u64,
    /// Cached key count above which key distribution warns (default: 10,000)
    pub key_warning_threshold: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `REDIS_URL`, `CACHE_NAMESPACE`, `REDIS_POOL_SIZE`, `REDIS_TIMEOUT_MS`
    /// - `CACHE_TTL_SECONDS`, `CACHE_LOCK_TTL_SECONDS`, `CACHE_RECHECK_WAIT_MS`
    /// - `CACHE_COOLDOWN_SECONDS`, `CACHE_COOLDOWN_RESOURCES` (comma separated)
    /// - `CACHE_MAX_ENTRIES`, `NOTIFY_WORKERS`, `NOTIFY_CAPACITY`
    /// - `HEALTH_PROBE_INTERVAL_SECONDS`, `CACHE_KEY_WARNING_THRESHOLD`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a variable that is set but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parse = |name: &'static str, default: u64| parse_var(&lookup, name, default);
        let parse_size = |name: &'static str, default: usize| parse_var(&lookup, name, default);

        Ok(Self {
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            namespace: lookup("CACHE_NAMESPACE")
                .filter(|ns| !ns.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            redis_pool_size: parse_size("REDIS_POOL_SIZE", 16)?,
            redis_timeout_ms: parse("REDIS_TIMEOUT_MS", 2_000)?,
            cache_ttl_seconds: parse("CACHE_TTL_SECONDS", 300)?,
            lock_ttl_seconds: parse("CACHE_LOCK_TTL_SECONDS", 10)?,
            recheck_wait_ms: parse("CACHE_RECHECK_WAIT_MS", 50)?,
            cooldown_seconds: parse("CACHE_COOLDOWN_SECONDS", 2)?,
            cooldown_resources: lookup("CACHE_COOLDOWN_RESOURCES")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|kind| !kind.is_empty())
                        .map(ResourceType::from)
                        .collect()
                })
                .unwrap_or_default(),
            cache_max_entries: parse_size("CACHE_MAX_ENTRIES", 10_000)?,
            notify_workers: parse_size("NOTIFY_WORKERS", 2)?,
            notify_capacity: parse_size("NOTIFY_CAPACITY", 1_024)?,
            health_probe_interval_seconds: parse("HEALTH_PROBE_INTERVAL_SECONDS", 30)?,
            key_warning_threshold: parse("CACHE_KEY_WARNING_THRESHOLD", 10_000)?,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }

    pub fn health_probe_interval(&self) -> Duration {
        Duration::from_secs(self.health_probe_interval_seconds.max(1))
    }

    pub fn aside_config(&self) -> AsideConfig {
        let scope = if self.cooldown_resources.is_empty() {
            CooldownScope::All
        } else {
            CooldownScope::Only(self.cooldown_resources.iter().cloned().collect())
        };

        AsideConfig {
            lock_ttl: Duration::from_secs(self.lock_ttl_seconds.max(1)),
            recheck_wait: Duration::from_millis(self.recheck_wait_ms),
            cooldown: CooldownPolicy {
                ttl: Duration::from_secs(self.cooldown_seconds),
                scope,
            },
        }
    }
}

impl Default for Config {
    /// Built-in defaults, ignoring the environment.
    fn default() -> Self {
        Self {
            redis_url: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            redis_pool_size: 16,
            redis_timeout_ms: 2_000,
            cache_ttl_seconds: 300,
            lock_ttl_seconds: 10,
            recheck_wait_ms: 50,
            cooldown_seconds: 2,
            cooldown_resources: Vec::new(),
            cache_max_entries: 10_000,
            notify_workers: 2,
            notify_capacity: 1_024,
            health_probe_interval_seconds: 30,
            key_warning_threshold: 10_000,
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: value.clone(),
        }),
    }
}
