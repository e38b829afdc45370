//! Shared application state.
//!
//! Everything here is cheap to clone; handlers receive a copy per request.

use std::sync::Arc;

use cacheward_core::cache::{KeyBuilder, ResourceType, Result, StoreBackend};
use cacheward_core::observability::Metrics;
use cacheward_core::validation::ValidatorRegistry;

use crate::aside::CacheAside;
use crate::config::Config;
use crate::invalidation::InvalidationService;
use crate::middleware::RouteCache;
use crate::notify::{LogSink, NotificationQueue, NotificationSink};
use crate::observability::HealthMonitor;
use crate::store::{MemoryBackend, Store};

#[derive(Clone, Debug)]
pub struct AppState {
    pub store: Store,
    pub aside: CacheAside,
    pub invalidation: InvalidationService,
    pub monitor: HealthMonitor,
    pub notifier: Arc<NotificationQueue>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the state for the configured backend.
    ///
    /// Uses Redis when `REDIS_URL` is set and the `redis` feature is enabled,
    /// otherwise the in-memory backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis URL cannot be parsed into a pool.
    pub fn from_config(config: Config) -> Result<Self> {
        let keys = KeyBuilder::new(config.namespace.clone());
        let (backend, sink) = build_backend(&config, &keys)?;
        let store = Store::new(backend, keys, Arc::new(Metrics::new()));
        Ok(Self::assemble(store, sink, config))
    }

    /// Builds the state around an existing store, publishing events to the log.
    pub fn with_store(store: Store, config: Config) -> Self {
        Self::assemble(store, Arc::new(LogSink), config)
    }

    fn assemble(store: Store, sink: Arc<dyn NotificationSink>, config: Config) -> Self {
        let notifier = Arc::new(NotificationQueue::start(
            sink,
            config.notify_workers,
            config.notify_capacity,
        ));
        let aside = CacheAside::new(
            store.clone(),
            Arc::new(ValidatorRegistry::with_defaults()),
            config.aside_config(),
        );
        let invalidation = InvalidationService::new(store.clone(), aside.cooldowns().clone())
            .with_notifier(Arc::clone(&notifier));
        let monitor = HealthMonitor::new(store.clone(), config.key_warning_threshold);

        Self {
            store,
            aside,
            invalidation,
            monitor,
            notifier,
            config: Arc::new(config),
        }
    }

    /// Route settings for a resource, cached for the configured default TTL.
    pub fn route_cache(&self, resource: impl Into<ResourceType>) -> RouteCache {
        RouteCache::new(resource, self.config.cache_ttl())
    }

    /// Drains pending notifications and stops the workers.
    pub async fn shutdown(&self) {
        self.notifier.shutdown().await;
    }
}

#[cfg(feature = "redis")]
fn build_backend(
    config: &Config,
    keys: &KeyBuilder,
) -> Result<(Arc<dyn StoreBackend>, Arc<dyn NotificationSink>)> {
    use crate::notify::RedisSink;
    use crate::store::RedisBackend;

    let Some(url) = config.redis_url.as_deref() else {
        tracing::info!(
            max_entries = config.cache_max_entries,
            "using in-memory cache backend"
        );
        return Ok(memory_backend(config));
    };

    let backend = RedisBackend::connect(url, config.redis_pool_size, config.redis_timeout())?;
    let sink = RedisSink::new(backend.pool().clone(), keys.events_channel());
    tracing::info!(pool_size = config.redis_pool_size, "using redis cache backend");
    Ok((Arc::new(backend), Arc::new(sink)))
}

#[cfg(not(feature = "redis"))]
fn build_backend(
    config: &Config,
    _keys: &KeyBuilder,
) -> Result<(Arc<dyn StoreBackend>, Arc<dyn NotificationSink>)> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but the redis feature is disabled; using in-memory cache");
    }
    tracing::info!(
        max_entries = config.cache_max_entries,
        "using in-memory cache backend"
    );
    Ok(memory_backend(config))
}

fn memory_backend(config: &Config) -> (Arc<dyn StoreBackend>, Arc<dyn NotificationSink>) {
    (
        Arc::new(MemoryBackend::new(config.cache_max_entries)),
        Arc::new(LogSink),
    )
}
