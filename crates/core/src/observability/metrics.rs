use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide cache counters.
///
/// Constructed once at startup and shared by reference (`Arc<Metrics>`);
/// every component increments it in place. Counters only grow, except through
/// `reset`, which exists for tests.
#[derive(Debug, Default)]
pub struct Metrics {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    forced_refreshes: AtomicU64,
    lock_timeouts: AtomicU64,
    validation_failures: AtomicU64,
    races_prevented: AtomicU64,
    cooldown_skips: AtomicU64,
    writes: AtomicU64,
    store_errors: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $field:ident) => {
        pub fn $record(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_hit, hits);
    counter!(record_miss, misses);
    counter!(record_forced_refresh, forced_refreshes);
    counter!(record_lock_timeout, lock_timeouts);
    counter!(record_validation_failure, validation_failures);
    counter!(record_race_prevented, races_prevented);
    counter!(record_cooldown_skip, cooldown_skips);
    counter!(record_write, writes);
    counter!(record_store_error, store_errors);

    /// Adds the number of keys removed by one invalidation.
    pub fn record_invalidations(&self, removed: u64) {
        self.invalidations.fetch_add(removed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            (hits as f64 / total_requests as f64 * 10_000.0).round() / 100.0
        };

        MetricsSnapshot {
            hits,
            misses,
            total_requests,
            hit_rate,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            forced_refreshes: self.forced_refreshes.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            races_prevented: self.races_prevented.load(Ordering::Relaxed),
            cooldown_skips: self.cooldown_skips.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.invalidations,
            &self.forced_refreshes,
            &self.lock_timeouts,
            &self.validation_failures,
            &self.races_prevented,
            &self.cooldown_skips,
            &self.writes,
            &self.store_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of the counters, with the derived hit rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    /// Percentage of lookups served from cache, rounded to two decimals.
    pub hit_rate: f64,
    pub invalidations: u64,
    pub forced_refreshes: u64,
    pub lock_timeouts: u64,
    pub validation_failures: u64,
    pub races_prevented: u64,
    pub cooldown_skips: u64,
    pub writes: u64,
    pub store_errors: u64,
}
