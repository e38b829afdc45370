//! Health checks against the live store, and the alerts and report built on them.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use cacheward_core::cache::is_lock_key;
use cacheward_core::observability::{
    classify_latency, classify_memory, derive_alerts, ttl_bucket, Alert, CacheReport,
    HealthCheckResult, HealthChecks, HealthStatus, TTL_BUCKETS,
};

use crate::store::Store;

/// Keys whose TTL is inspected per distribution check.
pub const DEFAULT_TTL_SAMPLE: usize = 200;
pub const DEFAULT_KEY_WARNING_THRESHOLD: u64 = 10_000;

const PROBE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    store: Store,
    key_warning_threshold: u64,
    ttl_sample: usize,
}

impl HealthMonitor {
    pub fn new(store: Store, key_warning_threshold: u64) -> Self {
        Self {
            store,
            key_warning_threshold,
            ttl_sample: DEFAULT_TTL_SAMPLE,
        }
    }

    pub fn with_ttl_sample(mut self, ttl_sample: usize) -> Self {
        self.ttl_sample = ttl_sample;
        self
    }

    /// Runs the three checks concurrently.
    pub async fn run_checks(&self) -> HealthChecks {
        let (connectivity, memory, key_distribution) = tokio::join!(
            self.check_connectivity(),
            self.check_memory(),
            self.check_key_distribution()
        );
        HealthChecks {
            connectivity,
            memory,
            key_distribution,
        }
    }

    /// Ping plus a throwaway write, read and delete.
    pub async fn check_connectivity(&self) -> HealthCheckResult {
        let ping = match self.store.ping().await {
            Ok(latency) => latency,
            Err(err) => return HealthCheckResult::unhealthy(format!("ping failed: {err}")),
        };

        let nonce = Uuid::new_v4().simple().to_string();
        let key = self.store.keys().health_probe_key(&nonce);
        let started = Instant::now();
        let written = self.store.set_value(&key, &json!(nonce), PROBE_TTL).await;
        let read_back = self.store.get_value(&key).await;
        self.store.delete(&key).await;
        let round_trip = started.elapsed();

        let ping_ms = ping.as_millis() as u64;
        let round_trip_ms = round_trip.as_millis() as u64;

        let result = if !written || read_back != Some(Value::String(nonce)) {
            HealthCheckResult::new(HealthStatus::Critical, "probe value did not round-trip")
        } else {
            let status = classify_latency(ping_ms.max(round_trip_ms));
            HealthCheckResult::new(status, format!("ping {ping_ms}ms, round trip {round_trip_ms}ms"))
        };
        result
            .with_measurement("ping_ms", ping_ms)
            .with_measurement("round_trip_ms", round_trip_ms)
    }

    pub async fn check_memory(&self) -> HealthCheckResult {
        let usage = match self.store.memory_usage().await {
            Ok(usage) => usage,
            Err(err) => return HealthCheckResult::unhealthy(format!("memory info unavailable: {err}")),
        };

        let (status, percent) = classify_memory(usage.used_bytes, usage.max_bytes);
        let message = match percent {
            Some(percent) => format!("{percent}% of maxmemory used"),
            None => format!("{} bytes used, no limit configured", usage.used_bytes),
        };
        HealthCheckResult::new(status, message)
            .with_measurement("used_bytes", usage.used_bytes)
            .with_measurement("max_bytes", usage.max_bytes)
            .with_measurement("usage_percent", percent)
    }

    /// Counts keys per resource kind and buckets a sample of their TTLs.
    pub async fn check_key_distribution(&self) -> HealthCheckResult {
        let keys = self.store.keys();
        let all = match self.store.try_scan(&keys.namespace_pattern()).await {
            Ok(all) => all,
            Err(err) => return HealthCheckResult::unhealthy(format!("scan failed: {err}")),
        };

        let mut by_resource: BTreeMap<String, u64> = BTreeMap::new();
        let mut cached = Vec::new();
        let mut locks = 0u64;
        for key in &all {
            if is_lock_key(key) {
                locks += 1;
                continue;
            }
            if let Some(resource) = keys.resource_type_of(key) {
                *by_resource.entry(resource.to_string()).or_default() += 1;
                cached.push(key);
            }
        }

        let mut histogram: BTreeMap<&str, u64> =
            TTL_BUCKETS.iter().map(|bucket| (*bucket, 0)).collect();
        let sample: Vec<_> = cached.iter().take(self.ttl_sample).collect();
        for key in &sample {
            if let Some(bucket) = ttl_bucket(self.store.ttl_of(key).await) {
                *histogram.entry(bucket).or_default() += 1;
            }
        }

        let total = cached.len() as u64;
        let status = if total > self.key_warning_threshold {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
        let message = if status == HealthStatus::Warning {
            format!(
                "{total} cached keys exceeds {} threshold",
                self.key_warning_threshold
            )
        } else {
            format!("{total} cached keys")
        };

        HealthCheckResult::new(status, message)
            .with_measurement("total_keys", total)
            .with_measurement("lock_keys", locks)
            .with_measurement("by_resource", json!(by_resource))
            .with_measurement("ttl_histogram", json!(histogram))
            .with_measurement("ttl_sampled", sample.len())
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        let checks = self.run_checks().await;
        derive_alerts(&self.store.metrics().snapshot(), &checks)
    }

    pub async fn report(&self) -> CacheReport {
        let checks = self.run_checks().await;
        let report = CacheReport::build(self.store.metrics().snapshot(), checks, Utc::now());
        if report.overall_status > HealthStatus::Healthy {
            tracing::warn!(
                status = %report.overall_status,
                alerts = report.alerts.len(),
                "cache health degraded"
            );
        }
        report
    }
}
