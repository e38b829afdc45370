use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{LATENCY_CRITICAL_MS, LATENCY_WARNING_MS, MEMORY_CRITICAL_PERCENT, MEMORY_WARNING_PERCENT};
use crate::cache::KeyTtl;

/// Health of one check, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Returns the worst status of the iterator, `Healthy` when empty.
    pub fn worst(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
        statuses.into_iter().max().unwrap_or(HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one health check with the raw measurements behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
    pub measurements: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            measurements: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    pub fn with_measurement(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.measurements.insert(name.to_string(), value.into());
        self
    }
}

/// Results of one run of every health check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthChecks {
    pub connectivity: HealthCheckResult,
    pub memory: HealthCheckResult,
    pub key_distribution: HealthCheckResult,
}

impl HealthChecks {
    pub fn overall(&self) -> HealthStatus {
        HealthStatus::worst([
            self.connectivity.status,
            self.memory.status,
            self.key_distribution.status,
        ])
    }
}

/// Classifies a store round trip.
pub fn classify_latency(latency_ms: u64) -> HealthStatus {
    if latency_ms > LATENCY_CRITICAL_MS {
        HealthStatus::Critical
    } else if latency_ms > LATENCY_WARNING_MS {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Classifies memory pressure. Returns the usage percentage when a limit is
/// configured; without a limit memory is always healthy.
pub fn classify_memory(used_bytes: u64, max_bytes: Option<u64>) -> (HealthStatus, Option<f64>) {
    let Some(max) = max_bytes.filter(|max| *max > 0) else {
        return (HealthStatus::Healthy, None);
    };

    let percent = (used_bytes as f64 / max as f64 * 10_000.0).round() / 100.0;
    let status = if percent >= MEMORY_CRITICAL_PERCENT {
        HealthStatus::Critical
    } else if percent >= MEMORY_WARNING_PERCENT {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };
    (status, Some(percent))
}

/// Histogram buckets used by the key distribution check, in display order.
pub const TTL_BUCKETS: [&str; 6] = ["lt_1m", "1m_5m", "5m_15m", "15m_1h", "gt_1h", "no_expiry"];

/// Maps a key's remaining lifetime to its histogram bucket.
///
/// Keys that vanished between the scan and the TTL lookup have no bucket.
pub fn ttl_bucket(ttl: KeyTtl) -> Option<&'static str> {
    let seconds = match ttl {
        KeyTtl::Missing => return None,
        KeyTtl::NoExpiry => return Some("no_expiry"),
        KeyTtl::Seconds(seconds) => seconds,
    };

    Some(match seconds {
        0..60 => "lt_1m",
        60..300 => "1m_5m",
        300..900 => "5m_15m",
        900..3600 => "15m_1h",
        _ => "gt_1h",
    })
}
