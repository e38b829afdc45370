//! Counters, health classification, alert rules and the consolidated report.
//!
//! The thresholds live here so the rules can be tested without a store; the
//! shell's `HealthMonitor` only gathers measurements.

mod alerts;
mod health;
mod metrics;
mod report;

pub use alerts::{derive_alerts, Alert, AlertKind, Severity};
pub use health::{
    classify_latency, classify_memory, ttl_bucket, HealthCheckResult, HealthChecks, HealthStatus,
    TTL_BUCKETS,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use report::{recommendations, CacheReport, ReportSummary};

/// Round-trip latency above which connectivity is reported as a warning.
pub const LATENCY_WARNING_MS: u64 = 100;
/// Round-trip latency above which connectivity is reported as critical.
pub const LATENCY_CRITICAL_MS: u64 = 500;
/// Memory usage ratio (percent) above which memory is a warning.
pub const MEMORY_WARNING_PERCENT: f64 = 75.0;
/// Memory usage ratio (percent) above which memory is critical.
pub const MEMORY_CRITICAL_PERCENT: f64 = 90.0;
/// Hit rate (percent) below which an alert is raised.
pub const HIT_RATE_ALERT_PERCENT: f64 = 70.0;
/// Validation failures above which an alert is raised.
pub const VALIDATION_FAILURE_ALERT: u64 = 10;
/// Lock timeouts above which an alert is raised.
pub const LOCK_TIMEOUT_ALERT: u64 = 5;
