use serde::Serialize;

use super::{
    HealthChecks, HealthStatus, MetricsSnapshot, HIT_RATE_ALERT_PERCENT, LOCK_TIMEOUT_ALERT,
    VALIDATION_FAILURE_ALERT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowHitRate,
    ValidationFailures,
    LockTimeouts,
    MemoryPressure,
    ConnectionUnhealthy,
    KeyCount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
}

impl Alert {
    fn new(kind: AlertKind, severity: Severity, message: String) -> Self {
        Self {
            kind,
            severity,
            message,
        }
    }
}

/// Derives alerts from the counters and the latest health checks.
///
/// The hit rate is only judged once at least one lookup happened.
pub fn derive_alerts(stats: &MetricsSnapshot, health: &HealthChecks) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if stats.total_requests > 0 && stats.hit_rate < HIT_RATE_ALERT_PERCENT {
        alerts.push(Alert::new(
            AlertKind::LowHitRate,
            Severity::Warning,
            format!(
                "hit rate {:.2}% is below {HIT_RATE_ALERT_PERCENT}%",
                stats.hit_rate
            ),
        ));
    }

    if stats.validation_failures > VALIDATION_FAILURE_ALERT {
        alerts.push(Alert::new(
            AlertKind::ValidationFailures,
            Severity::Warning,
            format!(
                "{} validation failures (threshold {VALIDATION_FAILURE_ALERT})",
                stats.validation_failures
            ),
        ));
    }

    if stats.lock_timeouts > LOCK_TIMEOUT_ALERT {
        alerts.push(Alert::new(
            AlertKind::LockTimeouts,
            Severity::Warning,
            format!(
                "{} lock timeouts (threshold {LOCK_TIMEOUT_ALERT})",
                stats.lock_timeouts
            ),
        ));
    }

    if health.memory.status == HealthStatus::Critical {
        alerts.push(Alert::new(
            AlertKind::MemoryPressure,
            Severity::Critical,
            format!("memory {}: {}", health.memory.status, health.memory.message),
        ));
    }

    match health.connectivity.status {
        HealthStatus::Unhealthy => alerts.push(Alert::new(
            AlertKind::ConnectionUnhealthy,
            Severity::Critical,
            format!("store unreachable: {}", health.connectivity.message),
        )),
        HealthStatus::Critical => alerts.push(Alert::new(
            AlertKind::ConnectionUnhealthy,
            Severity::Warning,
            format!("store is slow: {}", health.connectivity.message),
        )),
        _ => {}
    }

    if health.key_distribution.status == HealthStatus::Warning {
        alerts.push(Alert::new(
            AlertKind::KeyCount,
            Severity::Warning,
            health.key_distribution.message.clone(),
        ));
    }

    alerts
}
