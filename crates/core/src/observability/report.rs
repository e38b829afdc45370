use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{derive_alerts, Alert, AlertKind, HealthChecks, HealthStatus, MetricsSnapshot, Severity};

/// Everything an operator needs in one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReport {
    pub timestamp: DateTime<Utc>,
    pub overall_status: HealthStatus,
    pub stats: MetricsSnapshot,
    pub health: HealthChecks,
    pub alerts: Vec<Alert>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_requests: u64,
    pub hit_rate: f64,
    pub alert_count: usize,
    pub critical_alerts: usize,
    pub recommendations: Vec<String>,
}

impl CacheReport {
    pub fn build(stats: MetricsSnapshot, health: HealthChecks, timestamp: DateTime<Utc>) -> Self {
        let alerts = derive_alerts(&stats, &health);
        let critical_alerts = alerts
            .iter()
            .filter(|alert| alert.severity == Severity::Critical)
            .count();

        let alert_status = if critical_alerts > 0 {
            HealthStatus::Critical
        } else if alerts.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Warning
        };
        let overall_status = health.overall().max(alert_status);

        let summary = ReportSummary {
            total_requests: stats.total_requests,
            hit_rate: stats.hit_rate,
            alert_count: alerts.len(),
            critical_alerts,
            recommendations: recommendations(&alerts),
        };

        Self {
            timestamp,
            overall_status,
            stats,
            health,
            alerts,
            summary,
        }
    }
}

/// One recommendation per breached threshold, in alert order.
pub fn recommendations(alerts: &[Alert]) -> Vec<String> {
    let mut seen = Vec::new();
    let mut advice = Vec::new();

    for alert in alerts {
        if seen.contains(&alert.kind) {
            continue;
        }
        seen.push(alert.kind);
        advice.push(
            match alert.kind {
                AlertKind::LowHitRate => {
                    "Raise TTLs for frequently read resources or narrow pattern invalidations"
                }
                AlertKind::ValidationFailures => {
                    "Inspect the computations feeding rejected values; they are never cached"
                }
                AlertKind::LockTimeouts => {
                    "Recomputes are contending; raise the lock TTL or the recheck wait"
                }
                AlertKind::MemoryPressure => {
                    "Store memory is nearly exhausted; shorten TTLs or raise maxmemory"
                }
                AlertKind::ConnectionUnhealthy => {
                    "Check store connectivity; requests are falling back to direct computation"
                }
                AlertKind::KeyCount => {
                    "Key count is high; review per-filter keys and TTLs for listing routes"
                }
            }
            .to_string(),
        );
    }

    advice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::HealthCheckResult;

    fn checks(connectivity: HealthStatus) -> HealthChecks {
        HealthChecks {
            connectivity: HealthCheckResult::new(connectivity, "probe"),
            memory: HealthCheckResult::new(HealthStatus::Healthy, "ok"),
            key_distribution: HealthCheckResult::new(HealthStatus::Healthy, "ok"),
        }
    }

    #[test]
    fn test_healthy_report() {
        let report = CacheReport::build(
            MetricsSnapshot::default(),
            checks(HealthStatus::Healthy),
            Utc::now(),
        );
        assert_eq!(report.overall_status, HealthStatus::Healthy);
        assert!(report.alerts.is_empty());
        assert!(report.summary.recommendations.is_empty());
    }

    #[test]
    fn test_warning_alerts_raise_overall_status() {
        let stats = MetricsSnapshot {
            hits: 0,
            misses: 5,
            total_requests: 5,
            lock_timeouts: 9,
            ..Default::default()
        };
        let report = CacheReport::build(stats, checks(HealthStatus::Healthy), Utc::now());

        assert_eq!(report.overall_status, HealthStatus::Warning);
        assert_eq!(report.summary.alert_count, 2);
        assert_eq!(report.summary.critical_alerts, 0);
        assert_eq!(report.summary.recommendations.len(), 2);
    }

    #[test]
    fn test_unreachable_store_dominates() {
        let report = CacheReport::build(
            MetricsSnapshot::default(),
            checks(HealthStatus::Unhealthy),
            Utc::now(),
        );
        assert_eq!(report.overall_status, HealthStatus::Unhealthy);
        assert_eq!(report.summary.critical_alerts, 1);
    }

    #[test]
    fn test_report_shape() {
        let report = CacheReport::build(
            MetricsSnapshot::default(),
            checks(HealthStatus::Healthy),
            Utc::now(),
        );
        let json = serde_json::to_value(&report).unwrap();
        for field in ["timestamp", "overall_status", "stats", "health", "alerts", "summary"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(json["health"].get("key_distribution").is_some());
        assert_eq!(json["stats"]["hit_rate"], 0.0);
    }

    #[test]
    fn test_recommendations_are_deduplicated() {
        let alert = Alert {
            kind: AlertKind::KeyCount,
            severity: Severity::Warning,
            message: "many".into(),
        };
        assert_eq!(recommendations(&[alert.clone(), alert]).len(), 1);
    }
}
