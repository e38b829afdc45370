//! Health check endpoints.
//!
//! - `/livez` - Liveness probe (immediate 200, no checks)
//! - `/healthz` - Store connectivity, memory and key distribution checks

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use cacheward_core::observability::HealthStatus;

use crate::state::AppState;

/// GET /livez - Basic liveness probe.
#[axum::debug_handler]
pub async fn livez() -> StatusCode {
    StatusCode::OK
}

/// GET /healthz - Runs the cache health checks.
///
/// Returns 503 when the store is unreachable. Warning and critical results
/// still answer 200; the body carries the detail.
#[axum::debug_handler]
pub async fn healthz(State(state): State<AppState>) -> Response {
    let checks = state.monitor.run_checks().await;
    let status = checks.overall();
    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "checks": checks,
        })),
    )
        .into_response()
}
