//! Cache administration endpoints: counters, alerts, reports, key listing
//! and invalidation.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use cacheward_core::invalidation::BulkOperation;

use crate::{handlers::AppError, state::AppState};

/// GET /cache/stats - Counters, queue stats and store availability.
#[axum::debug_handler]
pub async fn stats(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "namespace": state.store.keys().namespace(),
        "available": state.store.is_available(),
        "metrics": state.store.metrics().snapshot(),
        "notifications": state.notifier.stats(),
    }))
    .into_response()
}

/// GET /cache/alerts - Alerts derived from current counters and health checks.
#[axum::debug_handler]
pub async fn alerts(State(state): State<AppState>) -> Response {
    Json(state.monitor.alerts().await).into_response()
}

/// GET /cache/report - Full health report.
#[axum::debug_handler]
pub async fn report(State(state): State<AppState>) -> Response {
    Json(state.monitor.report().await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct KeysQuery {
    /// Glob relative to the namespace (default: every key).
    #[serde(default)]
    pub pattern: Option<String>,
}

/// GET /cache/keys?pattern= - Lists keys matching a glob.
#[axum::debug_handler]
pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<KeysQuery>,
) -> Result<Response, AppError> {
    let pattern = query
        .pattern
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "*".to_string());
    let mut keys = state.store.try_scan(&pattern).await?;
    keys.sort_unstable();

    Ok(Json(serde_json::json!({
        "pattern": state.store.keys().confine(&pattern),
        "count": keys.len(),
        "keys": keys,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub operations: Vec<BulkOperation>,
}

/// POST /cache/invalidate - Applies a list of bulk invalidation operations.
#[axum::debug_handler]
pub async fn invalidate(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> Response {
    let report = state.invalidation.bulk(&request.operations).await;
    tracing::info!(
        operations = request.operations.len(),
        removed = report.total_removed,
        failures = report.failures(),
        "bulk invalidation"
    );
    Json(report).into_response()
}

/// DELETE /cache - Removes every key in the namespace.
#[axum::debug_handler]
pub async fn clear(State(state): State<AppState>) -> Response {
    let removed = state.invalidation.clear_all().await;
    Json(serde_json::json!({ "removed": removed })).into_response()
}
