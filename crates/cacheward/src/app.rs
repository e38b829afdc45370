use std::time::Duration;

use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    handlers::{
        admin::{alerts, clear, invalidate, list_keys, report, stats},
        health::{healthz, livez},
    },
    state::AppState,
};

/// Create the application router with all routes and middleware.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/healthz", get(healthz))
        .route("/cache", delete(clear))
        .route("/cache/stats", get(stats))
        .route("/cache/alerts", get(alerts))
        .route("/cache/report", get(report))
        .route("/cache/keys", get(list_keys))
        .route("/cache/invalidate", post(invalidate))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use cacheward_core::cache::CacheRequest;

    use crate::config::Config;
    use crate::store::{testing::failing_store, Store};

    fn test_state() -> AppState {
        AppState::with_store(Store::in_memory(1_000), Config::default())
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    /// Seeds job 7, job 8 and team 1 and returns their keys in that order.
    async fn seed(state: &AppState) -> Vec<String> {
        let ttl = Duration::from_secs(300);
        let requests = [
            CacheRequest::new("job").with_id(7),
            CacheRequest::new("job").with_id(8),
            CacheRequest::new("team").with_id(1),
        ];
        let mut keys = Vec::new();
        for request in &requests {
            let key = state.store.keys().build(request);
            assert!(state.store.set(&key, &json!({"id": 1}), ttl).await);
            keys.push(key);
        }
        keys
    }

    #[tokio::test]
    async fn test_livez() {
        let app = create_app(test_state());

        let response = app
            .oneshot(Request::builder().uri("/livez").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_healthz_reports_checks() {
        let app = create_app(test_state());

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["checks"]["connectivity"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_healthz_unavailable_store_is_503() {
        let app = create_app(AppState::with_store(failing_store(), Config::default()));

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_stats() {
        let state = test_state();
        state.store.metrics().record_hit();
        state.store.metrics().record_miss();
        let app = create_app(state);

        let response = app
            .oneshot(Request::builder().uri("/cache/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["namespace"], "app:cache:");
        assert_eq!(body["available"], true);
        assert_eq!(body["metrics"]["hits"], 1);
        assert_eq!(body["metrics"]["hit_rate"], 50.0);
        assert_eq!(body["notifications"]["dropped"], 0);
    }

    #[tokio::test]
    async fn test_list_keys() {
        let state = test_state();
        let seeded = seed(&state).await;
        let app = create_app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/cache/keys?pattern=job:*")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["pattern"], "app:cache:job:*");
        assert_eq!(body["count"], 2);
        assert_eq!(body["keys"], json!([seeded[0], seeded[1]]));
        assert_eq!(seeded[0], "app:cache:job:id_7");
    }

    #[tokio::test]
    async fn test_list_keys_rejects_character_classes() {
        let state = test_state();
        seed(&state).await;
        let app = create_app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/cache/keys?pattern=job:id_%5B78%5D")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_keys_unavailable_store_is_503() {
        let app = create_app(AppState::with_store(failing_store(), Config::default()));

        let response = app
            .oneshot(Request::builder().uri("/cache/keys").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("connection"));
    }

    #[tokio::test]
    async fn test_bulk_invalidate() {
        let state = test_state();
        let seeded = seed(&state).await;
        let app = create_app(state.clone());

        let payload = json!({
            "operations": [
                {"type": "resource", "resource": "job", "id": "7"},
                {"type": "pattern", "pattern": ""},
                {"type": "resource", "resource": "team"}
            ]
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cache/invalidate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total_removed"], 2);
        assert_eq!(body["operations"].as_array().unwrap().len(), 3);
        assert!(body["operations"][1]["error"].is_string());

        assert!(!state.store.contains(&seeded[0]).await);
        assert!(state.store.contains(&seeded[1]).await);
        assert!(!state.store.contains(&seeded[2]).await);
    }

    #[tokio::test]
    async fn test_bulk_invalidate_rejects_unknown_operation() {
        let app = create_app(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cache/invalidate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"operations":[{"type":"everything"}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_clear() {
        let state = test_state();
        seed(&state).await;
        let app = create_app(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/cache")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"removed": 3}));
        assert!(state.store.scan("*").await.is_empty());
    }

    #[tokio::test]
    async fn test_report() {
        let app = create_app(test_state());

        let response = app
            .oneshot(Request::builder().uri("/cache/report").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        for field in ["timestamp", "overall_status", "stats", "health", "alerts", "summary"] {
            assert!(body.get(field).is_some(), "missing {field}");
        }
        assert_eq!(body["alerts"], json!([]));
    }
}
