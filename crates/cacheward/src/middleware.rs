//! Axum glue for serving routes through the cache.
//!
//! Handlers take [`ForceRefresh`], [`CallerId`] and [`QueryFilters`] as
//! extractors and pass them to [`cached_json`] together with the route's
//! [`RouteCache`] settings.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Query},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use cacheward_core::cache::{CacheRequest, ResourceType};

use crate::aside::CacheAside;

/// Query parameter that forces a refresh.
pub const REFRESH_PARAM: &str = "refresh";

/// Header that forces a refresh.
pub const REFRESH_HEADER: &str = "x-cache-refresh";

/// Response header reporting `HIT`, `MISS` or `BYPASS`.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn query_pairs(uri: &Uri) -> Vec<(String, String)> {
    Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default()
}

fn no_cache_requested(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-cache"))
}

/// Whether the client asked to bypass the cached copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceRefresh(pub bool);

impl<S> FromRequestParts<S> for ForceRefresh
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let by_query = query_pairs(&parts.uri)
            .iter()
            .any(|(name, value)| name == REFRESH_PARAM && is_truthy(value));
        let by_header = parts
            .headers
            .get(REFRESH_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_truthy);

        Ok(Self(
            by_query || by_header || no_cache_requested(&parts.headers),
        ))
    }
}

/// Identity of the caller, inserted into request extensions by the auth layer.
///
/// Missing extensions yield `CallerId(None)`, which caches the route as shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerId(pub Option<i64>);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CallerId>()
            .copied()
            .unwrap_or_default())
    }
}

/// Query parameters folded into the cache key, sorted by name.
///
/// The refresh parameter is left out. Repeated names collect into an array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilters(pub BTreeMap<String, Value>);

impl QueryFilters {
    fn from_uri(uri: &Uri) -> Self {
        let mut filters: BTreeMap<String, Value> = BTreeMap::new();
        for (name, value) in query_pairs(uri) {
            if name == REFRESH_PARAM {
                continue;
            }
            let value = Value::String(value);
            match filters.remove(&name) {
                None => {
                    filters.insert(name, value);
                }
                Some(Value::Array(mut values)) => {
                    values.push(value);
                    filters.insert(name, Value::Array(values));
                }
                Some(previous) => {
                    filters.insert(name, Value::Array(vec![previous, value]));
                }
            }
        }
        Self(filters)
    }
}

impl<S> FromRequestParts<S> for QueryFilters
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_uri(&parts.uri))
    }
}

/// Per-route cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCache {
    pub resource: ResourceType,
    pub ttl: Duration,
}

impl RouteCache {
    pub fn new(resource: impl Into<ResourceType>, ttl: Duration) -> Self {
        Self {
            resource: resource.into(),
            ttl,
        }
    }
}

/// Serves `compute` through the cache and renders the value as JSON with an
/// `X-Cache` header. Errors from `compute` are rendered as-is and never cached.
pub async fn cached_json<T, E, F, Fut>(
    aside: &CacheAside,
    route: &RouteCache,
    resource_id: Option<&str>,
    caller: CallerId,
    filters: QueryFilters,
    refresh: ForceRefresh,
    compute: F,
) -> Response
where
    T: Serialize + DeserializeOwned,
    E: IntoResponse,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut request = CacheRequest::new(route.resource.clone())
        .with_caller_opt(caller.0)
        .with_params(filters.0)
        .with_ttl(route.ttl)
        .with_force_refresh(refresh.0);
    if let Some(id) = resource_id {
        request = request.with_id(id);
    }

    match aside.get_or_compute(&request, compute).await {
        Ok(cached) => {
            let outcome = cached.outcome;
            let mut response = Json(cached.value).into_response();
            response
                .headers_mut()
                .insert(X_CACHE, HeaderValue::from_static(outcome.header_value()));
            response
        }
        Err(err) => err.into_response(),
    }
}
