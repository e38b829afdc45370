use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use super::ResourceType;

/// Default time-to-live for cached query results.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Everything needed to derive a cache key and decide how to cache one call.
///
/// Built by the route layer from the inbound request: which resource is being
/// read, on whose behalf, with which filters, and whether the caller asked for
/// a forced refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRequest {
    pub resource: ResourceType,
    pub resource_id: Option<String>,
    pub caller_id: Option<i64>,
    /// Query filters folded into the key. A `BTreeMap` keeps them sorted.
    pub params: BTreeMap<String, Value>,
    pub ttl: Duration,
    pub force_refresh: bool,
}

impl CacheRequest {
    /// Creates a request for a resource listing with the default TTL.
    pub fn new(resource: impl Into<ResourceType>) -> Self {
        Self {
            resource: resource.into(),
            resource_id: None,
            caller_id: None,
            params: BTreeMap::new(),
            ttl: DEFAULT_TTL,
            force_refresh: false,
        }
    }

    pub fn with_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_caller(mut self, caller_id: i64) -> Self {
        self.caller_id = Some(caller_id);
        self
    }

    pub fn with_caller_opt(mut self, caller_id: Option<i64>) -> Self {
        self.caller_id = caller_id;
        self
    }

    /// Adds one filter parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds a batch of filter parameters, in any order.
    pub fn with_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }
}
