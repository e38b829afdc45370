use std::borrow::Cow;
use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{CacheRequest, ResourceType};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "app:cache:";

/// Width, in hex characters, of the filter hash appended to keys.
pub const PARAM_HASH_WIDTH: usize = 16;

/// Suffix appended to a cache key to form its lock key.
pub const LOCK_SUFFIX: &str = ":lock";

/// Tags marking the optional segments, so no segment can pass for another.
const ID_TAG: &str = "id_";
const CALLER_TAG: &str = "user_";
const HASH_TAG: &str = "h_";

/// Segment written for a resource kind with an empty name.
const EMPTY_RESOURCE: &str = "%20";

const COOLDOWN_SEGMENT: &str = "_cooldown";
const HEALTH_SEGMENT: &str = "_health";
const EVENTS_SEGMENT: &str = "_events";

/// Builds namespaced cache keys and the glob patterns that match them.
///
/// Key layout: `namespace + resource[:id_<id>][:user_<caller>][:h_<param hash>]`.
///
/// Ids and custom resource names are percent-encoded, so neither can contain
/// a separator, a glob character or a leading `_` (reserved for bookkeeping keys).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    namespace: String,
}

impl KeyBuilder {
    /// Creates a builder for the given namespace. A trailing `:` is added if missing.
    pub fn new(namespace: impl Into<String>) -> Self {
        let mut namespace = namespace.into();
        if !namespace.ends_with(':') {
            namespace.push(':');
        }
        Self { namespace }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the cache key for a request.
    ///
    /// # Examples
    ///
    /// ```
    /// use cacheward_core::cache::{CacheRequest, KeyBuilder};
    ///
    /// let keys = KeyBuilder::default();
    /// let request = CacheRequest::new("job").with_id(7).with_caller(3);
    /// assert_eq!(keys.build(&request), "app:cache:job:id_7:user_3");
    /// ```
    pub fn build(&self, request: &CacheRequest) -> String {
        self.key_for(
            &request.resource,
            request.resource_id.as_deref(),
            request.caller_id,
            &request.params,
        )
    }

    /// Returns the key for explicit parts, without going through a `CacheRequest`.
    pub fn key_for(
        &self,
        resource: &ResourceType,
        resource_id: Option<&str>,
        caller_id: Option<i64>,
        params: &BTreeMap<String, Value>,
    ) -> String {
        let mut key = self.resource_base(resource);
        if let Some(id) = resource_id {
            key.push_str(&id_segment(id));
        }
        if let Some(caller) = caller_id {
            key.push_str(&format!(":{CALLER_TAG}{caller}"));
        }
        if let Some(hash) = params_hash(params) {
            key.push_str(&format!(":{HASH_TAG}{hash}"));
        }
        key
    }

    /// Prefixes a bare key with the namespace; keys already inside it are returned as-is.
    pub fn confine(&self, key: &str) -> String {
        if key.starts_with(&self.namespace) {
            key.to_string()
        } else {
            format!("{}{}", self.namespace, key)
        }
    }

    fn resource_base(&self, resource: &ResourceType) -> String {
        format!("{}{}", self.namespace, resource_segment(resource))
    }

    /// Returns true if the key or pattern lives inside this namespace.
    pub fn owns(&self, key: &str) -> bool {
        key.starts_with(&self.namespace)
    }

    /// Returns the cooldown marker key for a resource kind, optionally narrowed to one id.
    pub fn cooldown_key(&self, resource: &ResourceType, resource_id: Option<&str>) -> String {
        let base = format!(
            "{}{COOLDOWN_SEGMENT}:{}",
            self.namespace,
            resource_segment(resource)
        );
        match resource_id {
            Some(id) => format!("{base}{}", id_segment(id)),
            None => base,
        }
    }

    /// Returns a throwaway key for round-trip health probes.
    pub fn health_probe_key(&self, nonce: &str) -> String {
        format!("{}{HEALTH_SEGMENT}:{nonce}", self.namespace)
    }

    /// Returns the pub/sub channel that invalidation events are published on.
    pub fn events_channel(&self) -> String {
        format!("{}{EVENTS_SEGMENT}", self.namespace)
    }

    /// Returns the pattern matching every key in the namespace.
    pub fn namespace_pattern(&self) -> String {
        format!("{}*", self.namespace)
    }

    /// Returns the glob patterns matching cached entries of a resource kind.
    ///
    /// Narrowed by caller and/or by the hash of a filter set when given. Patterns
    /// match whole segments, so `user_5` never matches `user_55`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cacheward_core::cache::{KeyBuilder, ResourceType};
    ///
    /// let keys = KeyBuilder::default();
    /// let patterns = keys.resource_patterns(&ResourceType::Job, None, None);
    /// assert_eq!(patterns, vec!["app:cache:job", "app:cache:job:*"]);
    /// ```
    pub fn resource_patterns(
        &self,
        resource: &ResourceType,
        caller_id: Option<i64>,
        params: Option<&BTreeMap<String, Value>>,
    ) -> Vec<String> {
        let base = self.resource_base(resource);
        let hash = params.and_then(params_hash);

        match (caller_id, hash) {
            (None, None) => vec![base.clone(), format!("{base}:*")],
            (Some(caller), None) => vec![
                format!("{base}:{CALLER_TAG}{caller}"),
                format!("{base}:{CALLER_TAG}{caller}:*"),
                format!("{base}:*:{CALLER_TAG}{caller}"),
                format!("{base}:*:{CALLER_TAG}{caller}:*"),
            ],
            (None, Some(hash)) => vec![
                format!("{base}:{HASH_TAG}{hash}"),
                format!("{base}:*:{HASH_TAG}{hash}"),
            ],
            (Some(caller), Some(hash)) => vec![
                format!("{base}:{CALLER_TAG}{caller}:{HASH_TAG}{hash}"),
                format!("{base}:*:{CALLER_TAG}{caller}:{HASH_TAG}{hash}"),
            ],
        }
    }

    /// Returns patterns matching every per-caller key of a caller, across all resources.
    pub fn caller_patterns(&self, caller_id: i64) -> Vec<String> {
        vec![
            format!("{}*:{CALLER_TAG}{caller_id}", self.namespace),
            format!("{}*:{CALLER_TAG}{caller_id}:*", self.namespace),
        ]
    }

    /// Returns the patterns matching one resource's own entries (all callers and filters).
    pub fn resource_id_patterns(&self, resource: &ResourceType, resource_id: &str) -> Vec<String> {
        let base = format!("{}{}", self.resource_base(resource), id_segment(resource_id));
        vec![base.clone(), format!("{base}:*")]
    }

    /// Extracts the resource segment of a namespaced key.
    ///
    /// Returns `None` for keys outside the namespace.
    pub fn resource_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(&self.namespace)?;
        rest.split(':').next().filter(|segment| !segment.is_empty())
    }

    /// Returns true for cooldown markers written by [`KeyBuilder::cooldown_key`].
    pub fn is_cooldown_key(&self, key: &str) -> bool {
        self.resource_of(key) == Some(COOLDOWN_SEGMENT)
    }

    /// Parses the resource kind of a namespaced key, undoing the segment encoding.
    ///
    /// Returns `None` for keys outside the namespace and for bookkeeping keys.
    pub fn resource_type_of(&self, key: &str) -> Option<ResourceType> {
        let segment = self.resource_of(key)?;
        if is_internal_segment(segment) {
            return None;
        }
        let decoded = urlencoding::decode(segment).ok()?;
        Some(ResourceType::from(decoded.as_ref()))
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Returns the lock key guarding recomputation of a cache key.
pub fn lock_key(cache_key: &str) -> String {
    format!("{cache_key}{LOCK_SUFFIX}")
}

/// Returns true for lock keys.
pub fn is_lock_key(key: &str) -> bool {
    key.ends_with(LOCK_SUFFIX)
}

/// Returns true for bookkeeping keys (cooldown markers, health probes) rather than cached data.
pub fn is_internal_segment(resource_segment: &str) -> bool {
    resource_segment.starts_with('_')
}

/// Hashes a filter set into a fixed-width hex string.
///
/// Returns `None` for an empty set so unfiltered keys carry no hash segment.
/// Keys are sorted by the `BTreeMap`; nested objects are sorted by `serde_json`.
pub fn params_hash(params: &BTreeMap<String, Value>) -> Option<String> {
    if params.is_empty() {
        return None;
    }
    let canonical = serde_json::to_vec(params).ok()?;
    let digest = Sha256::digest(&canonical);
    let mut encoded = hex::encode(digest);
    encoded.truncate(PARAM_HASH_WIDTH);
    Some(encoded)
}

/// Percent-encodes a raw value so it can never introduce separators or glob characters.
fn encode_segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

fn id_segment(id: &str) -> String {
    format!(":{ID_TAG}{}", encode_segment(id))
}

/// Key segment of a resource kind. Custom names are encoded so they cannot
/// hold globs, pose as a bookkeeping key (`_...`) or a lock key (`lock`).
fn resource_segment(resource: &ResourceType) -> Cow<'_, str> {
    let ResourceType::Other(name) = resource else {
        return Cow::Borrowed(resource.as_str());
    };
    if name.is_empty() {
        return Cow::Borrowed(EMPTY_RESOURCE);
    }

    let encoded = encode_segment(name);
    if let Some(rest) = encoded.strip_prefix('_') {
        Cow::Owned(format!("%5F{rest}"))
    } else if encoded == "lock" {
        Cow::Borrowed("%6Cock")
    } else {
        Cow::Owned(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::pattern_matches;
    use serde_json::json;

    fn keys() -> KeyBuilder {
        KeyBuilder::default()
    }

    #[test]
    fn test_namespace_gets_trailing_colon() {
        assert_eq!(KeyBuilder::new("svc:cache").namespace(), "svc:cache:");
        assert_eq!(KeyBuilder::new("svc:cache:").namespace(), "svc:cache:");
    }

    #[test]
    fn test_bare_resource_key() {
        let key = keys().build(&CacheRequest::new("job"));
        assert_eq!(key, "app:cache:job");
    }

    #[test]
    fn test_full_key_layout() {
        let request = CacheRequest::new("job")
            .with_id(7)
            .with_caller(3)
            .with_param("status", "open");
        let key = keys().build(&request);

        let hash = params_hash(&request.params).unwrap();
        assert_eq!(key, format!("app:cache:job:id_7:user_3:h_{hash}"));
        assert_eq!(hash.len(), PARAM_HASH_WIDTH);
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let a = CacheRequest::new("task")
            .with_param("status", "open")
            .with_param("page", 1);
        let b = CacheRequest::new("task")
            .with_param("page", 1)
            .with_param("status", "open");
        assert_eq!(keys().build(&a), keys().build(&b));
    }

    #[test]
    fn test_nested_param_order_does_not_matter() {
        let a = CacheRequest::new("task").with_param("range", json!({"from": 1, "to": 9}));
        let b = CacheRequest::new("task").with_param("range", json!({"to": 9, "from": 1}));
        assert_eq!(keys().build(&a), keys().build(&b));
    }

    #[test]
    fn test_differing_inputs_differ() {
        let base = CacheRequest::new("job").with_id(7).with_caller(3);
        let variants = [
            base.clone().with_id(8),
            base.clone().with_caller(4),
            base.clone().with_param("status", "open"),
            base.clone().with_param("status", Value::Null),
            base.clone().with_param("status", "closed"),
            CacheRequest::new("job").with_id(7),
            CacheRequest::new("job").with_caller(3),
        ];

        let base_key = keys().build(&base);
        let mut seen = std::collections::HashSet::new();
        seen.insert(base_key);
        for variant in &variants {
            assert!(seen.insert(keys().build(variant)), "collision for {variant:?}");
        }
    }

    #[test]
    fn test_id_cannot_forge_caller_segment() {
        let forged = CacheRequest::new("job").with_id("7:user_3");
        let real = CacheRequest::new("job").with_id(7).with_caller(3);
        assert_ne!(keys().build(&forged), keys().build(&real));
        assert_eq!(keys().build(&forged), "app:cache:job:id_7%3Auser_3");
    }

    #[test]
    fn test_id_cannot_pose_as_caller() {
        let by_id = CacheRequest::new("job").with_id("user_5");
        let by_caller = CacheRequest::new("job").with_caller(5);
        assert_ne!(keys().build(&by_id), keys().build(&by_caller));
    }

    #[test]
    fn test_id_cannot_pose_as_params_hash() {
        let filtered = CacheRequest::new("job").with_param("status", "open");
        let hash = params_hash(&filtered.params).unwrap();
        let by_id = CacheRequest::new("job").with_id(hash);
        assert_ne!(keys().build(&by_id), keys().build(&filtered));
    }

    #[test]
    fn test_custom_resource_cannot_pose_as_id() {
        let custom = CacheRequest::new(ResourceType::Other("job:7".into()));
        let real = CacheRequest::new("job").with_id(7);
        assert_eq!(keys().build(&custom), "app:cache:job%3A7");
        assert_ne!(keys().build(&custom), keys().build(&real));
    }

    #[test]
    fn test_custom_resource_is_encoded() {
        let keys = keys();
        let segment =
            |name: &str| keys.build(&CacheRequest::new(ResourceType::Other(name.into())));

        assert_eq!(segment("*"), "app:cache:%2A");
        assert_eq!(segment("a?b"), "app:cache:a%3Fb");
        assert_eq!(segment("_cooldown"), "app:cache:%5Fcooldown");
        assert_eq!(segment("lock"), "app:cache:%6Cock");
        assert_eq!(segment(""), "app:cache:%20");
        assert_eq!(segment("timesheet"), "app:cache:timesheet");
    }

    #[test]
    fn test_wildcard_resource_patterns_stay_literal() {
        let keys = keys();
        let patterns = keys.resource_patterns(&ResourceType::Other("*".into()), None, None);
        let matches = |key: &str| patterns.iter().any(|p| pattern_matches(p, key));

        assert!(!matches("app:cache:job:id_7"));
        assert!(!matches("app:cache:team"));
        assert!(matches("app:cache:%2A"));
    }

    #[test]
    fn test_id_cannot_inject_glob() {
        let key = keys().build(&CacheRequest::new("job").with_id("*"));
        assert_eq!(key, "app:cache:job:id_%2A");
    }

    #[test]
    fn test_params_hash_empty_is_none() {
        assert_eq!(params_hash(&BTreeMap::new()), None);
    }

    #[test]
    fn test_confine() {
        let keys = keys();
        assert_eq!(keys.confine("job:7"), "app:cache:job:7");
        assert_eq!(keys.confine("app:cache:job:7"), "app:cache:job:7");
        assert!(keys.owns("app:cache:job"));
        assert!(!keys.owns("session:abc"));
    }

    #[test]
    fn test_lock_key() {
        assert_eq!(lock_key("app:cache:job:7"), "app:cache:job:7:lock");
        assert!(is_lock_key("app:cache:job:7:lock"));
        assert!(!is_lock_key("app:cache:job:7"));
    }

    #[test]
    fn test_cooldown_key() {
        let keys = keys();
        assert_eq!(
            keys.cooldown_key(&ResourceType::Job, None),
            "app:cache:_cooldown:job"
        );
        assert_eq!(
            keys.cooldown_key(&ResourceType::Job, Some("7")),
            "app:cache:_cooldown:job:id_7"
        );
        assert_eq!(
            keys.cooldown_key(&ResourceType::Other("*".into()), None),
            "app:cache:_cooldown:%2A"
        );
        assert!(keys.is_cooldown_key(&keys.cooldown_key(&ResourceType::Job, Some("7"))));
        assert!(!keys.is_cooldown_key("app:cache:job:id_7"));
    }

    #[test]
    fn test_resource_patterns_match_whole_resource() {
        let keys = keys();
        let patterns = keys.resource_patterns(&ResourceType::Job, None, None);
        let matches = |key: &str| patterns.iter().any(|p| pattern_matches(p, key));

        assert!(matches("app:cache:job"));
        assert!(matches("app:cache:job:id_7"));
        assert!(matches("app:cache:job:user_3:h_abcdef"));
        assert!(!matches("app:cache:jobs"));
        assert!(!matches("app:cache:team:1"));
        assert!(!matches("app:cache:_cooldown:job"));
    }

    #[test]
    fn test_resource_patterns_by_caller() {
        let keys = keys();
        let patterns = keys.resource_patterns(&ResourceType::Job, Some(5), None);
        let matches = |key: &str| patterns.iter().any(|p| pattern_matches(p, key));

        assert!(matches("app:cache:job:user_5"));
        assert!(matches("app:cache:job:user_5:h_abcdef"));
        assert!(matches("app:cache:job:id_7:user_5"));
        assert!(matches("app:cache:job:id_7:user_5:h_abcdef"));
        assert!(!matches("app:cache:job:user_55"));
        assert!(!matches("app:cache:job:id_7:user_55:h_abcdef"));
        assert!(!matches("app:cache:job:id_7"));
        assert!(!matches("app:cache:job:id_user_5"));
    }

    #[test]
    fn test_resource_patterns_by_filters() {
        let keys = keys();
        let request = CacheRequest::new("job").with_param("status", "open");
        let other = CacheRequest::new("job").with_param("status", "closed");
        let patterns = keys.resource_patterns(&ResourceType::Job, None, Some(&request.params));
        let matches = |key: &str| patterns.iter().any(|p| pattern_matches(p, key));

        assert!(matches(&keys.build(&request)));
        assert!(matches(&keys.build(&request.clone().with_caller(9))));
        assert!(!matches(&keys.build(&other)));
    }

    #[test]
    fn test_caller_patterns_span_resources() {
        let keys = keys();
        let patterns = keys.caller_patterns(5);
        let matches = |key: &str| patterns.iter().any(|p| pattern_matches(p, key));

        assert!(matches("app:cache:job:user_5"));
        assert!(matches("app:cache:invoice:id_3:user_5:h_abcdef"));
        assert!(!matches("app:cache:invoice:id_3:user_50"));
        assert!(!matches("app:cache:invoice:id_3"));
    }

    #[test]
    fn test_resource_id_patterns() {
        let keys = keys();
        let patterns = keys.resource_id_patterns(&ResourceType::Job, "7");
        let matches = |key: &str| patterns.iter().any(|p| pattern_matches(p, key));

        assert!(matches("app:cache:job:id_7"));
        assert!(matches("app:cache:job:id_7:user_1"));
        assert!(!matches("app:cache:job:id_70"));
        assert!(!matches("app:cache:job"));
    }

    #[test]
    fn test_resource_of() {
        let keys = keys();
        assert_eq!(keys.resource_of("app:cache:job:id_7"), Some("job"));
        assert_eq!(keys.resource_of("app:cache:dashboard"), Some("dashboard"));
        assert_eq!(keys.resource_of("other:job:7"), None);
        assert_eq!(keys.resource_of("app:cache:"), None);
    }

    #[test]
    fn test_resource_type_of_decodes_custom_names() {
        let keys = keys();
        let custom = ResourceType::Other("shift_log".into());
        let key = keys.build(&CacheRequest::new(custom.clone()).with_id(1));

        assert_eq!(keys.resource_type_of(&key), Some(custom));
        assert_eq!(keys.resource_type_of("app:cache:jobs:id_1"), Some(ResourceType::Job));
        assert_eq!(keys.resource_type_of("app:cache:_cooldown:job"), None);
        assert_eq!(keys.resource_type_of("other:job"), None);
    }
}
