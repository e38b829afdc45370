//! Removing cached entries after mutations.
//!
//! Every operation deletes by key or by pattern, starts a cooldown for the
//! touched resource kinds and publishes an `InvalidationEvent`. Failures are
//! logged and reported as zero removed; one failing pattern never stops the
//! others.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use cacheward_core::cache::{has_wildcards, CacheError, ResourceType};
use cacheward_core::invalidation::{plan_for, BulkOperation, BulkReport};

use crate::aside::Cooldowns;
use crate::notify::{InvalidationEvent, NotificationQueue};
use crate::store::Store;

/// Keys removed by one operation, and the first error hit along the way.
#[derive(Debug, Default)]
struct Removal {
    removed: u64,
    error: Option<CacheError>,
}

impl Removal {
    fn absorb(&mut self, result: Result<u64, CacheError>) {
        match result {
            Ok(removed) => self.removed += removed,
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvalidationService {
    store: Store,
    cooldowns: Cooldowns,
    notifier: Option<Arc<NotificationQueue>>,
}

impl InvalidationService {
    pub fn new(store: Store, cooldowns: Cooldowns) -> Self {
        Self {
            store,
            cooldowns,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<NotificationQueue>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Deletes the single key for a resource (and caller). Returns true if it existed.
    pub async fn invalidate_key(
        &self,
        resource: &ResourceType,
        resource_id: Option<&str>,
        caller_id: Option<i64>,
    ) -> bool {
        let removal = self.key_removal(resource, resource_id, caller_id, &BTreeMap::new()).await;
        let operation = label("key", resource, resource_id, caller_id);
        self.finish(operation, vec![resource.clone()], removal).removed > 0
    }

    /// Deletes every entry of a resource kind, optionally narrowed to one caller
    /// and/or one filter set.
    pub async fn invalidate_pattern(
        &self,
        resource: &ResourceType,
        caller_id: Option<i64>,
        filters: &BTreeMap<String, Value>,
    ) -> u64 {
        let removal = self.pattern_removal(resource, caller_id, filters).await;
        self.finish(format!("pattern:{resource}"), vec![resource.clone()], removal)
            .removed
    }

    /// Deletes keys matching a raw glob, confined to the namespace.
    ///
    /// # Errors
    ///
    /// Rejects an empty pattern or one with a `[...]` class; store failures are
    /// returned after being logged.
    pub async fn invalidate_glob(&self, pattern: &str) -> Result<u64, CacheError> {
        let removal = self.glob_removal(pattern).await;
        let removal = self.finish(format!("glob:{pattern}"), Vec::new(), removal);
        match removal.error {
            Some(err) => Err(err),
            None => Ok(removal.removed),
        }
    }

    /// Applies the composite plan for a mutated entity: its own kind plus every
    /// dependent kind, each wiped by pattern.
    pub async fn invalidate_entity(&self, resource: &ResourceType, resource_id: Option<&str>) -> u64 {
        let (resources, removal) = self.entity_removal(resource, resource_id).await;
        self.finish(label("entity", resource, resource_id, None), resources, removal)
            .removed
    }

    /// Deletes every per-caller entry of a caller, plus the caller's own user record.
    pub async fn invalidate_caller(&self, caller_id: i64) -> u64 {
        let (resources, removal) = self.caller_removal(caller_id).await;
        self.finish(format!("caller:{caller_id}"), resources, removal)
            .removed
    }

    /// Deletes everything in the namespace except live locks and running cooldowns.
    pub async fn clear_all(&self) -> u64 {
        let keys = self.store.keys();
        let pattern = keys.namespace_pattern();
        let mut removal = Removal::default();
        removal.absorb(
            self.store
                .try_delete_pattern_except(&pattern, |key| keys.is_cooldown_key(key))
                .await,
        );
        tracing::warn!(namespace = %self.store.keys().namespace(), removed = removal.removed, "cache cleared");
        self.finish("clear_all".to_string(), Vec::new(), removal)
            .removed
    }

    /// Applies each operation in order. A failed operation is reported and
    /// counted as zero; the rest still run.
    pub async fn bulk(&self, operations: &[BulkOperation]) -> BulkReport {
        let mut report = BulkReport::default();

        for operation in operations {
            let (resources, removal) = self.operation_removal(operation).await;
            let removal = self.finish(operation.to_string(), resources, removal);
            match removal.error {
                Some(err) => report.record_failure(operation, err),
                None => report.record(operation, removal.removed),
            }
        }

        tracing::info!(
            operations = operations.len(),
            total_removed = report.total_removed,
            failures = report.failures(),
            "bulk invalidation finished"
        );
        report
    }

    async fn operation_removal(&self, operation: &BulkOperation) -> (Vec<ResourceType>, Removal) {
        match operation {
            BulkOperation::Resource {
                resource,
                id: Some(id),
                caller_id,
                filters,
            } => (
                vec![resource.clone()],
                self.key_removal(resource, Some(id), *caller_id, filters).await,
            ),
            BulkOperation::Resource {
                resource,
                id: None,
                caller_id,
                filters,
            } => (
                vec![resource.clone()],
                self.pattern_removal(resource, *caller_id, filters).await,
            ),
            BulkOperation::Pattern { pattern } => (Vec::new(), self.glob_removal(pattern).await),
            BulkOperation::User { user_id } => self.caller_removal(*user_id).await,
            BulkOperation::Team { team_id } => {
                self.entity_removal(&ResourceType::Team, team_id.as_deref()).await
            }
            BulkOperation::Job { job_id } => {
                self.entity_removal(&ResourceType::Job, job_id.as_deref()).await
            }
            BulkOperation::Invoice { invoice_id } => {
                self.entity_removal(&ResourceType::Invoice, invoice_id.as_deref())
                    .await
            }
            BulkOperation::Dashboard => self.entity_removal(&ResourceType::Dashboard, None).await,
        }
    }

    async fn key_removal(
        &self,
        resource: &ResourceType,
        resource_id: Option<&str>,
        caller_id: Option<i64>,
        filters: &BTreeMap<String, Value>,
    ) -> Removal {
        let key = self
            .store
            .keys()
            .key_for(resource, resource_id, caller_id, filters);
        let mut removal = Removal::default();
        removal.absorb(self.store.try_delete(&key).await);
        self.cooldowns.start(resource, resource_id).await;
        removal
    }

    async fn pattern_removal(
        &self,
        resource: &ResourceType,
        caller_id: Option<i64>,
        filters: &BTreeMap<String, Value>,
    ) -> Removal {
        let filters = (!filters.is_empty()).then_some(filters);
        let patterns = self
            .store
            .keys()
            .resource_patterns(resource, caller_id, filters);
        let removal = self.remove_patterns(&patterns).await;
        self.cooldowns.start(resource, None).await;
        removal
    }

    async fn glob_removal(&self, pattern: &str) -> Removal {
        if pattern.trim().is_empty() {
            return Removal {
                removed: 0,
                error: Some(CacheError::InvalidPattern("empty pattern".to_string())),
            };
        }
        if !has_wildcards(pattern) {
            tracing::debug!(pattern = %pattern, "glob without wildcards matches one key");
        }
        self.remove_patterns(&[pattern.to_string()]).await
    }

    async fn entity_removal(
        &self,
        resource: &ResourceType,
        resource_id: Option<&str>,
    ) -> (Vec<ResourceType>, Removal) {
        let plan = plan_for(resource);
        let mut removal = Removal::default();

        for kind in &plan {
            let patterns = self.store.keys().resource_patterns(kind, None, None);
            let step = self.remove_patterns(&patterns).await;
            removal.removed += step.removed;
            if let Some(err) = step.error {
                removal.error.get_or_insert(err);
            }
            self.cooldowns.start(kind, None).await;
        }

        tracing::debug!(
            resource = %resource,
            id = ?resource_id,
            plan = ?plan,
            removed = removal.removed,
            "entity invalidated"
        );
        (plan, removal)
    }

    /// Removes a caller's entries, then cools down the caller's user record
    /// and every kind that held a per-caller entry.
    async fn caller_removal(&self, caller_id: i64) -> (Vec<ResourceType>, Removal) {
        let keys = self.store.keys();
        let caller_patterns = keys.caller_patterns(caller_id);
        let mut removal = Removal::default();

        let mut kinds = BTreeSet::new();
        for pattern in &caller_patterns {
            match self.store.try_scan(pattern).await {
                Ok(found) => kinds.extend(found.iter().filter_map(|key| keys.resource_type_of(key))),
                Err(err) => {
                    removal.error.get_or_insert(err);
                }
            }
        }

        let user_id = caller_id.to_string();
        let mut patterns = caller_patterns;
        patterns.extend(keys.resource_id_patterns(&ResourceType::User, &user_id));
        let step = self.remove_patterns(&patterns).await;
        removal.removed += step.removed;
        if let Some(err) = step.error {
            removal.error.get_or_insert(err);
        }

        self.cooldowns.start(&ResourceType::User, Some(&user_id)).await;
        for kind in &kinds {
            self.cooldowns.start(kind, None).await;
        }

        kinds.insert(ResourceType::User);
        (kinds.into_iter().collect(), removal)
    }

    async fn remove_patterns(&self, patterns: &[String]) -> Removal {
        let mut removal = Removal::default();
        for pattern in patterns {
            removal.absorb(self.store.try_delete_pattern(pattern).await);
        }
        removal
    }

    /// Records metrics and publishes the event for a finished operation.
    fn finish(&self, operation: String, resources: Vec<ResourceType>, removal: Removal) -> Removal {
        self.store.metrics().record_invalidations(removal.removed);

        if let Some(err) = &removal.error {
            tracing::warn!(operation = %operation, removed = removal.removed, error = %err, "invalidation incomplete");
            return removal;
        }
        tracing::debug!(operation = %operation, removed = removal.removed, "invalidated");

        if let Some(notifier) = &self.notifier {
            let event = InvalidationEvent::new(operation, resources, removal.removed);
            if let Err(err) = notifier.enqueue(event) {
                tracing::debug!(error = %err, "invalidation event not queued");
            }
        }
        removal
    }
}

fn label(
    kind: &str,
    resource: &ResourceType,
    resource_id: Option<&str>,
    caller_id: Option<i64>,
) -> String {
    let mut label = format!("{kind}:{resource}");
    if let Some(id) = resource_id {
        label.push(':');
        label.push_str(id);
    }
    if let Some(caller) = caller_id {
        label.push_str(&format!(":user_{caller}"));
    }
    label
}
