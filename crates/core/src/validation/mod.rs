//! Structural checks run on values before they are written to the cache and
//! after they are read back.
//!
//! Validation never panics and never errors: a malformed value simply yields
//! an invalid outcome and the caller skips caching it.

mod rules;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::cache::ResourceType;

pub use rules::{GenericValidator, RecordValidator};

/// Result of validating one candidate value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub reason: String,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: "ok".to_string(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// A structural check for one kind of cached value.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> ValidationOutcome;
}

/// Maps resource kinds to their validators, with a generic fallback.
#[derive(Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<ResourceType, Arc<dyn Validator>>,
    fallback: Arc<dyn Validator>,
}

impl ValidatorRegistry {
    /// Creates a registry where every kind uses the generic check.
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
            fallback: Arc::new(GenericValidator),
        }
    }

    /// Creates a registry with record validators for the built-in record kinds.
    ///
    /// `Dashboard` holds aggregates without ids, so it keeps the generic check.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register(ResourceType::Job, RecordValidator::new(&["id"], &["jobs"]))
            .register(ResourceType::Task, RecordValidator::new(&["id"], &["tasks"]))
            .register(
                ResourceType::Invoice,
                RecordValidator::new(&["id"], &["invoices"]),
            )
            .register(
                ResourceType::Attendance,
                RecordValidator::new(&["id"], &["attendance", "records"]),
            )
            .register(
                ResourceType::Team,
                RecordValidator::new(&["id"], &["teams", "members"]),
            )
            .register(ResourceType::User, RecordValidator::new(&["id"], &["users"]))
            .register(
                ResourceType::Customer,
                RecordValidator::new(&["id"], &["customers"]),
            );
        registry
    }

    /// Registers (or replaces) the validator for a resource kind.
    pub fn register(
        &mut self,
        resource: ResourceType,
        validator: impl Validator + 'static,
    ) -> &mut Self {
        self.validators.insert(resource, Arc::new(validator));
        self
    }

    /// Returns true if the kind has a dedicated validator.
    pub fn is_registered(&self, resource: &ResourceType) -> bool {
        self.validators.contains_key(resource)
    }

    /// Validates a value for a resource kind.
    pub fn validate(&self, resource: &ResourceType, value: &Value) -> ValidationOutcome {
        self.validators
            .get(resource)
            .unwrap_or(&self.fallback)
            .validate(value)
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.validators.keys().map(|k| k.as_str()).collect();
        registered.sort_unstable();
        f.debug_struct("ValidatorRegistry")
            .field("registered", &registered)
            .finish()
    }
}
