//! Which cached resources a mutation touches, and the typed bulk operations
//! accepted by the invalidation endpoint.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::ResourceType;

/// Returns every resource kind whose cached entries must be dropped when an
/// entity of `resource` is created, updated or deleted.
///
/// The mutated kind always comes first. Listings embed a filter hash the
/// mutation handler cannot know, so each kind is wiped wholesale by pattern.
pub fn plan_for(resource: &ResourceType) -> Vec<ResourceType> {
    use ResourceType::*;

    let related: &[ResourceType] = match resource {
        Job => &[Dashboard, Team],
        Task => &[Job, Dashboard],
        Invoice => &[Job, Dashboard],
        Attendance => &[Team, Dashboard],
        Team => &[User, Dashboard],
        User => &[Team],
        Customer => &[Job, Invoice],
        Dashboard | Other(_) => &[],
    };

    std::iter::once(resource.clone())
        .chain(related.iter().cloned())
        .collect()
}

/// One step of a bulk invalidation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BulkOperation {
    /// One key when `id` is given, otherwise every key of the resource
    /// (optionally narrowed by caller and filters).
    Resource {
        resource: ResourceType,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        caller_id: Option<i64>,
        #[serde(default)]
        filters: BTreeMap<String, Value>,
    },
    /// A raw glob, confined to the namespace.
    Pattern { pattern: String },
    /// Every per-caller entry of a user plus the user resource itself.
    User { user_id: i64 },
    Team {
        #[serde(default)]
        team_id: Option<String>,
    },
    Job {
        #[serde(default)]
        job_id: Option<String>,
    },
    Invoice {
        #[serde(default)]
        invoice_id: Option<String>,
    },
    Dashboard,
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource {
                resource, id: None, ..
            } => write!(f, "resource:{resource}"),
            Self::Resource {
                resource,
                id: Some(id),
                ..
            } => write!(f, "resource:{resource}:{id}"),
            Self::Pattern { pattern } => write!(f, "pattern:{pattern}"),
            Self::User { user_id } => write!(f, "user:{user_id}"),
            Self::Team { team_id } => write_entity(f, "team", team_id.as_deref()),
            Self::Job { job_id } => write_entity(f, "job", job_id.as_deref()),
            Self::Invoice { invoice_id } => write_entity(f, "invoice", invoice_id.as_deref()),
            Self::Dashboard => f.write_str("dashboard"),
        }
    }
}

fn write_entity(f: &mut fmt::Formatter<'_>, kind: &str, id: Option<&str>) -> fmt::Result {
    match id {
        Some(id) => write!(f, "{kind}:{id}"),
        None => f.write_str(kind),
    }
}

/// Outcome of a single bulk step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub operation: String,
    pub removed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole bulk request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub total_removed: u64,
    pub operations: Vec<OperationReport>,
}

impl BulkReport {
    pub fn record(&mut self, operation: &BulkOperation, removed: u64) {
        self.total_removed += removed;
        self.operations.push(OperationReport {
            operation: operation.to_string(),
            removed,
            error: None,
        });
    }

    /// Records a failed step; it counts as zero removed.
    pub fn record_failure(&mut self, operation: &BulkOperation, error: impl fmt::Display) {
        self.operations.push(OperationReport {
            operation: operation.to_string(),
            removed: 0,
            error: Some(error.to_string()),
        });
    }

    pub fn failures(&self) -> usize {
        self.operations.iter().filter(|op| op.error.is_some()).count()
    }
}
