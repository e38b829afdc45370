use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Kinds of resources whose query results are cached.
///
/// The lowercase form is the key segment written after the namespace, so
/// renaming a variant invalidates every existing key of that kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Job,
    Task,
    Invoice,
    Attendance,
    Team,
    User,
    Customer,
    Dashboard,
    Other(String),
}

impl ResourceType {
    /// Every built-in kind, in key-segment order.
    pub const KNOWN: [ResourceType; 8] = [
        ResourceType::Job,
        ResourceType::Task,
        ResourceType::Invoice,
        ResourceType::Attendance,
        ResourceType::Team,
        ResourceType::User,
        ResourceType::Customer,
        ResourceType::Dashboard,
    ];

    /// Returns the key segment for this resource kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Job => "job",
            Self::Task => "task",
            Self::Invoice => "invoice",
            Self::Attendance => "attendance",
            Self::Team => "team",
            Self::User => "user",
            Self::Customer => "customer",
            Self::Dashboard => "dashboard",
            Self::Other(name) => name,
        }
    }
}

impl FromStr for ResourceType {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Ok(match normalized.as_str() {
            "job" | "jobs" => Self::Job,
            "task" | "tasks" => Self::Task,
            "invoice" | "invoices" => Self::Invoice,
            "attendance" => Self::Attendance,
            "team" | "teams" => Self::Team,
            "user" | "users" => Self::User,
            "customer" | "customers" => Self::Customer,
            "dashboard" => Self::Dashboard,
            _ => Self::Other(normalized),
        })
    }
}

impl From<&str> for ResourceType {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ResourceType::from(raw.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_kinds_round_trip_through_str() {
        for kind in ResourceType::KNOWN {
            assert_eq!(ResourceType::from(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_plural_and_case_aliases() {
        assert_eq!(ResourceType::from("Jobs"), ResourceType::Job);
        assert_eq!(ResourceType::from(" INVOICES "), ResourceType::Invoice);
    }

    #[test]
    fn test_unknown_kind_is_other() {
        let kind = ResourceType::from("Timesheet");
        assert_eq!(kind, ResourceType::Other("timesheet".to_string()));
        assert_eq!(kind.as_str(), "timesheet");
    }

    #[test]
    fn test_serde_uses_plain_string() {
        let json = serde_json::to_string(&ResourceType::Dashboard).unwrap();
        assert_eq!(json, "\"dashboard\"");

        let parsed: ResourceType = serde_json::from_str("\"team\"").unwrap();
        assert_eq!(parsed, ResourceType::Team);
    }
}
