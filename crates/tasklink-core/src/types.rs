//! Shared domain types: object identities and change events.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object types in the source (CRM) system that can be linked to a tracker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceObjectType {
    /// A CRM task record.
    Task,
    /// A CRM support ticket record.
    Ticket,
}

impl SourceObjectType {
    /// Convert to the string stored in the registry.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceObjectType::Task => "task",
            SourceObjectType::Ticket => "ticket",
        }
    }
}

impl fmt::Display for SourceObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" => Ok(SourceObjectType::Task),
            "ticket" => Ok(SourceObjectType::Ticket),
            _ => Err(format!("Unknown source object type: {s}")),
        }
    }
}

/// Kind of change a webhook event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The object was just created in the source system.
    Creation,
    /// One property of an existing object changed.
    PropertyChange,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Creation => write!(f, "creation"),
            EventKind::PropertyChange => write!(f, "property_change"),
        }
    }
}

/// One field delta emitted by the source system.
///
/// Consumed by the reconciliation worker, never stored. The payload values are
/// advisory only: the update path re-reads property history instead of
/// trusting `after` (events can arrive out of order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub object_id: String,
    pub object_type: SourceObjectType,
    pub event_kind: EventKind,
    pub field: Option<String>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Snapshot of a source object as fetched from the CRM.
///
/// Properties are the CRM's string-valued property bag; `company_id` is the
/// first associated company, used for destination routing.
#[derive(Debug, Clone, Default)]
pub struct SourceObject {
    pub id: String,
    pub properties: HashMap<String, String>,
    pub company_id: Option<String>,
}

impl SourceObject {
    /// Look up a property, treating empty strings as absent.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
