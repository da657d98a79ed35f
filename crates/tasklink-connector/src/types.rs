//! Wire-neutral types exchanged between the worker and the adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tasklink_core::richtext::Delta;

/// Task description content, in whichever representation the caller holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskContent {
    Delta(Delta),
    Text(String),
}

impl TaskContent {
    /// Plain-text view, used for logging and fallbacks.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            TaskContent::Delta(delta) => delta.plain_text(),
            TaskContent::Text(text) => text.clone(),
        }
    }
}

/// Specification of a task to create in the tracker.
#[derive(Debug, Clone, Serialize)]
pub struct TargetTaskSpec {
    pub name: String,
    pub description: TaskContent,
    /// Due date in epoch milliseconds, tracker convention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<i64>,
    pub assignees: Vec<String>,
    /// 4-level ordinal, 1 = urgent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub tags: Vec<String>,
}

/// One historical value of a CRM property.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyVersion {
    pub timestamp: DateTime<Utc>,
    pub value: serde_json::Value,
}

/// A user in either system's directory.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A tracker list that can receive created tasks.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationList {
    pub id: String,
    pub name: String,
}
