//! Inbound webhook wire shapes.
//!
//! Both external systems push change notifications here. Payload parsing is
//! tolerant: an event that cannot be interpreted is logged and skipped, never
//! failing the batch it arrived in — the webhook has already been
//! acknowledged by the time events are examined.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use tasklink_core::types::{ChangeEvent, EventKind, SourceObjectType};
use tasklink_sync::{TargetChangeBatch, TargetFieldChange};

/// One change notification from the CRM, delivered in batches.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmEventPayload {
    pub object_id: serde_json::Value,
    pub object_type: String,
    pub event_kind: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub before: Option<serde_json::Value>,
    #[serde(default)]
    pub after: Option<serde_json::Value>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl CrmEventPayload {
    /// Interpret the wire shape as a domain event, or `None` if it cannot be.
    pub fn into_event(self) -> Option<ChangeEvent> {
        let object_id = match &self.object_id {
            // CRM object ids arrive as strings or bare numbers.
            serde_json::Value::String(s) if !s.is_empty() => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                warn!(object_id = %other, "event without a usable object id, skipping");
                return None;
            }
        };
        let Ok(object_type) = self.object_type.parse::<SourceObjectType>() else {
            warn!(
                object_type = %self.object_type,
                object_id = %object_id,
                "event for an unhandled object type, skipping"
            );
            return None;
        };
        let event_kind = match self.event_kind.as_str() {
            "creation" => EventKind::Creation,
            "property_change" | "propertyChange" => EventKind::PropertyChange,
            other => {
                warn!(event_kind = %other, object_id = %object_id, "unknown event kind, skipping");
                return None;
            }
        };
        Some(ChangeEvent {
            object_id,
            object_type,
            event_kind,
            field: self.field,
            before: self.before,
            after: self.after,
            occurred_at: self.occurred_at,
        })
    }
}

/// A change notification from the tracker: one task, a batch of field deltas.
#[derive(Debug, Deserialize)]
pub struct TrackerEventPayload {
    pub task_id: String,
    #[serde(default)]
    pub history_items: Vec<TrackerHistoryItem>,
}

/// One entry of the tracker's per-event history list.
#[derive(Debug, Deserialize)]
pub struct TrackerHistoryItem {
    pub field: String,
    #[serde(default)]
    pub after: serde_json::Value,
}

impl TrackerEventPayload {
    /// Interpret the wire shape as a target-side change batch.
    pub fn into_batch(self) -> TargetChangeBatch {
        TargetChangeBatch {
            task_id: self.task_id,
            changes: self
                .history_items
                .into_iter()
                .map(|item| TargetFieldChange {
                    field: item.field,
                    after: item.after,
                })
                .collect(),
        }
    }
}
