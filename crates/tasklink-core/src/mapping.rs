//! Field translation tables between the CRM and the tracker.
//!
//! All tables are keyed by [`SourceObjectType`] and matched exhaustively, so a
//! new object type cannot silently miss a mapping. Transforms never fail:
//! unrecognized input maps to [`MappedValue::Skip`] and the field is left
//! untouched on the other side.

use serde_json::Value;

use crate::types::SourceObjectType;

/// Outcome of a single field transform.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedValue {
    /// Write this value to the external system.
    Set(Value),
    /// Invalid or unmapped input; skip the field, keep processing the rest.
    Skip,
}

impl MappedValue {
    /// Unwrap into the value to write, if any.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            MappedValue::Set(value) => Some(value),
            MappedValue::Skip => None,
        }
    }
}

/// CRM property that stores the object's title.
#[must_use]
pub fn subject_property(object_type: SourceObjectType) -> &'static str {
    match object_type {
        SourceObjectType::Task => "task_subject",
        SourceObjectType::Ticket => "subject",
    }
}

/// CRM property that stores the rich-text body.
#[must_use]
pub fn content_property(object_type: SourceObjectType) -> &'static str {
    match object_type {
        SourceObjectType::Task => "task_body",
        SourceObjectType::Ticket => "content",
    }
}

/// CRM property that stores the owning user id.
#[must_use]
pub fn owner_property(object_type: SourceObjectType) -> &'static str {
    match object_type {
        SourceObjectType::Task | SourceObjectType::Ticket => "owner_id",
    }
}

/// CRM property that drives the tracker due date.
#[must_use]
pub fn due_property(object_type: SourceObjectType) -> &'static str {
    match object_type {
        SourceObjectType::Task => "due_at",
        SourceObjectType::Ticket => "closed_date",
    }
}

/// CRM property that stores the priority level.
#[must_use]
pub fn priority_property(object_type: SourceObjectType) -> &'static str {
    match object_type {
        SourceObjectType::Task => "task_priority",
        SourceObjectType::Ticket => "priority",
    }
}

/// CRM property that stores the status (tasks) or pipeline stage (tickets).
#[must_use]
pub fn status_property(object_type: SourceObjectType) -> &'static str {
    match object_type {
        SourceObjectType::Task => "task_status",
        SourceObjectType::Ticket => "pipeline_stage",
    }
}

/// The CRM properties whose history is re-read on an update pass.
#[must_use]
pub fn tracked_crm_properties(object_type: SourceObjectType) -> &'static [&'static str] {
    match object_type {
        SourceObjectType::Task => &[
            "task_subject",
            "task_body",
            "due_at",
            "owner_id",
            "task_priority",
            "task_status",
        ],
        SourceObjectType::Ticket => &[
            "subject",
            "content",
            "closed_date",
            "owner_id",
            "priority",
            "pipeline_stage",
        ],
    }
}

/// Tracker task field written for a changed CRM property.
#[must_use]
pub fn tracker_field_for_crm_property(
    object_type: SourceObjectType,
    property: &str,
) -> Option<&'static str> {
    match object_type {
        SourceObjectType::Task => match property {
            "task_subject" => Some("name"),
            "task_body" => Some("description"),
            "due_at" => Some("due_date"),
            "owner_id" => Some("assignees"),
            "task_priority" => Some("priority"),
            "task_status" => Some("status"),
            _ => None,
        },
        SourceObjectType::Ticket => match property {
            "subject" => Some("name"),
            "content" => Some("description"),
            "closed_date" => Some("due_date"),
            "owner_id" => Some("assignees"),
            "priority" => Some("priority"),
            "pipeline_stage" => Some("status"),
            _ => None,
        },
    }
}

/// CRM property written for a changed tracker field.
///
/// Ticket bodies are deliberately unmapped: tracker descriptions never
/// overwrite ticket content.
#[must_use]
pub fn crm_property_for_tracker_field(
    object_type: SourceObjectType,
    field: &str,
) -> Option<&'static str> {
    match object_type {
        SourceObjectType::Task => match field {
            "name" => Some("task_subject"),
            "content" => Some("task_body"),
            "due_date" => Some("due_at"),
            "assignees" => Some("owner_id"),
            "priority" => Some("task_priority"),
            "status" => Some("task_status"),
            _ => None,
        },
        SourceObjectType::Ticket => match field {
            "name" => Some("subject"),
            "due_date" => Some("closed_date"),
            "assignees" => Some("owner_id"),
            "priority" => Some("priority"),
            "status" => Some("pipeline_stage"),
            _ => None,
        },
    }
}

/// Translate a tracker status into the CRM vocabulary.
///
/// Anything that is not the tracker's closed state maps back to the CRM's
/// not-started equivalent.
#[must_use]
pub fn crm_status_for_tracker_status(object_type: SourceObjectType, status: &str) -> &'static str {
    let closed = status.eq_ignore_ascii_case("complete");
    match object_type {
        SourceObjectType::Task => {
            if closed {
                "COMPLETED"
            } else {
                "NOT_STARTED"
            }
        }
        // Pipeline stages: "4" is closed, "1" is new.
        SourceObjectType::Ticket => {
            if closed {
                "4"
            } else {
                "1"
            }
        }
    }
}

/// Translate a tracker priority name into the CRM vocabulary.
///
/// Task priorities top out at `HIGH`; tickets keep the full range.
#[must_use]
pub fn crm_priority_for_tracker_priority(
    object_type: SourceObjectType,
    priority: &str,
) -> Option<&'static str> {
    match object_type {
        SourceObjectType::Task => match priority.to_lowercase().as_str() {
            "urgent" | "high" => Some("HIGH"),
            "normal" => Some("MEDIUM"),
            "low" => Some("LOW"),
            _ => None,
        },
        SourceObjectType::Ticket => match priority.to_lowercase().as_str() {
            "urgent" => Some("URGENT"),
            "high" => Some("HIGH"),
            "normal" => Some("MEDIUM"),
            "low" => Some("LOW"),
            _ => None,
        },
    }
}

/// Translate a raw CRM status value into a tracker status.
///
/// Unknown pipeline stages map to `in progress` rather than failing, so a
/// mid-pipeline ticket does not show up as new work.
#[must_use]
pub fn tracker_status_for_crm(object_type: SourceObjectType, raw: &str) -> &'static str {
    match object_type {
        SourceObjectType::Task => {
            if raw.eq_ignore_ascii_case("COMPLETED") {
                "complete"
            } else {
                "not started"
            }
        }
        SourceObjectType::Ticket => match raw {
            "4" => "complete",
            "1" => "not started",
            _ => "in progress",
        },
    }
}

/// Translate a CRM priority into the tracker's 4-level ordinal (1 = urgent).
#[must_use]
pub fn tracker_priority_for_crm(raw: &str) -> Option<u8> {
    match raw.to_uppercase().as_str() {
        "URGENT" => Some(1),
        "HIGH" => Some(2),
        "MEDIUM" => Some(3),
        "LOW" => Some(4),
        _ => None,
    }
}

/// Pass through a scalar history value, unwrapping `{value: ...}` envelopes.
///
/// Only strings and numbers are forwarded to external writes; anything else
/// is skipped.
#[must_use]
pub fn scalar_value(value: &Value) -> MappedValue {
    let unwrapped = match value {
        Value::Object(map) => match map.get("value") {
            Some(inner) => inner,
            None => return MappedValue::Skip,
        },
        other => other,
    };
    match unwrapped {
        Value::String(s) => {
            // Some feeds double-encode scalars as JSON strings.
            match serde_json::from_str::<Value>(s) {
                Ok(Value::String(inner)) => MappedValue::Set(Value::String(inner)),
                Ok(Value::Number(n)) => MappedValue::Set(Value::Number(n)),
                _ => MappedValue::Set(Value::String(s.clone())),
            }
        }
        Value::Number(n) => MappedValue::Set(Value::Number(n.clone())),
        _ => MappedValue::Skip,
    }
}
