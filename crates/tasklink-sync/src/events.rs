//! Change batches arriving from the tracker side.

use serde::{Deserialize, Serialize};

/// A batch of field deltas for one tracker task, as delivered by its webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetChangeBatch {
    pub task_id: String,
    pub changes: Vec<TargetFieldChange>,
}

/// One changed field of a tracker task.
///
/// `after` carries whatever shape the tracker emits for the field: a scalar,
/// a `{status}`/`{priority}`/`{email}` envelope, or rich-text content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFieldChange {
    pub field: String,
    #[serde(default)]
    pub after: serde_json::Value,
}
