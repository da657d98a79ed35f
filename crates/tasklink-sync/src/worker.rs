//! The reconciliation worker.
//!
//! Each inbound event is an independent unit of work; the in-flight guard is
//! the only serialization point. The worker decides, per event, whether to
//! create a new linked pair, update an existing one, or wait out the
//! create-vs-sync race behind a delayed recheck.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use tasklink_connector::traits::{SourceSystem, TargetSystem};
use tasklink_connector::types::{TargetTaskSpec, TaskContent};
use tasklink_core::mapping::{self, MappedValue};
use tasklink_core::registry::{NewSyncedPair, SyncRegistry, SyncedPair};
use tasklink_core::richtext;
use tasklink_core::types::{ChangeEvent, EventKind, SourceObject, SourceObjectType};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::events::TargetChangeBatch;
use crate::guard::{GuardKey, InFlightGuard};
use crate::recheck::RecheckScheduler;

/// Reconciliation state of a source object.
///
/// `Unsynced` is implicit (no registry record, nothing in flight);
/// `AwaitingConfirmation` means a recheck is pending; `Synced` is terminal
/// (a pair exists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsynced,
    AwaitingConfirmation,
    Synced,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Unsynced => write!(f, "unsynced"),
            SyncState::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            SyncState::Synced => write!(f, "synced"),
        }
    }
}

/// Orchestrates reconciliation between the CRM and the tracker.
pub struct ReconciliationWorker {
    registry: Arc<dyn SyncRegistry>,
    source: Arc<dyn SourceSystem>,
    target: Arc<dyn TargetSystem>,
    guard: InFlightGuard,
    scheduler: RecheckScheduler,
    config: SyncConfig,
}

impl ReconciliationWorker {
    /// Create a worker over the registry and the two external systems.
    pub fn new(
        registry: Arc<dyn SyncRegistry>,
        source: Arc<dyn SourceSystem>,
        target: Arc<dyn TargetSystem>,
        config: SyncConfig,
    ) -> Self {
        let scheduler = RecheckScheduler::new(Duration::from_secs(config.recheck_window_secs));
        Self {
            registry,
            source,
            target,
            guard: InFlightGuard::new(),
            scheduler,
            config,
        }
    }

    /// Number of rechecks currently waiting.
    #[must_use]
    pub fn pending_rechecks(&self) -> usize {
        self.scheduler.pending()
    }

    /// Current reconciliation state of a source object.
    pub async fn state_of(
        &self,
        object_id: &str,
        object_type: SourceObjectType,
    ) -> SyncResult<SyncState> {
        if self
            .registry
            .find_by_source(object_id, object_type)
            .await?
            .is_some()
        {
            return Ok(SyncState::Synced);
        }
        let key = GuardKey::Source(object_type, object_id.to_string());
        if self.guard.is_busy(&key) {
            return Ok(SyncState::AwaitingConfirmation);
        }
        Ok(SyncState::Unsynced)
    }

    /// Handle one change event from the CRM side.
    ///
    /// Returns once the event is resolved or a recheck is parked; the recheck
    /// itself runs on a spawned timer task. Failures are logged, never
    /// propagated — the webhook has already been acknowledged.
    #[instrument(skip(self, event), fields(object_id = %event.object_id, object_type = %event.object_type, kind = %event.event_kind))]
    pub async fn handle_source_event(self: &Arc<Self>, event: ChangeEvent) {
        let key = GuardKey::Source(event.object_type, event.object_id.clone());
        if !self.guard.try_acquire(&key) {
            info!(key = %key, "object already in flight, dropping event");
            return;
        }

        match event.event_kind {
            EventKind::Creation => {
                if let Err(e) = self.creation_pass(&event.object_id, event.object_type).await {
                    error!(key = %key, error = %e, "creation pass failed");
                }
                self.guard.release(&key);
            }
            EventKind::PropertyChange => {
                match self
                    .registry
                    .find_by_source(&event.object_id, event.object_type)
                    .await
                {
                    Ok(Some(pair)) => {
                        if let Err(e) = self.update_pass(&pair).await {
                            error!(key = %key, error = %e, "update pass failed");
                        }
                        self.guard.release(&key);
                    }
                    Ok(None) => self.await_confirmation(key, event),
                    Err(e) => {
                        // A flaky registry must not select the creation branch.
                        error!(key = %key, error = %e, "registry lookup failed, dropping event");
                        self.guard.release(&key);
                    }
                }
            }
        }
    }

    /// Park an unsynced object behind the recheck window.
    ///
    /// The guard stays held until the recheck job completes, so every further
    /// event for this id is dropped in the meantime.
    fn await_confirmation(self: &Arc<Self>, key: GuardKey, event: ChangeEvent) {
        debug!(
            key = %key,
            window_secs = self.config.recheck_window_secs,
            "no pair yet, waiting before re-checking"
        );
        let worker = Arc::clone(self);
        let job_key = key.clone();
        let scheduled = self.scheduler.schedule(key.clone(), async move {
            worker.recheck(&event.object_id, event.object_type).await;
            worker.guard.release(&job_key);
        });
        if !scheduled {
            // The guard should make this unreachable; recover rather than leak.
            warn!(key = %key, "recheck slot unexpectedly occupied");
            self.guard.release(&key);
        }
    }

    /// Re-evaluate an object after the wait window.
    async fn recheck(&self, object_id: &str, object_type: SourceObjectType) {
        match self.registry.find_by_source(object_id, object_type).await {
            Ok(Some(pair)) => {
                info!(object_id, "pair appeared during the wait, updating instead of creating");
                if let Err(e) = self.update_pass(&pair).await {
                    error!(object_id, error = %e, "post-recheck update failed");
                }
            }
            Ok(None) => {
                info!(object_id, "still unsynced after the wait, creating");
                if let Err(e) = self.creation_pass(object_id, object_type).await {
                    error!(object_id, error = %e, "post-recheck creation failed");
                }
            }
            Err(e) => error!(object_id, error = %e, "recheck registry lookup failed"),
        }
    }

    /// Create the tracker counterpart for a source object and record the pair.
    async fn creation_pass(
        &self,
        object_id: &str,
        object_type: SourceObjectType,
    ) -> SyncResult<()> {
        // Duplicate creation events are routed to the update pass.
        if let Some(existing) = self.registry.find_by_source(object_id, object_type).await? {
            debug!(object_id, "already synced, updating instead");
            return self.update_pass(&existing).await;
        }

        let Some(object) = self.source.fetch_object(object_id, object_type).await? else {
            warn!(object_id, "source object not retrievable, nothing to create");
            return Ok(());
        };

        let spec = self.build_task_spec(&object, object_type).await;
        let list_id = self.resolve_destination(&object).await;
        let target_id = self.target.create_task(&list_id, &spec).await?;

        let inserted = self
            .registry
            .insert_if_absent(NewSyncedPair {
                source_object_id: object_id.to_string(),
                source_object_type: object_type,
                target_object_id: target_id.clone(),
            })
            .await?;
        if !inserted {
            // Lost the unique-insert race: the pre-existing pair is
            // authoritative and the task created here is left orphaned.
            warn!(
                object_id,
                orphaned_task_id = %target_id,
                "lost creation race, keeping existing pair"
            );
            return Ok(());
        }
        info!(object_id, target_id = %target_id, state = %SyncState::Synced, "pair recorded");

        if let Some(field_id) = &self.config.backref_field_id {
            let url = self.source.record_url(object_id, object_type);
            if let Err(e) = self
                .target
                .set_custom_field(&target_id, field_id, &json!(url))
                .await
            {
                warn!(target_id = %target_id, error = %e, "back-reference field update failed");
            }
        }
        Ok(())
    }

    /// Translate a source snapshot into a tracker task specification.
    async fn build_task_spec(
        &self,
        object: &SourceObject,
        object_type: SourceObjectType,
    ) -> TargetTaskSpec {
        let name = object
            .property(mapping::subject_property(object_type))
            .unwrap_or("No Subject")
            .to_string();

        let mut tags = Vec::new();
        if object_type == SourceObjectType::Ticket {
            tags.push(self.config.ticket_tag.clone());
        }

        let description = match object.property(mapping::content_property(object_type)) {
            None => TaskContent::Text("No description".to_string()),
            Some(body) => {
                let body_value = Value::String(body.to_string());
                match richtext::extract_media_link(&body_value) {
                    Some(url) => {
                        debug!(url = %url, "clip link detected in source body");
                        tags.push(self.config.clip_tag.clone());
                        TaskContent::Delta(richtext::build_clip_delta(&url))
                    }
                    None => TaskContent::Delta(richtext::delta_from_html(body)),
                }
            }
        };

        let due_date = object
            .property(mapping::due_property(object_type))
            .and_then(parse_epoch_millis);
        let priority = object
            .property(mapping::priority_property(object_type))
            .and_then(mapping::tracker_priority_for_crm);
        let status = object
            .property(mapping::status_property(object_type))
            .map(|raw| mapping::tracker_status_for_crm(object_type, raw).to_string());

        let assignees = match object.property(mapping::owner_property(object_type)) {
            Some(owner_id) => self.resolve_assignee(owner_id).await.into_iter().collect(),
            None => Vec::new(),
        };

        TargetTaskSpec {
            name,
            description,
            due_date,
            assignees,
            priority,
            status,
            tags,
        }
    }

    /// Owner id → email → tracker member id. Any miss skips the assignee.
    async fn resolve_assignee(&self, owner_id: &str) -> Option<String> {
        let email = match self.source.resolve_email_by_owner_id(owner_id).await {
            Ok(Some(email)) => email,
            Ok(None) => {
                debug!(owner_id, "owner has no email, skipping assignee");
                return None;
            }
            Err(e) => {
                warn!(owner_id, error = %e, "owner directory lookup failed, skipping assignee");
                return None;
            }
        };
        match self.target.resolve_member_by_email(&email).await {
            Ok(Some(member_id)) => Some(member_id),
            Ok(None) => {
                debug!(email = %email, "no tracker member for email, skipping assignee");
                None
            }
            Err(e) => {
                warn!(email = %email, error = %e, "member directory lookup failed, skipping assignee");
                None
            }
        }
    }

    /// Route a creation to the company's list, or the fallback list.
    async fn resolve_destination(&self, object: &SourceObject) -> String {
        if let Some(company_id) = &object.company_id {
            match self.source.fetch_company_name(company_id).await {
                Ok(Some(name)) => match self.target.resolve_destination_list(&name).await {
                    Ok(Some(list)) => {
                        debug!(company = %name, list_id = %list.id, list_name = %list.name, "routed by company");
                        return list.id;
                    }
                    Ok(None) => debug!(company = %name, "no destination list for company"),
                    Err(e) => warn!(company = %name, error = %e, "destination lookup failed"),
                },
                Ok(None) => debug!(company_id = %company_id, "company has no name"),
                Err(e) => warn!(company_id = %company_id, error = %e, "company lookup failed"),
            }
        }
        info!(list_id = %self.config.fallback_list_id, "using fallback list");
        self.config.fallback_list_id.clone()
    }

    /// Field-by-field update of the tracker task from recent CRM history.
    ///
    /// The triggering event payload is not trusted — events for an id can be
    /// dropped while a recheck is pending, so each mapped property is
    /// re-read from its history and only recent values are applied.
    async fn update_pass(&self, pair: &SyncedPair) -> SyncResult<()> {
        let object_type = pair.source_object_type;
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.history_window_secs);
        let mut updated = 0usize;

        for property in mapping::tracked_crm_properties(object_type) {
            let history = match self
                .source
                .fetch_property_history(&pair.source_object_id, object_type, property)
                .await
            {
                Ok(history) => history,
                Err(e) => {
                    warn!(property, error = %e, "property history fetch failed");
                    continue;
                }
            };
            let Some(latest) = history
                .iter()
                .filter(|version| version.timestamp > cutoff)
                .max_by_key(|version| version.timestamp)
            else {
                continue;
            };

            match self.apply_source_change(pair, property, &latest.value).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(property, error = %e, "target field update failed");
                }
            }
        }

        if updated == 0 {
            debug!(
                object_id = %pair.source_object_id,
                "no recent property changes to apply"
            );
        }
        Ok(())
    }

    /// Transform one changed CRM property and write it to the tracker task.
    ///
    /// Returns `Ok(true)` when a field was written, `Ok(false)` when the
    /// property was skipped (unmapped, invalid, or a directory miss).
    async fn apply_source_change(
        &self,
        pair: &SyncedPair,
        property: &str,
        value: &Value,
    ) -> SyncResult<bool> {
        let object_type = pair.source_object_type;
        let Some(field) = mapping::tracker_field_for_crm_property(object_type, property) else {
            return Ok(false);
        };

        let payload: Option<Value> = match field {
            "assignees" => match value_as_string(value) {
                Some(owner_id) => self
                    .resolve_assignee(&owner_id)
                    .await
                    .map(|member_id| json!({ "add": [member_id] })),
                None => None,
            },
            "status" => value_as_string(value)
                .map(|raw| json!(mapping::tracker_status_for_crm(object_type, &raw))),
            "priority" => value_as_string(value)
                .and_then(|raw| mapping::tracker_priority_for_crm(&raw))
                .map(|ordinal| json!(ordinal)),
            "due_date" => value_as_string(value)
                .and_then(|raw| parse_epoch_millis(&raw))
                .map(|millis| json!(millis)),
            "description" => Some(json!(description_text(value))),
            _ => mapping::scalar_value(value).into_value(),
        };

        let Some(payload) = payload else {
            debug!(property, "skipping invalid or unmappable value");
            return Ok(false);
        };

        self.target
            .update_task_field(&pair.target_object_id, field, &payload)
            .await?;
        info!(
            object_id = %pair.source_object_id,
            target_id = %pair.target_object_id,
            property,
            field,
            "field synced to tracker"
        );
        Ok(true)
    }

    /// Handle a change batch from the tracker side.
    ///
    /// Tasks with no recorded pair are skipped: the tracker is never the
    /// system of record, so unlinked tasks are not mirrored back.
    #[instrument(skip(self, batch), fields(task_id = %batch.task_id))]
    pub async fn handle_target_event(&self, batch: TargetChangeBatch) {
        let key = GuardKey::Target(batch.task_id.clone());
        if !self.guard.try_acquire(&key) {
            info!(key = %key, "task already in flight, dropping event");
            return;
        }
        if let Err(e) = self.target_pass(&batch).await {
            error!(key = %key, error = %e, "target event pass failed");
        }
        self.guard.release(&key);
    }

    async fn target_pass(&self, batch: &TargetChangeBatch) -> SyncResult<()> {
        let Some(pair) = self.registry.find_by_target(&batch.task_id).await? else {
            debug!(task_id = %batch.task_id, "task not linked to a source object, skipping");
            return Ok(());
        };
        let object_type = pair.source_object_type;

        for change in &batch.changes {
            // Owner reassignment arrives as a dedicated pseudo-field carrying
            // the new assignee's email.
            if change.field == "assignee_add" {
                self.reassign_source_owner(&pair, &change.after).await;
                continue;
            }

            let Some(property) =
                mapping::crm_property_for_tracker_field(object_type, &change.field)
            else {
                continue;
            };

            let mapped = match change.field.as_str() {
                "status" => {
                    let raw = change
                        .after
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    MappedValue::Set(json!(mapping::crm_status_for_tracker_status(
                        object_type,
                        raw
                    )))
                }
                "priority" => change
                    .after
                    .get("priority")
                    .and_then(Value::as_str)
                    .and_then(|p| mapping::crm_priority_for_tracker_priority(object_type, p))
                    .map_or(MappedValue::Skip, |p| MappedValue::Set(json!(p))),
                "content" => {
                    let text = match richtext::extract_media_link(&change.after) {
                        Some(url) => format!("{}: {url}", richtext::CLIP_CTA_LABEL),
                        None => richtext::to_plain_text(&change.after),
                    };
                    MappedValue::Set(json!(text))
                }
                _ => mapping::scalar_value(&change.after),
            };

            let Some(value) = mapped.into_value() else {
                debug!(field = %change.field, "skipping invalid tracker value");
                continue;
            };

            if let Err(e) = self
                .source
                .update_object_field(&pair.source_object_id, object_type, property, &value)
                .await
            {
                warn!(property, error = %e, "source field update failed");
                continue;
            }
            info!(
                task_id = %batch.task_id,
                object_id = %pair.source_object_id,
                field = %change.field,
                property,
                "field synced to CRM"
            );
        }
        Ok(())
    }

    /// Resolve a tracker member email back to a CRM owner and reassign.
    async fn reassign_source_owner(&self, pair: &SyncedPair, after: &Value) {
        let Some(email) = after.get("email").and_then(Value::as_str) else {
            debug!("assignee change without email, skipping");
            return;
        };
        match self.source.resolve_owner_id_by_email(email).await {
            Ok(Some(owner_id)) => {
                let property = mapping::owner_property(pair.source_object_type);
                if let Err(e) = self
                    .source
                    .update_object_field(
                        &pair.source_object_id,
                        pair.source_object_type,
                        property,
                        &json!(owner_id),
                    )
                    .await
                {
                    warn!(email = %email, error = %e, "owner reassignment failed");
                } else {
                    info!(email = %email, owner_id = %owner_id, "owner reassigned in CRM");
                }
            }
            Ok(None) => warn!(email = %email, "no CRM owner for email, skipping reassignment"),
            Err(e) => warn!(email = %email, error = %e, "owner directory lookup failed"),
        }
    }
}

/// Parse a due date as epoch milliseconds or an RFC 3339 timestamp.
fn parse_epoch_millis(raw: &str) -> Option<i64> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Some(millis);
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Coerce a history value to a string through the scalar rules.
fn value_as_string(value: &Value) -> Option<String> {
    match mapping::scalar_value(value) {
        MappedValue::Set(Value::String(s)) => Some(s),
        MappedValue::Set(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Flatten a body value (delta, encoded delta, or HTML) to the text written
/// into the tracker description. Clip deltas render as the call-to-action
/// anchor; everything else degrades to plain text, and raw HTML strings pass
/// through untouched.
fn description_text(value: &Value) -> String {
    if richtext::is_likely_delta(value) {
        if let Ok(delta) = serde_json::from_value::<richtext::Delta>(value.clone()) {
            return richtext::html_from_delta(&delta)
                .unwrap_or_else(|| delta.plain_text().trim().to_string());
        }
    }
    match value {
        Value::String(s) => s.clone(),
        other => richtext::to_plain_text(other),
    }
}
