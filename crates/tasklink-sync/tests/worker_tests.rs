//! Reconciliation worker tests against in-memory collaborators.
//!
//! The fakes record every external call so tests can assert on exactly what
//! was created, updated, or skipped. Recheck-window tests run on paused
//! tokio time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use tasklink_connector::error::ConnectorResult;
use tasklink_connector::traits::{SourceSystem, TargetSystem};
use tasklink_connector::types::{DestinationList, PropertyVersion, TargetTaskSpec};
use tasklink_core::registry::{
    NewSyncedPair, RegistryError, RegistryResult, SyncRegistry, SyncedPair,
};
use tasklink_core::types::{ChangeEvent, EventKind, SourceObject, SourceObjectType};
use tasklink_sync::{
    ReconciliationWorker, SyncConfig, SyncState, TargetChangeBatch, TargetFieldChange,
};

#[derive(Default)]
struct MemoryRegistry {
    pairs: Mutex<Vec<SyncedPair>>,
    insert_successes: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryRegistry {
    fn seed_pair(&self, source_object_id: &str, object_type: SourceObjectType, target_id: &str) {
        self.pairs.lock().unwrap().push(SyncedPair {
            source_object_id: source_object_id.to_string(),
            source_object_type: object_type,
            target_object_id: target_id.to_string(),
            created_at: Utc::now(),
        });
    }

    fn check_available(&self) -> RegistryResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RegistryError::storage("registry offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncRegistry for MemoryRegistry {
    async fn find_by_source(
        &self,
        source_object_id: &str,
        source_object_type: SourceObjectType,
    ) -> RegistryResult<Option<SyncedPair>> {
        self.check_available()?;
        Ok(self
            .pairs
            .lock()
            .unwrap()
            .iter()
            .find(|pair| {
                pair.source_object_id == source_object_id
                    && pair.source_object_type == source_object_type
            })
            .cloned())
    }

    async fn find_by_target(&self, target_object_id: &str) -> RegistryResult<Option<SyncedPair>> {
        self.check_available()?;
        Ok(self
            .pairs
            .lock()
            .unwrap()
            .iter()
            .find(|pair| pair.target_object_id == target_object_id)
            .cloned())
    }

    async fn insert_if_absent(&self, pair: NewSyncedPair) -> RegistryResult<bool> {
        self.check_available()?;
        let mut pairs = self.pairs.lock().unwrap();
        if pairs.iter().any(|existing| {
            existing.source_object_id == pair.source_object_id
                && existing.source_object_type == pair.source_object_type
        }) {
            return Ok(false);
        }
        pairs.push(SyncedPair {
            source_object_id: pair.source_object_id,
            source_object_type: pair.source_object_type,
            target_object_id: pair.target_object_id,
            created_at: Utc::now(),
        });
        self.insert_successes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Registry simulating a concurrent creator that always wins the insert race.
struct LosingRegistry;

#[async_trait]
impl SyncRegistry for LosingRegistry {
    async fn find_by_source(
        &self,
        _source_object_id: &str,
        _source_object_type: SourceObjectType,
    ) -> RegistryResult<Option<SyncedPair>> {
        Ok(None)
    }

    async fn find_by_target(&self, _target_object_id: &str) -> RegistryResult<Option<SyncedPair>> {
        Ok(None)
    }

    async fn insert_if_absent(&self, _pair: NewSyncedPair) -> RegistryResult<bool> {
        Ok(false)
    }
}

#[derive(Default)]
struct FakeCrm {
    objects: Mutex<HashMap<(SourceObjectType, String), SourceObject>>,
    history: Mutex<HashMap<(String, String), Vec<PropertyVersion>>>,
    companies: HashMap<String, String>,
    owners: HashMap<String, String>,
    updates: Mutex<Vec<(String, String, Value)>>,
}

impl FakeCrm {
    fn seed_object(&self, object_type: SourceObjectType, object: SourceObject) {
        self.objects
            .lock()
            .unwrap()
            .insert((object_type, object.id.clone()), object);
    }

    fn seed_history(&self, object_id: &str, property: &str, versions: Vec<PropertyVersion>) {
        self.history
            .lock()
            .unwrap()
            .insert((object_id.to_string(), property.to_string()), versions);
    }
}

#[async_trait]
impl SourceSystem for FakeCrm {
    async fn fetch_object(
        &self,
        object_id: &str,
        object_type: SourceObjectType,
    ) -> ConnectorResult<Option<SourceObject>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(object_type, object_id.to_string()))
            .cloned())
    }

    async fn update_object_field(
        &self,
        object_id: &str,
        _object_type: SourceObjectType,
        property: &str,
        value: &Value,
    ) -> ConnectorResult<()> {
        self.updates.lock().unwrap().push((
            object_id.to_string(),
            property.to_string(),
            value.clone(),
        ));
        Ok(())
    }

    async fn fetch_property_history(
        &self,
        object_id: &str,
        _object_type: SourceObjectType,
        property: &str,
    ) -> ConnectorResult<Vec<PropertyVersion>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(&(object_id.to_string(), property.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_email_by_owner_id(&self, owner_id: &str) -> ConnectorResult<Option<String>> {
        Ok(self.owners.get(owner_id).cloned())
    }

    async fn resolve_owner_id_by_email(&self, email: &str) -> ConnectorResult<Option<String>> {
        Ok(self
            .owners
            .iter()
            .find(|(_, e)| e.eq_ignore_ascii_case(email))
            .map(|(id, _)| id.clone()))
    }

    async fn fetch_company_name(&self, company_id: &str) -> ConnectorResult<Option<String>> {
        Ok(self.companies.get(company_id).cloned())
    }

    fn record_url(&self, object_id: &str, object_type: SourceObjectType) -> String {
        format!("https://crm.test/record/{}/{object_id}", object_type.as_str())
    }
}

#[derive(Default)]
struct FakeTracker {
    created: Mutex<Vec<(String, TargetTaskSpec)>>,
    updates: Mutex<Vec<(String, String, Value)>>,
    custom_fields: Mutex<Vec<(String, String, Value)>>,
    members: HashMap<String, String>,
    lists: HashMap<String, DestinationList>,
    next_id: AtomicUsize,
    create_delay_ms: u64,
}

#[async_trait]
impl TargetSystem for FakeTracker {
    async fn create_task(&self, list_id: &str, spec: &TargetTaskSpec) -> ConnectorResult<String> {
        if self.create_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.create_delay_ms)).await;
        }
        let task_id = format!("task-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.created
            .lock()
            .unwrap()
            .push((list_id.to_string(), spec.clone()));
        Ok(task_id)
    }

    async fn update_task_field(
        &self,
        task_id: &str,
        field: &str,
        value: &Value,
    ) -> ConnectorResult<()> {
        self.updates
            .lock()
            .unwrap()
            .push((task_id.to_string(), field.to_string(), value.clone()));
        Ok(())
    }

    async fn resolve_member_by_email(&self, email: &str) -> ConnectorResult<Option<String>> {
        Ok(self.members.get(email).cloned())
    }

    async fn resolve_destination_list(
        &self,
        company_name: &str,
    ) -> ConnectorResult<Option<DestinationList>> {
        Ok(self.lists.get(company_name).cloned())
    }

    async fn set_custom_field(
        &self,
        task_id: &str,
        field_id: &str,
        value: &Value,
    ) -> ConnectorResult<()> {
        self.custom_fields.lock().unwrap().push((
            task_id.to_string(),
            field_id.to_string(),
            value.clone(),
        ));
        Ok(())
    }
}

fn test_config() -> SyncConfig {
    SyncConfig::new("fallback-list").with_history_window_secs(300)
}

fn build_worker(
    registry: Arc<dyn SyncRegistry>,
    crm: Arc<FakeCrm>,
    tracker: Arc<FakeTracker>,
    config: SyncConfig,
) -> Arc<ReconciliationWorker> {
    Arc::new(ReconciliationWorker::new(registry, crm, tracker, config))
}

fn creation_event(object_id: &str, object_type: SourceObjectType) -> ChangeEvent {
    ChangeEvent {
        object_id: object_id.to_string(),
        object_type,
        event_kind: EventKind::Creation,
        field: None,
        before: None,
        after: None,
        occurred_at: Some(Utc::now()),
    }
}

fn change_event(object_id: &str, object_type: SourceObjectType, field: &str) -> ChangeEvent {
    ChangeEvent {
        object_id: object_id.to_string(),
        object_type,
        event_kind: EventKind::PropertyChange,
        field: Some(field.to_string()),
        before: None,
        after: None,
        occurred_at: Some(Utc::now()),
    }
}

fn ticket(id: &str) -> SourceObject {
    let mut properties = HashMap::new();
    properties.insert("subject".to_string(), "Printer is on fire".to_string());
    properties.insert("content".to_string(), "<p>Please send help</p>".to_string());
    properties.insert("pipeline_stage".to_string(), "2".to_string());
    properties.insert("priority".to_string(), "URGENT".to_string());
    properties.insert("owner_id".to_string(), "901".to_string());
    SourceObject {
        id: id.to_string(),
        properties,
        company_id: Some("C1".to_string()),
    }
}

fn recent(value: Value) -> PropertyVersion {
    PropertyVersion {
        timestamp: Utc::now(),
        value,
    }
}

fn stale(value: Value) -> PropertyVersion {
    PropertyVersion {
        timestamp: Utc::now() - chrono::Duration::hours(1),
        value,
    }
}

#[tokio::test]
async fn creation_event_creates_task_and_records_pair() {
    let registry = Arc::new(MemoryRegistry::default());
    let crm = Arc::new(FakeCrm {
        companies: HashMap::from([("C1".to_string(), "Acme".to_string())]),
        owners: HashMap::from([("901".to_string(), "dana@example.com".to_string())]),
        ..Default::default()
    });
    crm.seed_object(SourceObjectType::Ticket, ticket("T1"));
    let tracker = Arc::new(FakeTracker {
        members: HashMap::from([("dana@example.com".to_string(), "member-7".to_string())]),
        lists: HashMap::from([(
            "Acme".to_string(),
            DestinationList {
                id: "list-acme".to_string(),
                name: "Acme / Support Ticket Form".to_string(),
            },
        )]),
        ..Default::default()
    });
    let worker = build_worker(
        registry.clone(),
        crm.clone(),
        tracker.clone(),
        test_config().with_backref_field("crm-link-field"),
    );

    worker
        .handle_source_event(creation_event("T1", SourceObjectType::Ticket))
        .await;

    let created = tracker.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    let (list_id, spec) = &created[0];
    assert_eq!(list_id, "list-acme");
    assert_eq!(spec.name, "Printer is on fire");
    assert_eq!(spec.assignees, vec!["member-7".to_string()]);
    assert_eq!(spec.priority, Some(1));
    assert_eq!(spec.status.as_deref(), Some("in progress"));
    assert!(spec.tags.contains(&"Ticket".to_string()));
    drop(created);

    assert_eq!(
        worker
            .state_of("T1", SourceObjectType::Ticket)
            .await
            .unwrap(),
        SyncState::Synced
    );
    let backrefs = tracker.custom_fields.lock().unwrap();
    assert_eq!(backrefs.len(), 1);
    assert_eq!(backrefs[0].1, "crm-link-field");
    assert_eq!(backrefs[0].2, json!("https://crm.test/record/ticket/T1"));
}

#[tokio::test]
async fn duplicate_creation_never_creates_a_second_task() {
    let registry = Arc::new(MemoryRegistry::default());
    let crm = Arc::new(FakeCrm::default());
    crm.seed_object(SourceObjectType::Ticket, ticket("T1"));
    let tracker = Arc::new(FakeTracker::default());
    let worker = build_worker(registry.clone(), crm.clone(), tracker.clone(), test_config());

    for _ in 0..2 {
        worker
            .handle_source_event(creation_event("T1", SourceObjectType::Ticket))
            .await;
    }

    assert_eq!(tracker.created.lock().unwrap().len(), 1);
    assert_eq!(registry.insert_successes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn change_event_with_pair_applies_recent_history_only() {
    let registry = Arc::new(MemoryRegistry::default());
    registry.seed_pair("T1", SourceObjectType::Ticket, "task-9");
    let crm = Arc::new(FakeCrm::default());
    crm.seed_history("T1", "priority", vec![recent(json!("URGENT"))]);
    crm.seed_history("T1", "subject", vec![stale(json!("Old subject"))]);
    let tracker = Arc::new(FakeTracker::default());
    let worker = build_worker(registry, crm, tracker.clone(), test_config());

    worker
        .handle_source_event(change_event("T1", SourceObjectType::Ticket, "priority"))
        .await;

    let updates = tracker.updates.lock().unwrap();
    assert_eq!(
        updates.as_slice(),
        &[("task-9".to_string(), "priority".to_string(), json!(1))]
    );
    assert_eq!(worker.pending_rechecks(), 0);
}

#[tokio::test(start_paused = true)]
async fn change_event_without_pair_waits_then_creates() {
    let registry = Arc::new(MemoryRegistry::default());
    let crm = Arc::new(FakeCrm::default());
    crm.seed_object(SourceObjectType::Ticket, ticket("T1"));
    let tracker = Arc::new(FakeTracker::default());
    let worker = build_worker(registry.clone(), crm, tracker.clone(), test_config());

    worker
        .handle_source_event(change_event("T1", SourceObjectType::Ticket, "subject"))
        .await;

    assert_eq!(
        worker
            .state_of("T1", SourceObjectType::Ticket)
            .await
            .unwrap(),
        SyncState::AwaitingConfirmation
    );
    assert_eq!(worker.pending_rechecks(), 1);
    assert!(tracker.created.lock().unwrap().is_empty());

    // A second event for the same id is dropped, not queued.
    worker
        .handle_source_event(change_event("T1", SourceObjectType::Ticket, "priority"))
        .await;
    assert_eq!(worker.pending_rechecks(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;

    assert_eq!(tracker.created.lock().unwrap().len(), 1);
    // Unrouted creations land in the fallback list.
    assert_eq!(tracker.created.lock().unwrap()[0].0, "fallback-list");
    assert_eq!(registry.insert_successes.load(Ordering::SeqCst), 1);
    assert_eq!(worker.pending_rechecks(), 0);
    assert_eq!(
        worker
            .state_of("T1", SourceObjectType::Ticket)
            .await
            .unwrap(),
        SyncState::Synced
    );
}

#[tokio::test(start_paused = true)]
async fn pair_appearing_during_wait_turns_recheck_into_update() {
    let registry = Arc::new(MemoryRegistry::default());
    let crm = Arc::new(FakeCrm::default());
    crm.seed_history("T1", "pipeline_stage", vec![recent(json!("4"))]);
    let tracker = Arc::new(FakeTracker::default());
    let worker = build_worker(registry.clone(), crm, tracker.clone(), test_config());

    worker
        .handle_source_event(change_event(
            "T1",
            SourceObjectType::Ticket,
            "pipeline_stage",
        ))
        .await;
    assert_eq!(worker.pending_rechecks(), 1);

    // The pair is written by another path while the recheck waits.
    registry.seed_pair("T1", SourceObjectType::Ticket, "task-9");

    tokio::time::sleep(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;

    assert!(tracker.created.lock().unwrap().is_empty());
    let updates = tracker.updates.lock().unwrap();
    assert_eq!(
        updates.as_slice(),
        &[(
            "task-9".to_string(),
            "status".to_string(),
            json!("complete")
        )]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creation_events_collapse_to_one_task() {
    let registry = Arc::new(MemoryRegistry::default());
    let crm = Arc::new(FakeCrm::default());
    crm.seed_object(
        SourceObjectType::Task,
        SourceObject {
            id: "A1".to_string(),
            properties: HashMap::from([(
                "task_subject".to_string(),
                "Follow up with Acme".to_string(),
            )]),
            company_id: None,
        },
    );
    let tracker = Arc::new(FakeTracker {
        create_delay_ms: 50,
        ..Default::default()
    });
    let worker = build_worker(registry.clone(), crm, tracker.clone(), test_config());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move {
                worker
                    .handle_source_event(creation_event("A1", SourceObjectType::Task))
                    .await;
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(tracker.created.lock().unwrap().len(), 1);
    assert_eq!(registry.insert_successes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn registry_fault_drops_event_without_scheduling() {
    let registry = Arc::new(MemoryRegistry::default());
    registry.fail.store(true, Ordering::SeqCst);
    let crm = Arc::new(FakeCrm::default());
    let tracker = Arc::new(FakeTracker::default());
    let worker = build_worker(registry.clone(), crm, tracker.clone(), test_config());

    worker
        .handle_source_event(change_event("T1", SourceObjectType::Ticket, "subject"))
        .await;

    // A flaky registry must not look like "not found".
    assert_eq!(worker.pending_rechecks(), 0);
    assert!(tracker.created.lock().unwrap().is_empty());

    // The guard was released, so the id is not stuck once the registry heals.
    registry.fail.store(false, Ordering::SeqCst);
    worker
        .handle_source_event(change_event("T1", SourceObjectType::Ticket, "subject"))
        .await;
    assert_eq!(worker.pending_rechecks(), 1);
}

#[tokio::test]
async fn lost_insert_race_keeps_existing_pair() {
    let crm = Arc::new(FakeCrm::default());
    crm.seed_object(SourceObjectType::Ticket, ticket("T1"));
    let tracker = Arc::new(FakeTracker::default());
    let worker = build_worker(
        Arc::new(LosingRegistry),
        crm,
        tracker.clone(),
        test_config().with_backref_field("crm-link-field"),
    );

    worker
        .handle_source_event(creation_event("T1", SourceObjectType::Ticket))
        .await;

    // The redundant task was created but the existing pair stays
    // authoritative: no back-reference is written to the orphan.
    assert_eq!(tracker.created.lock().unwrap().len(), 1);
    assert!(tracker.custom_fields.lock().unwrap().is_empty());
}

#[tokio::test]
async fn target_event_syncs_fields_back_to_crm() {
    let registry = Arc::new(MemoryRegistry::default());
    registry.seed_pair("T1", SourceObjectType::Ticket, "task-9");
    let crm = Arc::new(FakeCrm {
        owners: HashMap::from([("901".to_string(), "dana@example.com".to_string())]),
        ..Default::default()
    });
    let tracker = Arc::new(FakeTracker::default());
    let worker = build_worker(registry, crm.clone(), tracker, test_config());

    worker
        .handle_target_event(TargetChangeBatch {
            task_id: "task-9".to_string(),
            changes: vec![
                TargetFieldChange {
                    field: "status".to_string(),
                    after: json!({ "status": "complete" }),
                },
                TargetFieldChange {
                    field: "priority".to_string(),
                    after: json!({ "priority": "urgent" }),
                },
                TargetFieldChange {
                    field: "assignee_add".to_string(),
                    after: json!({ "email": "dana@example.com" }),
                },
                // Ticket bodies are never overwritten from the tracker.
                TargetFieldChange {
                    field: "content".to_string(),
                    after: json!({ "ops": [{ "insert": "edited\n" }] }),
                },
            ],
        })
        .await;

    let updates = crm.updates.lock().unwrap();
    assert!(updates.contains(&(
        "T1".to_string(),
        "pipeline_stage".to_string(),
        json!("4")
    )));
    assert!(updates.contains(&("T1".to_string(), "priority".to_string(), json!("URGENT"))));
    assert!(updates.contains(&("T1".to_string(), "owner_id".to_string(), json!("901"))));
    assert!(!updates.iter().any(|(_, property, _)| property == "content"));
}

#[tokio::test]
async fn target_event_for_unlinked_task_is_skipped() {
    let registry = Arc::new(MemoryRegistry::default());
    let crm = Arc::new(FakeCrm::default());
    let tracker = Arc::new(FakeTracker::default());
    let worker = build_worker(registry, crm.clone(), tracker, test_config());

    worker
        .handle_target_event(TargetChangeBatch {
            task_id: "task-unknown".to_string(),
            changes: vec![TargetFieldChange {
                field: "name".to_string(),
                after: json!("Renamed"),
            }],
        })
        .await;

    assert!(crm.updates.lock().unwrap().is_empty());
}
