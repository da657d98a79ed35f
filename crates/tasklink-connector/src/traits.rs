//! Capability traits for the two external systems.
//!
//! The reconciliation worker only ever sees these traits; the REST adapters
//! implement them, and tests substitute in-memory fakes.

use async_trait::async_trait;

use tasklink_core::types::{SourceObject, SourceObjectType};

use crate::error::ConnectorResult;
use crate::types::{DestinationList, PropertyVersion, TargetTaskSpec};

/// The CRM-like system of record for tickets and tasks.
#[async_trait]
pub trait SourceSystem: Send + Sync {
    /// Fetch a snapshot of an object. `None` when the object does not exist.
    async fn fetch_object(
        &self,
        object_id: &str,
        object_type: SourceObjectType,
    ) -> ConnectorResult<Option<SourceObject>>;

    /// Write a single property of an object.
    async fn update_object_field(
        &self,
        object_id: &str,
        object_type: SourceObjectType,
        property: &str,
        value: &serde_json::Value,
    ) -> ConnectorResult<()>;

    /// Fetch the change history of one property, newest entries included.
    async fn fetch_property_history(
        &self,
        object_id: &str,
        object_type: SourceObjectType,
        property: &str,
    ) -> ConnectorResult<Vec<PropertyVersion>>;

    /// Resolve an owner id to the user's email, if the directory knows it.
    async fn resolve_email_by_owner_id(&self, owner_id: &str) -> ConnectorResult<Option<String>>;

    /// Resolve an email to the owner id, if the directory knows it.
    async fn resolve_owner_id_by_email(&self, email: &str) -> ConnectorResult<Option<String>>;

    /// Name of an associated company, used for destination routing.
    async fn fetch_company_name(&self, company_id: &str) -> ConnectorResult<Option<String>>;

    /// Deep link to the object in the CRM UI, written back to the tracker.
    fn record_url(&self, object_id: &str, object_type: SourceObjectType) -> String;
}

/// The work-tracking system receiving mirrored tasks.
#[async_trait]
pub trait TargetSystem: Send + Sync {
    /// Create a task in a list; returns the new task id.
    async fn create_task(&self, list_id: &str, spec: &TargetTaskSpec) -> ConnectorResult<String>;

    /// Write a single field of a task.
    async fn update_task_field(
        &self,
        task_id: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> ConnectorResult<()>;

    /// Resolve a member email to the tracker user id.
    async fn resolve_member_by_email(&self, email: &str) -> ConnectorResult<Option<String>>;

    /// Find the destination list for a company, if its space exists.
    async fn resolve_destination_list(
        &self,
        company_name: &str,
    ) -> ConnectorResult<Option<DestinationList>>;

    /// Set a custom field on a task (best-effort back-references).
    async fn set_custom_field(
        &self,
        task_id: &str,
        field_id: &str,
        value: &serde_json::Value,
    ) -> ConnectorResult<()>;
}
