//! The synced-pair registry contract.
//!
//! A [`SyncedPair`] is the durable link between one source object and the
//! tracker task created for it. Pairs are written exactly once, never mutated
//! and never deleted; they are the idempotency record the whole service leans
//! on. The trait abstracts the durable store; the production implementation
//! lives in `tasklink-db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::SourceObjectType;

/// Durable link between a source object and its tracker task.
///
/// Unique over `(source_object_id, source_object_type)`; a target task id
/// appears in at most one active pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedPair {
    pub source_object_id: String,
    pub source_object_type: SourceObjectType,
    pub target_object_id: String,
    pub created_at: DateTime<Utc>,
}

/// Input for [`SyncRegistry::insert_if_absent`].
#[derive(Debug, Clone)]
pub struct NewSyncedPair {
    pub source_object_id: String,
    pub source_object_type: SourceObjectType,
    pub target_object_id: String,
}

/// Registry failures.
///
/// A storage fault is always reported as an error the caller may retry; it is
/// never collapsed into "not found", because "not found" selects the creation
/// branch and a flaky database must not trigger duplicate creations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backing store failed; the operation may be retried.
    #[error("registry storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RegistryError {
    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        RegistryError::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with an underlying cause.
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RegistryError::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Durable mapping between source object identities and tracker task ids.
#[async_trait]
pub trait SyncRegistry: Send + Sync {
    /// Look up the pair for a source object, if one exists.
    async fn find_by_source(
        &self,
        source_object_id: &str,
        source_object_type: SourceObjectType,
    ) -> RegistryResult<Option<SyncedPair>>;

    /// Look up the pair owning a tracker task, if one exists.
    async fn find_by_target(&self, target_object_id: &str) -> RegistryResult<Option<SyncedPair>>;

    /// Insert a pair unless one already exists for the same source identity.
    ///
    /// Atomic with respect to the uniqueness invariant: concurrent callers
    /// racing on the same `(source_object_id, source_object_type)` produce
    /// exactly one row. Losers observe `false` and no error.
    async fn insert_if_absent(&self, pair: NewSyncedPair) -> RegistryResult<bool>;
}
