//! Reconciliation error types.

use thiserror::Error;

use tasklink_connector::error::ConnectorError;
use tasklink_core::registry::RegistryError;

/// Errors surfaced by a reconciliation pass.
///
/// These never propagate back to the webhook submitter — the inbound endpoint
/// has already acknowledged by the time processing starts. They exist so the
/// worker can log faithfully and so tests can assert on failure modes.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The synced-pair registry failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// An external system call failed.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
}

/// Result type for reconciliation passes.
pub type SyncResult<T> = Result<T, SyncError>;
