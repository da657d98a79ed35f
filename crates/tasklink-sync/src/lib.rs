//! Reconciliation engine for tasklink.
//!
//! Consumes change events from both external systems and converges them:
//! the in-flight guard collapses duplicate concurrent events, the recheck
//! scheduler resolves the create-vs-wait race, and the worker drives the
//! translate-and-write passes in both directions.

pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod recheck;
pub mod worker;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use events::{TargetChangeBatch, TargetFieldChange};
pub use guard::{GuardKey, InFlightGuard};
pub use recheck::RecheckScheduler;
pub use worker::{ReconciliationWorker, SyncState};
