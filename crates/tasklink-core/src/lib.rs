//! # tasklink core
//!
//! Domain model for the tasklink reconciliation service: the change-event
//! vocabulary shared by both external systems, the rich-text translator,
//! the field mapping tables, and the synced-pair registry contract.
//!
//! Everything here is I/O free. The durable registry implementation lives in
//! `tasklink-db`; the external system adapters live in the connector crates.

pub mod mapping;
pub mod registry;
pub mod richtext;
pub mod types;

pub use registry::{NewSyncedPair, RegistryError, RegistryResult, SyncRegistry, SyncedPair};
pub use richtext::{Delta, DeltaOp, OpAttributes};
pub use types::{ChangeEvent, EventKind, SourceObject, SourceObjectType};
