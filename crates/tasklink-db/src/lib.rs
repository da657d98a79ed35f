//! Postgres-backed storage for tasklink.
//!
//! Holds the production [`tasklink_core::SyncRegistry`] implementation. The
//! uniqueness invariant of the synced-pair table is enforced by the database
//! (`ON CONFLICT DO NOTHING` against the primary key), not by application
//! checks, so racing inserts collapse to exactly one row.

pub mod registry;

pub use registry::PgSyncRegistry;
