//! REST adapter for the CRM-like source system.
//!
//! Implements [`tasklink_connector::SourceSystem`] against the CRM's
//! property-bag object API: objects are fetched and patched as string-keyed
//! property maps, property history is served alongside the object, and the
//! owners directory is a flat list.

pub mod client;
pub mod config;

pub use client::CrmClient;
pub use config::CrmConfig;
