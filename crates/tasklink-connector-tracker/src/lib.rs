//! REST adapter for the work-tracking target system.
//!
//! Implements [`tasklink_connector::TargetSystem`] against the tracker's
//! task API: tasks are created inside lists, lists live in spaces (optionally
//! under folders), and workspace members form the assignee directory.

pub mod client;
pub mod config;

pub use client::TrackerClient;
pub use config::TrackerConfig;
