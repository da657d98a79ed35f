//! Per-object-id in-flight guard.
//!
//! The only serialization point in the service: at most one reconciliation
//! attempt is active per object id at any instant. Acquisition is a single
//! check-and-set under one lock; additional events for a busy id are dropped
//! by the caller, never queued.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use tasklink_core::types::SourceObjectType;

/// Key into the in-flight set.
///
/// Source and target ids come from different systems and could collide as raw
/// strings, so the namespaces are kept apart in the type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GuardKey {
    /// A CRM object, identified by type and id.
    Source(SourceObjectType, String),
    /// A tracker task id.
    Target(String),
}

impl fmt::Display for GuardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardKey::Source(object_type, id) => write!(f, "crm/{object_type}/{id}"),
            GuardKey::Target(id) => write!(f, "tracker/{id}"),
        }
    }
}

/// Process-wide set of object ids currently being reconciled or awaiting a
/// delayed recheck.
#[derive(Debug, Default)]
pub struct InFlightGuard {
    busy: Mutex<HashSet<GuardKey>>,
}

impl InFlightGuard {
    /// Create an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a key busy iff it is not already busy.
    ///
    /// The check and the insert happen under one lock, so two concurrent
    /// callers can never both observe "not busy".
    pub fn try_acquire(&self, key: &GuardKey) -> bool {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if busy.contains(key) {
            return false;
        }
        busy.insert(key.clone());
        true
    }

    /// Clear the busy marker. Idempotent; safe to call on any outcome.
    pub fn release(&self, key: &GuardKey) {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        busy.remove(key);
    }

    /// Whether a key is currently held.
    #[must_use]
    pub fn is_busy(&self, key: &GuardKey) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}
