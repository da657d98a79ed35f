//! Delayed-recheck scheduler.
//!
//! One timer job per object id: sleep for the configured window, then run the
//! re-evaluation the worker handed in. Jobs are never cancelled — they always
//! run to completion (the in-flight guard is released inside the job). The
//! map of live jobs exists so a second job for the same key can be refused
//! and so shutdown code can observe what is still pending.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::guard::GuardKey;

/// Timer jobs keyed by object id, owned by the reconciliation worker.
#[derive(Debug)]
pub struct RecheckScheduler {
    delay: Duration,
    jobs: Arc<Mutex<HashMap<GuardKey, JoinHandle<()>>>>,
}

impl RecheckScheduler {
    /// Create a scheduler with a fixed wait window.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The configured wait window.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule a recheck job for a key after the wait window.
    ///
    /// Returns `false` without scheduling when a live job already exists for
    /// the key. The in-flight guard makes that unreachable in normal
    /// operation; refusing here keeps the one-job-per-id invariant even if a
    /// caller misuses the scheduler.
    pub fn schedule<F>(&self, key: GuardKey, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = jobs.get(&key) {
            if !existing.is_finished() {
                warn!(key = %key, "recheck already pending, refusing a second timer");
                return false;
            }
        }

        let delay = self.delay;
        let jobs_ref = Arc::clone(&self.jobs);
        let cleanup_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
            jobs_ref
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&cleanup_key);
        });
        jobs.insert(key, handle);
        true
    }

    /// Number of jobs still waiting or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}
