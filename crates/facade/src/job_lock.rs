//! A named lock per maintenance job, so consolidation and the maintenance
//! runner never overlap with themselves. A second caller for an already
//! running job name is rejected rather than queued, since a queued run
//! would just re-scan state the first run already changed.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use sa_domain::error::{ErrorKind, MemoryError, Result};

#[derive(Default)]
pub struct JobLocks {
    running: Arc<Mutex<HashSet<String>>>,
}

/// Held for the lifetime of a running job; dropping it frees the name for
/// the next caller.
pub struct JobGuard {
    name: String,
    running: Arc<Mutex<HashSet<String>>>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.running.lock().remove(&self.name);
    }
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the named job. Returns a `ServiceFailed` error when
    /// another caller already holds it.
    pub fn try_acquire(&self, name: &str) -> Result<JobGuard> {
        let mut running = self.running.lock();
        if !running.insert(name.to_string()) {
            return Err(MemoryError::new(
                ErrorKind::ServiceFailed,
                format!("maintenance job '{name}' is already running"),
            ));
        }
        Ok(JobGuard {
            name: name.to_string(),
            running: self.running.clone(),
        })
    }
}
