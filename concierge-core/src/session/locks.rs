//! Per-guest mutual exclusion.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entries kept before idle locks are swept.
const PRUNE_THRESHOLD: usize = 1024;

/// Guard held for the duration of one guest's read-modify-write.
pub type GuestGuard = OwnedMutexGuard<()>;

/// One async mutex per guest id, created on first use.
#[derive(Debug, Default)]
pub struct GuestLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl GuestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `guest_id`.
    pub async fn lock(&self, guest_id: &str) -> GuestGuard {
        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune_idle();
        }

        let mutex = self
            .locks
            .entry(guest_id.to_string())
            .or_default()
            .value()
            .clone();
        mutex.lock_owned().await
    }

    /// Drop locks nobody holds or waits on.
    pub fn prune_idle(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
