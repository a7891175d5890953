//! Per-owner serialization locks
//!
//! Ledger and subscription mutations for the same owner must serialize;
//! operations on different owners proceed independently. `OwnerLocks`
//! hands out one async mutex per owner id, created on first use.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct OwnerLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for one owner. The guard releases on drop.
    pub async fn acquire(&self, owner_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
