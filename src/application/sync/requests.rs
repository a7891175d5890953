//! In-memory tracking of outstanding sync requests
//!
//! A pending entry exists while a correlated `EntitySyncRequest` is in
//! flight. Entries are retired by a matching response or by TTL lapse;
//! nothing is persisted.

use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::events::types::SyncRequestEvent;
use crate::domain::{CachedEntity, EntityKind};

/// Resolution delivered to callers parked on a sync request
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Found(CachedEntity),
    /// Source of record confirmed the entity does not exist
    Absent,
}

struct PendingSync {
    request_id: Uuid,
    deadline: Instant,
    waiters: Vec<oneshot::Sender<SyncOutcome>>,
}

/// Tracker for outstanding sync requests, keyed by `(kind, target_id)`
pub struct PendingSyncs {
    entries: DashMap<(EntityKind, String), PendingSync>,
    ttl: Duration,
}

impl PendingSyncs {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Whether a live (not past TTL) request exists for this target.
    /// Lapsed entries are retired on access, dropping their waiters.
    pub fn is_outstanding(&self, kind: EntityKind, id: &str) -> bool {
        let key = (kind, id.to_string());
        let lapsed = match self.entries.get(&key) {
            Some(entry) => entry.deadline <= Instant::now(),
            None => return false,
        };
        if lapsed {
            self.entries.remove(&key);
            return false;
        }
        true
    }

    /// Ensure an outstanding request exists for this target.
    ///
    /// Returns the request event to publish when a new request was issued;
    /// `None` when a live request is already in flight. Reissuing over a
    /// lapsed entry keeps its waiters attached to the new request.
    pub fn register(
        &self,
        kind: EntityKind,
        id: &str,
        requested_by: &str,
    ) -> Option<SyncRequestEvent> {
        let now = Instant::now();
        let request_id = Uuid::new_v4();

        match self.entries.entry((kind, id.to_string())) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().deadline > now {
                    return None;
                }
                let entry = occupied.get_mut();
                entry.request_id = request_id;
                entry.deadline = now + self.ttl;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingSync {
                    request_id,
                    deadline: now + self.ttl,
                    waiters: Vec::new(),
                });
            }
        }

        Some(SyncRequestEvent {
            request_id,
            target_id: id.to_string(),
            target_kind: kind,
            requested_by: requested_by.to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Attach a waiter to the outstanding request for this target.
    /// Returns `None` when no request is in flight.
    pub fn add_waiter(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Option<oneshot::Receiver<SyncOutcome>> {
        let mut entry = self.entries.get_mut(&(kind, id.to_string()))?;
        let (tx, rx) = oneshot::channel();
        entry.waiters.push(tx);
        Some(rx)
    }

    /// Retire the request for this target, waking every waiter.
    pub fn resolve(&self, kind: EntityKind, id: &str, outcome: SyncOutcome) {
        if let Some((_, entry)) = self.entries.remove(&(kind, id.to_string())) {
            for waiter in entry.waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    /// Drop entries past their TTL. Parked waiters see a closed channel,
    /// which callers surface as a timeout.
    pub fn purge_lapsed(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.deadline > now);
    }

    pub fn outstanding_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[test]
    fn register_once_per_live_request() {
        let pending = PendingSyncs::new(TTL);

        let first = pending.register(EntityKind::User, "E1", "svc");
        assert!(first.is_some());
        // Second call while the first is live: no duplicate emission
        assert!(pending.register(EntityKind::User, "E1", "svc").is_none());
        assert!(pending.is_outstanding(EntityKind::User, "E1"));
    }

    #[test]
    fn lapsed_request_is_reissued() {
        let pending = PendingSyncs::new(Duration::ZERO);

        let first = pending.register(EntityKind::User, "E1", "svc").unwrap();
        let second = pending.register(EntityKind::User, "E1", "svc").unwrap();
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn resolve_wakes_waiters() {
        let pending = PendingSyncs::new(TTL);
        pending.register(EntityKind::User, "E1", "svc");

        let rx = pending.add_waiter(EntityKind::User, "E1").unwrap();
        pending.resolve(EntityKind::User, "E1", SyncOutcome::Absent);

        assert!(matches!(rx.await.unwrap(), SyncOutcome::Absent));
        assert!(!pending.is_outstanding(EntityKind::User, "E1"));
    }

    #[test]
    fn waiter_requires_outstanding_request() {
        let pending = PendingSyncs::new(TTL);
        assert!(pending.add_waiter(EntityKind::User, "E1").is_none());
    }

    #[tokio::test]
    async fn purge_closes_waiter_channels() {
        let pending = PendingSyncs::new(Duration::ZERO);
        pending.register(EntityKind::User, "E1", "svc");
        let rx = pending.add_waiter(EntityKind::User, "E1").unwrap();

        pending.purge_lapsed();
        assert_eq!(pending.outstanding_count(), 0);
        assert!(rx.await.is_err());
    }

    #[test]
    fn kinds_are_tracked_separately() {
        let pending = PendingSyncs::new(TTL);
        pending.register(EntityKind::User, "E1", "svc");
        assert!(!pending.is_outstanding(EntityKind::Institution, "E1"));
    }
}
