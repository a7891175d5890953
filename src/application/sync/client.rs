//! Sync protocol client
//!
//! Keeps the local cache of remotely-owned entities populated: consumes
//! push updates from the owning service, and on cache-miss emits a
//! correlated sync request without ever blocking the caller.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, info, warn};

use super::requests::{PendingSyncs, SyncOutcome};
use crate::domain::events::types::{EntityEventPayload, SyncResponseEvent};
use crate::domain::{
    CachedEntity, DomainError, DomainResult, EntityKind, Event, RepositoryProvider, SyncState,
    UnavailableCause,
};
use crate::messaging::SharedEventBus;

/// Sync client configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Service identity stamped on outgoing requests (`requested_by`)
    pub service_name: String,
    /// Entity kinds this service consumes; events for other kinds are
    /// skipped, never materialized
    pub accepted_kinds: Vec<EntityKind>,
    /// How long an outstanding request stays live before re-request
    pub request_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            service_name: "platform-sync".to_string(),
            accepted_kinds: vec![EntityKind::Institution, EntityKind::User],
            request_ttl: Duration::from_secs(30),
        }
    }
}

/// Client side of the entity sync protocol
pub struct SyncService {
    repos: Arc<dyn RepositoryProvider>,
    bus: SharedEventBus,
    pending: PendingSyncs,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(repos: Arc<dyn RepositoryProvider>, bus: SharedEventBus, config: SyncConfig) -> Self {
        let pending = PendingSyncs::new(config.request_ttl);
        Self {
            repos,
            bus,
            pending,
            config,
        }
    }

    /// Resolve an entity from the local cache, requesting a sync on miss.
    ///
    /// Never blocks: a miss returns `EntityUnavailable` with a retryable
    /// `Syncing` cause after emitting the request. A confirmed-absent
    /// entity returns a non-retryable error and emits nothing.
    pub async fn get(&self, kind: EntityKind, id: &str) -> DomainResult<CachedEntity> {
        if let Some(entity) = self.repos.entities().find(kind, id).await? {
            match entity.sync_state {
                SyncState::Synced => return Ok(entity),
                SyncState::Absent => {
                    return Err(DomainError::EntityUnavailable {
                        id: id.to_string(),
                        cause: UnavailableCause::NotProvisioned,
                    });
                }
                SyncState::Pending if self.pending.is_outstanding(kind, id) => {
                    return Err(DomainError::EntityUnavailable {
                        id: id.to_string(),
                        cause: UnavailableCause::Syncing,
                    });
                }
                // Pending past TTL, or explicitly stale: re-request
                SyncState::Pending | SyncState::Stale => {}
            }
        }

        self.request_sync(kind, id).await?;
        Err(DomainError::EntityUnavailable {
            id: id.to_string(),
            cause: UnavailableCause::Syncing,
        })
    }

    /// Resolve an entity, suspending until a response arrives or the
    /// deadline fires. The deadline releases the caller with `SyncTimeout`
    /// rather than hanging forever.
    pub async fn await_entity(
        &self,
        kind: EntityKind,
        id: &str,
        timeout: Duration,
    ) -> DomainResult<CachedEntity> {
        match self.get(kind, id).await {
            Ok(entity) => return Ok(entity),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(_) => {}
        }

        let Some(receiver) = self.pending.add_waiter(kind, id) else {
            // Resolved between get() and here
            return self.get(kind, id).await;
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(SyncOutcome::Found(entity))) => Ok(entity),
            Ok(Ok(SyncOutcome::Absent)) => Err(DomainError::EntityUnavailable {
                id: id.to_string(),
                cause: UnavailableCause::NotProvisioned,
            }),
            // Request retired without an outcome (TTL purge)
            Ok(Err(_)) => Err(DomainError::SyncTimeout(id.to_string())),
            Err(_) => Err(DomainError::SyncTimeout(id.to_string())),
        }
    }

    /// Mark a cached entity eligible for forced re-request.
    pub async fn mark_stale(&self, kind: EntityKind, id: &str) -> DomainResult<()> {
        if let Some(mut entity) = self.repos.entities().find(kind, id).await? {
            entity.mark_stale();
            self.repos.entities().upsert(entity).await?;
        }
        Ok(())
    }

    /// Apply an unsolicited `EntityCreated` / `EntityUpdated` push.
    ///
    /// Updates with an older or equal `source_version` than the cached
    /// entry are dropped; this doubles as replay dedup under
    /// at-least-once delivery.
    pub async fn handle_entity_event(&self, payload: &EntityEventPayload) -> DomainResult<()> {
        if !self.accepts(payload.kind) {
            self.skip_foreign(payload.kind, &payload.id);
            return Ok(());
        }

        if let Some(existing) = self.repos.entities().find(payload.kind, &payload.id).await? {
            if !existing.accepts_version(payload.timestamp) {
                debug!(
                    kind = %payload.kind,
                    id = %payload.id,
                    cached_version = %existing.source_version,
                    event_version = %payload.timestamp,
                    "Rejecting out-of-order entity update"
                );
                counter!("sync_stale_updates_total").increment(1);
                return Ok(());
            }
        }

        let entity = CachedEntity::synced(
            &payload.id,
            payload.kind,
            payload.timestamp,
            payload.fields.clone(),
        );
        self.repos.entities().upsert(entity.clone()).await?;
        debug!(kind = %payload.kind, id = %payload.id, "Entity cache updated from push event");

        // A push update satisfies any callers waiting on a sync request
        self.pending.resolve(payload.kind, &payload.id, SyncOutcome::Found(entity));
        Ok(())
    }

    /// Apply a correlated `EntitySyncResponse`.
    pub async fn handle_sync_response(&self, response: &SyncResponseEvent) -> DomainResult<()> {
        if !self.accepts(response.target_kind) {
            self.skip_foreign(response.target_kind, &response.target_id);
            return Ok(());
        }

        let kind = response.target_kind;
        let id = response.target_id.as_str();

        if !response.found {
            let mut entry = match self.repos.entities().find(kind, id).await? {
                Some(existing) => existing,
                None => CachedEntity::pending(id, kind),
            };
            entry.mark_absent();
            self.repos.entities().upsert(entry).await?;
            info!(kind = %kind, id, "Entity confirmed absent upstream");
            self.pending.resolve(kind, id, SyncOutcome::Absent);
            return Ok(());
        }

        let Some(fields) = response.entity.clone() else {
            return Err(DomainError::Validation(format!(
                "sync response for {} has found=true but no entity",
                id
            )));
        };
        let version = response.source_version.unwrap_or(response.timestamp);

        if let Some(existing) = self.repos.entities().find(kind, id).await? {
            if existing.sync_state == SyncState::Synced && !existing.accepts_version(version) {
                // A newer push already landed; keep it and satisfy waiters
                counter!("sync_stale_updates_total").increment(1);
                self.pending.resolve(kind, id, SyncOutcome::Found(existing));
                return Ok(());
            }
        }

        let entity = CachedEntity::synced(id, kind, version, fields);
        self.repos.entities().upsert(entity.clone()).await?;
        debug!(kind = %kind, id, request_id = %response.request_id, "Sync response applied");
        self.pending.resolve(kind, id, SyncOutcome::Found(entity));
        Ok(())
    }

    /// Drop pending requests past their TTL.
    pub fn purge_lapsed_requests(&self) {
        self.pending.purge_lapsed();
    }

    pub fn outstanding_requests(&self) -> usize {
        self.pending.outstanding_count()
    }

    async fn request_sync(&self, kind: EntityKind, id: &str) -> DomainResult<()> {
        let entry = match self.repos.entities().find(kind, id).await? {
            // Lost a race with a concurrent update; nothing to request
            Some(existing) if existing.sync_state == SyncState::Synced => return Ok(()),
            Some(mut existing) => {
                existing.sync_state = SyncState::Pending;
                existing
            }
            None => CachedEntity::pending(id, kind),
        };
        self.repos.entities().upsert(entry).await?;

        if let Some(request) = self.pending.register(kind, id, &self.config.service_name) {
            info!(
                kind = %kind,
                id,
                request_id = %request.request_id,
                "Cache miss, requesting entity from source of record"
            );
            self.bus.publish(Event::EntitySyncRequest(request));
        }
        Ok(())
    }

    fn accepts(&self, kind: EntityKind) -> bool {
        self.config.accepted_kinds.contains(&kind)
    }

    fn skip_foreign(&self, kind: EntityKind, id: &str) {
        warn!(kind = %kind, id, "Skipping event for entity kind outside this service's domain");
        counter!("sync_foreign_kind_skipped_total").increment(1);
    }
}
