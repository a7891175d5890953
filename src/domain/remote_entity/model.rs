//! Locally-cached mirror of entities owned by a remote service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminator for remotely-owned entity kinds.
///
/// Consumers filter on this: an event for a kind the service does not
/// own locally is skipped, never materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Institution,
    User,
    Subscription,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Institution => write!(f, "institution"),
            Self::User => write!(f, "user"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// Synchronization state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncState {
    /// Up to date with the source of record
    Synced,
    /// A correlated sync request is outstanding
    Pending,
    /// Eligible for forced re-request
    Stale,
    /// Source of record confirmed the entity does not exist
    Absent,
}

/// One cached remote entity, keyed by `(kind, id)`.
///
/// `source_version` is the last-known update timestamp at the source;
/// updates carrying an older or equal version are rejected to tolerate
/// out-of-order and replayed delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntity {
    pub id: String,
    pub kind: EntityKind,
    pub source_version: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub sync_state: SyncState,
    pub updated_at: DateTime<Utc>,
}

impl CachedEntity {
    pub fn synced(
        id: impl Into<String>,
        kind: EntityKind,
        source_version: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            source_version,
            payload,
            sync_state: SyncState::Synced,
            updated_at: Utc::now(),
        }
    }

    /// Placeholder entry recorded while a sync request is in flight.
    pub fn pending(id: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            source_version: DateTime::<Utc>::MIN_UTC,
            payload: serde_json::Value::Null,
            sync_state: SyncState::Pending,
            updated_at: Utc::now(),
        }
    }

    /// Whether an incoming update with `version` supersedes this entry.
    pub fn accepts_version(&self, version: DateTime<Utc>) -> bool {
        version > self.source_version
    }

    pub fn mark_absent(&mut self) {
        self.sync_state = SyncState::Absent;
        self.payload = serde_json::Value::Null;
        self.updated_at = Utc::now();
    }

    pub fn mark_stale(&mut self) {
        self.sync_state = SyncState::Stale;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn pending_entry_accepts_any_real_version() {
        let e = CachedEntity::pending("E1", EntityKind::Institution);
        assert_eq!(e.sync_state, SyncState::Pending);
        assert!(e.accepts_version(Utc::now()));
    }

    #[test]
    fn older_or_equal_version_rejected() {
        let v = Utc::now();
        let e = CachedEntity::synced("E1", EntityKind::User, v, json!({"name": "x"}));
        assert!(!e.accepts_version(v));
        assert!(!e.accepts_version(v - Duration::seconds(10)));
        assert!(e.accepts_version(v + Duration::seconds(10)));
    }

    #[test]
    fn mark_absent_clears_payload() {
        let mut e = CachedEntity::synced("E1", EntityKind::User, Utc::now(), json!({"a": 1}));
        e.mark_absent();
        assert_eq!(e.sync_state, SyncState::Absent);
        assert!(e.payload.is_null());
    }
}
