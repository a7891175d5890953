//! Cross-service event contracts
//!
//! One tagged union per topic family, decoded once at the consumer
//! boundary so handlers receive strongly-typed payloads. Transport is
//! out of scope; the payload shape is the contract.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ledger::{LedgerOperation, OwnerType};
use crate::domain::remote_entity::EntityKind;
use crate::domain::subscription::SubscriptionStatus;

/// Events carried on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Entity created at its owning service
    EntityCreated(EntityEventPayload),
    /// Entity updated at its owning service
    EntityUpdated(EntityEventPayload),
    /// Consumer requests an authoritative entity snapshot
    EntitySyncRequest(SyncRequestEvent),
    /// Owning service answers a sync request
    EntitySyncResponse(SyncResponseEvent),
    /// Subscription lifecycle transition
    SubscriptionChanged(SubscriptionChangedEvent),
    /// Time-based expiry applied by the scheduler
    SubscriptionExpired(SubscriptionChangedEvent),
    /// Tokens credited
    TokenPurchase(TokenBalanceEvent),
    /// Tokens debited
    TokenUsage(TokenBalanceEvent),
    /// Low-balance threshold crossed
    TokenAlert(TokenBalanceEvent),
}

impl Event {
    /// Topic-style event name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::EntityCreated(_) => "entity_created",
            Event::EntityUpdated(_) => "entity_updated",
            Event::EntitySyncRequest(_) => "entity_sync_request",
            Event::EntitySyncResponse(_) => "entity_sync_response",
            Event::SubscriptionChanged(_) => "subscription_changed",
            Event::SubscriptionExpired(_) => "subscription_expired",
            Event::TokenPurchase(_) => "token_purchase",
            Event::TokenUsage(_) => "token_usage",
            Event::TokenAlert(_) => "token_alert",
        }
    }

    /// Owner the event concerns, when it has one
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            Event::EntityCreated(_) | Event::EntityUpdated(_) => None,
            Event::EntitySyncRequest(_) | Event::EntitySyncResponse(_) => None,
            Event::SubscriptionChanged(e) | Event::SubscriptionExpired(e) => Some(&e.owner_id),
            Event::TokenPurchase(e) | Event::TokenUsage(e) | Event::TokenAlert(e) => {
                Some(&e.owner_id)
            }
        }
    }
}

/// `EntityCreated` / `EntityUpdated` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEventPayload {
    pub id: String,
    pub kind: EntityKind,
    /// Source-owned fields, decoded by the owning domain
    pub fields: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// `EntitySyncRequest` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequestEvent {
    pub request_id: Uuid,
    pub target_id: String,
    pub target_kind: EntityKind,
    /// Service identity of the requester
    pub requested_by: String,
    pub timestamp: DateTime<Utc>,
}

/// `EntitySyncResponse` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponseEvent {
    pub request_id: Uuid,
    pub target_id: String,
    pub target_kind: EntityKind,
    pub found: bool,
    pub entity: Option<serde_json::Value>,
    /// Update timestamp at the source, when found
    pub source_version: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

/// `SubscriptionChanged` / `SubscriptionExpired` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionChangedEvent {
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub previous_status: Option<SubscriptionStatus>,
    pub new_status: SubscriptionStatus,
    pub previous_tier: Option<String>,
    pub tier_id: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// "system" for scheduler-driven changes
    pub changed_by: String,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// `TokenPurchase` / `TokenUsage` / `TokenAlert` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalanceEvent {
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub amount: Decimal,
    pub resulting_balance: Decimal,
    pub operation: LedgerOperation,
    pub timestamp: DateTime<Utc>,
}
