//! # Platform Sync Core
//!
//! Cross-service entity, subscription and token synchronization core:
//! each service keeps a locally-cached, eventually-consistent copy of
//! entities owned elsewhere, a shared-liability token ledger that never
//! goes negative under concurrent debits, and a subscription lifecycle
//! driven both by user action and by time-based expiry.
//!
//! ## Architecture
//!
//! - **domain**: entities, status enums, repository traits, typed events
//! - **application**: ledger engine, subscription state machine, expiry
//!   scheduler, sync protocol client, revocation guard
//! - **infrastructure**: in-memory stores, revocation authority client
//! - **messaging**: explicit event bus handle and the consumer task
//! - **shared**: shutdown coordination, per-owner locks, retry
//!
//! Concrete implementations are wired once, in the composition root;
//! services depend only on the domain traits and the bus handle.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod messaging;
pub mod shared;

pub use config::{default_config_path, AppConfig};

// Re-export the service layer for easy access
pub use application::services::{
    start_subscription_expiry_task, AccessKind, GuardConfig, LedgerConfig, PricingTable,
    RevocationGuard, RevocationPolicy, SubscriptionService, TokenLedgerService,
};
pub use application::sync::{SyncConfig, SyncService};

// Re-export storage and messaging handles
pub use infrastructure::{HttpRevocationAuthority, InMemoryRepositoryProvider};
pub use messaging::{create_event_bus, EventBus, EventConsumer, SharedEventBus};
