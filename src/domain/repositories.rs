//! Unified repository provider
//!
//! One provider holds the store implementations and exposes per-aggregate
//! accessors. Services receive an `Arc<dyn RepositoryProvider>` so the
//! concrete backend is chosen once, at composition time.

use super::ledger::LedgerRepository;
use super::remote_entity::EntityCacheRepository;
use super::subscription::SubscriptionRepository;

pub trait RepositoryProvider: Send + Sync {
    fn ledgers(&self) -> &dyn LedgerRepository;
    fn subscriptions(&self) -> &dyn SubscriptionRepository;
    fn entities(&self) -> &dyn EntityCacheRepository;
}
