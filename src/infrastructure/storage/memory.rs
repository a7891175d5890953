//! In-memory repository implementations
//!
//! DashMap-backed stores for development and testing. A relational
//! backend plugs in behind the same repository traits without touching
//! the services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::ledger::{LedgerRepository, TokenLedger};
use crate::domain::remote_entity::{CachedEntity, EntityCacheRepository, EntityKind};
use crate::domain::subscription::{Subscription, SubscriptionRepository};
use crate::domain::{DomainError, DomainResult, RepositoryProvider};

#[derive(Default)]
pub struct InMemoryLedgerRepository {
    ledgers: DashMap<String, TokenLedger>,
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn find_by_owner(&self, owner_id: &str) -> DomainResult<Option<TokenLedger>> {
        Ok(self.ledgers.get(owner_id).map(|l| l.clone()))
    }

    async fn save(&self, ledger: TokenLedger) -> DomainResult<()> {
        self.ledgers.insert(ledger.owner_id.clone(), ledger);
        Ok(())
    }

    async fn find_all(&self) -> DomainResult<Vec<TokenLedger>> {
        Ok(self.ledgers.iter().map(|e| e.value().clone()).collect())
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: DashMap<Uuid, Subscription>,
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn save(&self, subscription: Subscription) -> DomainResult<()> {
        self.subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Subscription>> {
        Ok(self.subscriptions.get(&id).map(|s| s.clone()))
    }

    async fn find_by_owner(&self, owner_id: &str) -> DomainResult<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|e| e.value().owner_id == owner_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn find_active_for_owner(&self, owner_id: &str) -> DomainResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .find(|e| e.value().owner_id == owner_id && e.value().is_active())
            .map(|e| e.value().clone()))
    }

    async fn find_expired_active(&self, now: DateTime<Utc>) -> DomainResult<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|e| e.value().is_due_for_expiry(now))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update(&self, subscription: Subscription) -> DomainResult<()> {
        if !self.subscriptions.contains_key(&subscription.id) {
            return Err(DomainError::NotFound {
                entity: "subscription",
                field: "id",
                value: subscription.id.to_string(),
            });
        }
        self.subscriptions.insert(subscription.id, subscription);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEntityCacheRepository {
    entities: DashMap<(EntityKind, String), CachedEntity>,
}

#[async_trait]
impl EntityCacheRepository for InMemoryEntityCacheRepository {
    async fn find(&self, kind: EntityKind, id: &str) -> DomainResult<Option<CachedEntity>> {
        Ok(self
            .entities
            .get(&(kind, id.to_string()))
            .map(|e| e.clone()))
    }

    async fn upsert(&self, entity: CachedEntity) -> DomainResult<()> {
        self.entities
            .insert((entity.kind, entity.id.clone()), entity);
        Ok(())
    }

    async fn find_by_kind(&self, kind: EntityKind) -> DomainResult<Vec<CachedEntity>> {
        Ok(self
            .entities
            .iter()
            .filter(|e| e.key().0 == kind)
            .map(|e| e.value().clone())
            .collect())
    }
}

/// Unified in-memory repository provider.
#[derive(Default)]
pub struct InMemoryRepositoryProvider {
    ledgers: InMemoryLedgerRepository,
    subscriptions: InMemorySubscriptionRepository,
    entities: InMemoryEntityCacheRepository,
}

impl InMemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RepositoryProvider for InMemoryRepositoryProvider {
    fn ledgers(&self) -> &dyn LedgerRepository {
        &self.ledgers
    }

    fn subscriptions(&self) -> &dyn SubscriptionRepository {
        &self.subscriptions
    }

    fn entities(&self) -> &dyn EntityCacheRepository {
        &self.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OwnerType;

    #[tokio::test]
    async fn ledger_upsert_roundtrip() {
        let repo = InMemoryLedgerRepository::default();
        assert!(repo.find_by_owner("U1").await.unwrap().is_none());

        repo.save(TokenLedger::new("U1", OwnerType::User)).await.unwrap();
        let found = repo.find_by_owner("U1").await.unwrap().unwrap();
        assert_eq!(found.owner_id, "U1");
    }

    #[tokio::test]
    async fn subscription_update_requires_existing() {
        let repo = InMemorySubscriptionRepository::default();
        let sub = Subscription::new("O1", OwnerType::Business, "tier", None);

        let err = repo.update(sub.clone()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        repo.save(sub.clone()).await.unwrap();
        assert!(repo.update(sub).await.is_ok());
    }

    #[tokio::test]
    async fn entity_cache_keyed_by_kind_and_id() {
        let repo = InMemoryEntityCacheRepository::default();
        repo.upsert(CachedEntity::pending("E1", EntityKind::User))
            .await
            .unwrap();

        assert!(repo.find(EntityKind::User, "E1").await.unwrap().is_some());
        assert!(repo
            .find(EntityKind::Institution, "E1")
            .await
            .unwrap()
            .is_none());
    }
}
