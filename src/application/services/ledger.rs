//! Token ledger engine
//!
//! Single mutation path for the ledger store. Debit and credit for the
//! same owner serialize on a per-owner lock; a plain read-modify-write
//! here without it would lose updates and let balances go negative under
//! concurrent debits.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::pricing::PricingTable;
use crate::domain::events::types::TokenBalanceEvent;
use crate::domain::{
    DomainError, DomainResult, Event, LedgerEntry, LedgerOperation, OwnerType, RepositoryProvider,
    TokenLedger,
};
use crate::messaging::SharedEventBus;
use crate::shared::OwnerLocks;

/// Ledger engine configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Balance below which a one-shot `TokenAlert` fires
    pub low_balance_threshold: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            low_balance_threshold: Decimal::from(10),
        }
    }
}

/// Service for token balance operations
pub struct TokenLedgerService {
    repos: Arc<dyn RepositoryProvider>,
    bus: SharedEventBus,
    locks: Arc<OwnerLocks>,
    pricing: PricingTable,
    config: LedgerConfig,
}

impl TokenLedgerService {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        bus: SharedEventBus,
        locks: Arc<OwnerLocks>,
        pricing: PricingTable,
        config: LedgerConfig,
    ) -> Self {
        Self {
            repos,
            bus,
            locks,
            pricing,
            config,
        }
    }

    /// Credit tokens, creating the ledger lazily on first credit.
    /// Returns the new balance.
    pub async fn credit(
        &self,
        owner_id: &str,
        owner_type: OwnerType,
        amount: Decimal,
    ) -> DomainResult<Decimal> {
        let _guard = self.locks.acquire(owner_id).await;

        let mut ledger = match self.repos.ledgers().find_by_owner(owner_id).await? {
            Some(ledger) => ledger,
            None => TokenLedger::new(owner_id, owner_type),
        };

        ledger.credit(amount)?;
        let balance = ledger.balance;
        self.repos.ledgers().save(ledger).await?;

        info!(owner_id, amount = %amount, balance = %balance, "Tokens credited");
        self.bus.publish(Event::TokenPurchase(TokenBalanceEvent {
            owner_id: owner_id.to_string(),
            owner_type,
            amount,
            resulting_balance: balance,
            operation: LedgerOperation::Purchase,
            timestamp: Utc::now(),
        }));

        Ok(balance)
    }

    /// Credit the token amount of a catalog package.
    pub async fn purchase_package(
        &self,
        owner_id: &str,
        owner_type: OwnerType,
        package_id: &str,
    ) -> DomainResult<Decimal> {
        let package = self
            .pricing
            .package(package_id)
            .ok_or_else(|| DomainError::NotFound {
                entity: "token package",
                field: "id",
                value: package_id.to_string(),
            })?;
        let tokens = package.tokens;

        info!(owner_id, package_id, tokens = %tokens, "Token package purchase");
        self.credit(owner_id, owner_type, tokens).await
    }

    /// Debit tokens. Rejected wholesale with `InsufficientBalance` when
    /// the amount exceeds the balance: no balance change, no history
    /// entry. Returns the new balance.
    pub async fn debit(
        &self,
        owner_id: &str,
        amount: Decimal,
        reason: &str,
    ) -> DomainResult<Decimal> {
        let _guard = self.locks.acquire(owner_id).await;

        let mut ledger = self
            .repos
            .ledgers()
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(|| DomainError::InsufficientBalance {
                owner_id: owner_id.to_string(),
                requested: amount,
                available: Decimal::ZERO,
            })?;

        let owner_type = ledger.owner_type;
        let balance_before = ledger.balance;
        ledger.debit(amount)?;
        let balance = ledger.balance;
        self.repos.ledgers().save(ledger).await?;

        info!(owner_id, amount = %amount, balance = %balance, reason, "Tokens debited");
        self.bus.publish(Event::TokenUsage(TokenBalanceEvent {
            owner_id: owner_id.to_string(),
            owner_type,
            amount,
            resulting_balance: balance,
            operation: LedgerOperation::Use,
            timestamp: Utc::now(),
        }));

        // One-shot alert on the crossing only, not on every debit below
        // the threshold
        let threshold = self.config.low_balance_threshold;
        if balance_before >= threshold && balance < threshold {
            warn!(owner_id, balance = %balance, threshold = %threshold, "Balance dropped below threshold");
            counter!("ledger_low_balance_alerts_total").increment(1);
            self.bus.publish(Event::TokenAlert(TokenBalanceEvent {
                owner_id: owner_id.to_string(),
                owner_type,
                amount,
                resulting_balance: balance,
                operation: LedgerOperation::Alert,
                timestamp: Utc::now(),
            }));
        }

        Ok(balance)
    }

    /// Latest committed balance; zero for owners with no ledger.
    pub async fn balance_of(&self, owner_id: &str) -> DomainResult<Decimal> {
        Ok(self
            .repos
            .ledgers()
            .find_by_owner(owner_id)
            .await?
            .map(|l| l.balance)
            .unwrap_or(Decimal::ZERO))
    }

    pub async fn history_of(&self, owner_id: &str) -> DomainResult<Vec<LedgerEntry>> {
        Ok(self
            .repos
            .ledgers()
            .find_by_owner(owner_id)
            .await?
            .map(|l| l.history)
            .unwrap_or_default())
    }

    pub async fn ledger_of(&self, owner_id: &str) -> DomainResult<Option<TokenLedger>> {
        self.repos.ledgers().find_by_owner(owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::memory::InMemoryRepositoryProvider;
    use crate::messaging::create_event_bus;

    fn service_with_bus() -> (TokenLedgerService, crate::messaging::EventSubscriber) {
        let bus = create_event_bus();
        let subscriber = bus.subscribe();
        let service = TokenLedgerService::new(
            Arc::new(InMemoryRepositoryProvider::new()),
            bus,
            Arc::new(OwnerLocks::new()),
            PricingTable::default(),
            LedgerConfig::default(),
        );
        (service, subscriber)
    }

    #[tokio::test]
    async fn credit_debit_scenario() {
        let (service, _sub) = service_with_bus();

        assert_eq!(service.balance_of("U1").await.unwrap(), Decimal::ZERO);

        let balance = service
            .credit("U1", OwnerType::User, Decimal::from(100))
            .await
            .unwrap();
        assert_eq!(balance, Decimal::from(100));

        let balance = service.debit("U1", Decimal::from(30), "use").await.unwrap();
        assert_eq!(balance, Decimal::from(70));
        assert_eq!(service.history_of("U1").await.unwrap().len(), 2);

        let err = service
            .debit("U1", Decimal::from(1000), "use")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientBalance { .. }));
        assert_eq!(service.balance_of("U1").await.unwrap(), Decimal::from(70));
        assert_eq!(service.history_of("U1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn debit_unknown_owner_rejected() {
        let (service, _sub) = service_with_bus();
        let err = service
            .debit("ghost", Decimal::from(1), "use")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn package_purchase_credits_catalog_amount() {
        let (service, _sub) = service_with_bus();
        let balance = service
            .purchase_package("B1", OwnerType::Business, "starter")
            .await
            .unwrap();
        assert_eq!(balance, Decimal::from(100));

        let err = service
            .purchase_package("B1", OwnerType::Business, "bogus")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn low_balance_alert_fires_once_per_crossing() {
        let (service, mut subscriber) = service_with_bus();

        service
            .credit("U1", OwnerType::User, Decimal::from(20))
            .await
            .unwrap();
        // 20 -> 8 crosses the default threshold of 10
        service.debit("U1", Decimal::from(12), "use").await.unwrap();
        // Still below threshold: no second alert
        service.debit("U1", Decimal::from(3), "use").await.unwrap();
        service.debit("U1", Decimal::from(2), "use").await.unwrap();

        let mut alerts = 0;
        while let Ok(Some(event)) = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            subscriber.recv(),
        )
        .await
        {
            if matches!(event, Event::TokenAlert(_)) {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn alert_rearms_after_topping_up() {
        let (service, mut subscriber) = service_with_bus();

        service
            .credit("U1", OwnerType::User, Decimal::from(15))
            .await
            .unwrap();
        service.debit("U1", Decimal::from(10), "use").await.unwrap(); // crossing
        service
            .credit("U1", OwnerType::User, Decimal::from(20))
            .await
            .unwrap(); // back above
        service.debit("U1", Decimal::from(20), "use").await.unwrap(); // crossing again

        let mut alerts = 0;
        while let Ok(Some(event)) = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            subscriber.recv(),
        )
        .await
        {
            if matches!(event, Event::TokenAlert(_)) {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 2);
    }

    #[tokio::test]
    async fn usage_events_carry_resulting_balance() {
        let (service, mut subscriber) = service_with_bus();
        service
            .credit("U1", OwnerType::User, Decimal::from(50))
            .await
            .unwrap();
        service.debit("U1", Decimal::from(5), "export").await.unwrap();

        let mut saw_usage = false;
        while let Ok(Some(event)) = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            subscriber.recv(),
        )
        .await
        {
            if let Event::TokenUsage(payload) = event {
                assert_eq!(payload.resulting_balance, Decimal::from(45));
                assert_eq!(payload.operation, LedgerOperation::Use);
                saw_usage = true;
            }
        }
        assert!(saw_usage);
    }
}
