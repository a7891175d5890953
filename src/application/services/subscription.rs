//! Subscription lifecycle service
//!
//! Single mutation path for the subscription store. Enforces the
//! single-active-per-owner invariant under the owner lock and publishes
//! a transition event for every applied change.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::domain::events::types::SubscriptionChangedEvent;
use crate::domain::{
    ChangedBy, DomainError, DomainResult, Event, OwnerType, RepositoryProvider, Subscription,
    SubscriptionStatus,
};
use crate::messaging::SharedEventBus;
use crate::shared::OwnerLocks;

pub struct SubscriptionService {
    repos: Arc<dyn RepositoryProvider>,
    bus: SharedEventBus,
    locks: Arc<OwnerLocks>,
}

impl SubscriptionService {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        bus: SharedEventBus,
        locks: Arc<OwnerLocks>,
    ) -> Self {
        Self { repos, bus, locks }
    }

    /// Activate a tier for an owner.
    ///
    /// Supersedes any currently-active subscription (old record goes
    /// `Inactive` with `end_date = now`) and creates the new `Active`
    /// record, as one unit under the owner lock.
    pub async fn activate(
        &self,
        owner_id: &str,
        owner_type: OwnerType,
        tier_id: &str,
        end_date: Option<chrono::DateTime<Utc>>,
        changed_by: &ChangedBy,
    ) -> DomainResult<Subscription> {
        let _guard = self.locks.acquire(owner_id).await;

        let mut previous_tier = None;
        if let Some(mut current) = self
            .repos
            .subscriptions()
            .find_active_for_owner(owner_id)
            .await?
        {
            let previous_status = current.transition(SubscriptionStatus::Inactive, changed_by)?;
            current.end_date = Some(Utc::now());
            previous_tier = Some(current.tier_id.clone());
            self.repos.subscriptions().update(current.clone()).await?;
            self.publish_changed(
                &current,
                Some(previous_status),
                None,
                changed_by,
                Some("superseded".to_string()),
            );
        }

        let subscription = Subscription::new(owner_id, owner_type, tier_id, end_date);
        self.repos.subscriptions().save(subscription.clone()).await?;

        info!(
            owner_id,
            tier_id,
            subscription_id = %subscription.id,
            previous_tier = ?previous_tier,
            "Subscription activated"
        );
        self.publish_changed(&subscription, None, previous_tier, changed_by, None);

        Ok(subscription)
    }

    /// Deactivate the owner's active subscription (explicit cancellation
    /// by the owner, not the administrative `Cancelled` state).
    pub async fn deactivate(
        &self,
        owner_id: &str,
        changed_by: &ChangedBy,
        reason: Option<String>,
    ) -> DomainResult<Subscription> {
        let _guard = self.locks.acquire(owner_id).await;

        let mut current = self
            .repos
            .subscriptions()
            .find_active_for_owner(owner_id)
            .await?
            .ok_or(DomainError::NotFound {
                entity: "subscription",
                field: "owner_id",
                value: owner_id.to_string(),
            })?;

        let previous_status = current.transition(SubscriptionStatus::Inactive, changed_by)?;
        current.end_date = Some(Utc::now());
        self.repos.subscriptions().update(current.clone()).await?;

        info!(owner_id, subscription_id = %current.id, "Subscription deactivated");
        self.publish_changed(&current, Some(previous_status), None, changed_by, reason);

        Ok(current)
    }

    /// Administrative suspension.
    pub async fn suspend(
        &self,
        subscription_id: Uuid,
        changed_by: &ChangedBy,
        reason: Option<String>,
    ) -> DomainResult<Subscription> {
        self.apply_transition(subscription_id, SubscriptionStatus::Suspended, changed_by, reason)
            .await
    }

    /// Administrative cancellation. Terminal: reactivation requires a new
    /// record via `activate`.
    pub async fn cancel(
        &self,
        subscription_id: Uuid,
        changed_by: &ChangedBy,
        reason: Option<String>,
    ) -> DomainResult<Subscription> {
        self.apply_transition(subscription_id, SubscriptionStatus::Cancelled, changed_by, reason)
            .await
    }

    /// Administrative reinstatement of a suspended subscription.
    /// Re-checks the single-active invariant before applying.
    pub async fn reinstate(
        &self,
        subscription_id: Uuid,
        changed_by: &ChangedBy,
    ) -> DomainResult<Subscription> {
        let subscription = self.require(subscription_id).await?;
        let _guard = self.locks.acquire(&subscription.owner_id).await;

        // Re-read under the lock
        let mut subscription = self.require(subscription_id).await?;
        if let Some(active) = self
            .repos
            .subscriptions()
            .find_active_for_owner(&subscription.owner_id)
            .await?
        {
            if active.id != subscription.id {
                return Err(DomainError::Validation(format!(
                    "owner {} already has an active subscription",
                    subscription.owner_id
                )));
            }
        }

        let previous_status = subscription.transition(SubscriptionStatus::Active, changed_by)?;
        self.repos.subscriptions().update(subscription.clone()).await?;

        info!(subscription_id = %subscription.id, owner_id = %subscription.owner_id, "Subscription reinstated");
        self.publish_changed(&subscription, Some(previous_status), None, changed_by, None);

        Ok(subscription)
    }

    pub async fn active_subscription(&self, owner_id: &str) -> DomainResult<Option<Subscription>> {
        self.repos.subscriptions().find_active_for_owner(owner_id).await
    }

    pub async fn subscriptions_for(&self, owner_id: &str) -> DomainResult<Vec<Subscription>> {
        self.repos.subscriptions().find_by_owner(owner_id).await
    }

    /// Active subscriptions due for time-based expiry.
    pub async fn find_due_for_expiry(&self) -> DomainResult<Vec<Subscription>> {
        self.repos.subscriptions().find_expired_active(Utc::now()).await
    }

    /// Expire one subscription if it is still active and past its end
    /// date. Returns `false` when another sweep (or instance) got there
    /// first, making repeated sweeps a no-op.
    pub async fn expire_one(&self, subscription_id: Uuid) -> DomainResult<bool> {
        let Some(subscription) = self.repos.subscriptions().find_by_id(subscription_id).await?
        else {
            return Ok(false);
        };
        let _guard = self.locks.acquire(&subscription.owner_id).await;

        // Re-read under the lock: the record may have transitioned since
        let Some(mut subscription) = self.repos.subscriptions().find_by_id(subscription_id).await?
        else {
            return Ok(false);
        };
        if !subscription.is_due_for_expiry(Utc::now()) {
            return Ok(false);
        }

        let previous_status =
            subscription.transition(SubscriptionStatus::Expired, &ChangedBy::System)?;
        self.repos.subscriptions().update(subscription.clone()).await?;

        info!(
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            end_date = ?subscription.end_date,
            "Subscription expired"
        );
        self.bus.publish(Event::SubscriptionExpired(self.changed_event(
            &subscription,
            Some(previous_status),
            None,
            &ChangedBy::System,
            Some("validity window elapsed".to_string()),
        )));

        Ok(true)
    }

    async fn apply_transition(
        &self,
        subscription_id: Uuid,
        to: SubscriptionStatus,
        changed_by: &ChangedBy,
        reason: Option<String>,
    ) -> DomainResult<Subscription> {
        let subscription = self.require(subscription_id).await?;
        let _guard = self.locks.acquire(&subscription.owner_id).await;

        let mut subscription = self.require(subscription_id).await?;
        let previous_status = subscription.transition(to, changed_by)?;
        if to == SubscriptionStatus::Cancelled && subscription.end_date.is_none() {
            subscription.end_date = Some(Utc::now());
        }
        self.repos.subscriptions().update(subscription.clone()).await?;

        info!(
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            from = %previous_status,
            to = %to,
            changed_by = %changed_by,
            "Subscription transition applied"
        );
        self.publish_changed(&subscription, Some(previous_status), None, changed_by, reason);

        Ok(subscription)
    }

    async fn require(&self, subscription_id: Uuid) -> DomainResult<Subscription> {
        self.repos
            .subscriptions()
            .find_by_id(subscription_id)
            .await?
            .ok_or(DomainError::NotFound {
                entity: "subscription",
                field: "id",
                value: subscription_id.to_string(),
            })
    }

    fn publish_changed(
        &self,
        subscription: &Subscription,
        previous_status: Option<SubscriptionStatus>,
        previous_tier: Option<String>,
        changed_by: &ChangedBy,
        reason: Option<String>,
    ) {
        self.bus.publish(Event::SubscriptionChanged(self.changed_event(
            subscription,
            previous_status,
            previous_tier,
            changed_by,
            reason,
        )));
    }

    fn changed_event(
        &self,
        subscription: &Subscription,
        previous_status: Option<SubscriptionStatus>,
        previous_tier: Option<String>,
        changed_by: &ChangedBy,
        reason: Option<String>,
    ) -> SubscriptionChangedEvent {
        SubscriptionChangedEvent {
            owner_id: subscription.owner_id.clone(),
            owner_type: subscription.owner_type,
            previous_status,
            new_status: subscription.status,
            previous_tier,
            tier_id: subscription.tier_id.clone(),
            start_date: Some(subscription.start_date),
            end_date: subscription.end_date,
            changed_by: changed_by.to_string(),
            reason,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::memory::InMemoryRepositoryProvider;
    use crate::messaging::create_event_bus;
    use chrono::Duration;

    fn service() -> SubscriptionService {
        SubscriptionService::new(
            Arc::new(InMemoryRepositoryProvider::new()),
            create_event_bus(),
            Arc::new(OwnerLocks::new()),
        )
    }

    fn user() -> ChangedBy {
        ChangedBy::User("U1".into())
    }

    fn admin() -> ChangedBy {
        ChangedBy::Admin("A1".into())
    }

    #[tokio::test]
    async fn activation_supersedes_previous() {
        let service = service();

        let first = service
            .activate("O1", OwnerType::Business, "tier-basic", None, &user())
            .await
            .unwrap();
        let second = service
            .activate("O1", OwnerType::Business, "tier-pro", None, &user())
            .await
            .unwrap();
        assert_ne!(first.id, second.id);

        let all = service.subscriptions_for("O1").await.unwrap();
        let active: Vec<_> = all.iter().filter(|s| s.is_active()).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].tier_id, "tier-pro");

        let superseded = all.iter().find(|s| s.id == first.id).unwrap();
        assert_eq!(superseded.status, SubscriptionStatus::Inactive);
        assert!(superseded.end_date.is_some());
    }

    #[tokio::test]
    async fn deactivate_requires_active_subscription() {
        let service = service();
        let err = service.deactivate("O1", &user(), None).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cancelled_subscription_stays_terminal() {
        let service = service();
        let sub = service
            .activate("O1", OwnerType::User, "tier-basic", None, &user())
            .await
            .unwrap();

        service.cancel(sub.id, &admin(), None).await.unwrap();
        let err = service.reinstate(sub.id, &admin()).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));

        // A fresh record is the only path back
        let renewed = service
            .activate("O1", OwnerType::User, "tier-basic", None, &user())
            .await
            .unwrap();
        assert!(renewed.is_active());
    }

    #[tokio::test]
    async fn reinstate_rechecks_single_active() {
        let service = service();
        let first = service
            .activate("O1", OwnerType::User, "tier-basic", None, &user())
            .await
            .unwrap();
        service.suspend(first.id, &admin(), None).await.unwrap();

        // Owner activates a new tier while the old record is suspended
        service
            .activate("O1", OwnerType::User, "tier-pro", None, &user())
            .await
            .unwrap();

        let err = service.reinstate(first.id, &admin()).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn expire_one_is_idempotent() {
        let service = service();
        let sub = service
            .activate(
                "O1",
                OwnerType::User,
                "tier-basic",
                Some(Utc::now() - Duration::hours(1)),
                &user(),
            )
            .await
            .unwrap();

        assert!(service.expire_one(sub.id).await.unwrap());
        assert!(!service.expire_one(sub.id).await.unwrap());

        let all = service.subscriptions_for("O1").await.unwrap();
        assert_eq!(all[0].status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn expiry_event_attributed_to_system() {
        let bus = create_event_bus();
        let mut subscriber = bus.subscribe();
        let service = SubscriptionService::new(
            Arc::new(InMemoryRepositoryProvider::new()),
            bus,
            Arc::new(OwnerLocks::new()),
        );

        let sub = service
            .activate(
                "O1",
                OwnerType::User,
                "tier-basic",
                Some(Utc::now() - Duration::hours(1)),
                &user(),
            )
            .await
            .unwrap();
        service.expire_one(sub.id).await.unwrap();

        let mut expired_events = 0;
        while let Ok(Some(event)) = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            subscriber.recv(),
        )
        .await
        {
            if let Event::SubscriptionExpired(payload) = event {
                assert_eq!(payload.changed_by, "system");
                assert_eq!(payload.new_status, SubscriptionStatus::Expired);
                expired_events += 1;
            }
        }
        assert_eq!(expired_events, 1);
    }
}
