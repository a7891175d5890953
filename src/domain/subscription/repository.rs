//! Subscription repository interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::Subscription;
use crate::domain::DomainResult;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn save(&self, subscription: Subscription) -> DomainResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Subscription>>;
    async fn find_by_owner(&self, owner_id: &str) -> DomainResult<Vec<Subscription>>;
    async fn find_active_for_owner(&self, owner_id: &str) -> DomainResult<Option<Subscription>>;
    /// Active subscriptions whose `end_date` is at or before `now`.
    async fn find_expired_active(&self, now: DateTime<Utc>) -> DomainResult<Vec<Subscription>>;
    async fn update(&self, subscription: Subscription) -> DomainResult<()>;
}
