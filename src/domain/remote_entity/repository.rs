//! Remote entity cache repository interface

use async_trait::async_trait;

use super::model::{CachedEntity, EntityKind};
use crate::domain::DomainResult;

#[async_trait]
pub trait EntityCacheRepository: Send + Sync {
    async fn find(&self, kind: EntityKind, id: &str) -> DomainResult<Option<CachedEntity>>;
    async fn upsert(&self, entity: CachedEntity) -> DomainResult<()>;
    async fn find_by_kind(&self, kind: EntityKind) -> DomainResult<Vec<CachedEntity>>;
}
