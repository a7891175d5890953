//! Ledger repository interface

use async_trait::async_trait;

use super::model::TokenLedger;
use crate::domain::DomainResult;

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn find_by_owner(&self, owner_id: &str) -> DomainResult<Option<TokenLedger>>;
    /// Upsert the full ledger record (balance, totals, history).
    async fn save(&self, ledger: TokenLedger) -> DomainResult<()>;
    async fn find_all(&self) -> DomainResult<Vec<TokenLedger>>;
}
