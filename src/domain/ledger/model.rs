//! Token ledger domain entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult};

/// Kind of billable entity a ledger or subscription belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OwnerType {
    User,
    Business,
    Institution,
}

impl std::fmt::Display for OwnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "USER"),
            Self::Business => write!(f, "BUSINESS"),
            Self::Institution => write!(f, "INSTITUTION"),
        }
    }
}

/// Ledger operation kind
///
/// `Alert` never appears in history entries; it exists because the
/// `TokenAlert` event reuses this enum for its `operation` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerOperation {
    Purchase,
    Use,
    Alert,
}

impl std::fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Purchase => write!(f, "purchase"),
            Self::Use => write!(f, "use"),
            Self::Alert => write!(f, "alert"),
        }
    }
}

/// One committed ledger movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    /// Signed amount: positive for credits, negative for debits
    pub delta: Decimal,
    pub operation: LedgerOperation,
    /// Balance after this entry was applied
    pub balance_after: Decimal,
}

/// Per-owner token balance with append-only usage history.
///
/// Invariants: `balance` equals the running sum of `history` deltas and is
/// never negative; `total_used` never decreases; history is only appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLedger {
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub balance: Decimal,
    pub total_used: Decimal,
    pub history: Vec<LedgerEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenLedger {
    pub fn new(owner_id: impl Into<String>, owner_type: OwnerType) -> Self {
        let now = Utc::now();
        Self {
            owner_id: owner_id.into(),
            owner_type,
            balance: Decimal::ZERO,
            total_used: Decimal::ZERO,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a credit and append its history entry.
    /// Amount must be strictly positive.
    pub fn credit(&mut self, amount: Decimal) -> DomainResult<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "credit amount must be positive, got {}",
                amount
            )));
        }
        let now = Utc::now();
        self.balance += amount;
        self.updated_at = now;
        let entry = LedgerEntry {
            timestamp: now,
            delta: amount,
            operation: LedgerOperation::Purchase,
            balance_after: self.balance,
        };
        self.history.push(entry.clone());
        Ok(entry)
    }

    /// Apply a debit and append its history entry.
    ///
    /// Rejected wholesale with `InsufficientBalance` when `amount` exceeds
    /// the balance: no balance change, no history entry.
    pub fn debit(&mut self, amount: Decimal) -> DomainResult<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "debit amount must be positive, got {}",
                amount
            )));
        }
        if amount > self.balance {
            return Err(DomainError::InsufficientBalance {
                owner_id: self.owner_id.clone(),
                requested: amount,
                available: self.balance,
            });
        }
        let now = Utc::now();
        self.balance -= amount;
        self.total_used += amount;
        self.updated_at = now;
        let entry = LedgerEntry {
            timestamp: now,
            delta: -amount,
            operation: LedgerOperation::Use,
            balance_after: self.balance,
        };
        self.history.push(entry.clone());
        Ok(entry)
    }

    /// Recompute the balance by replaying history deltas from zero.
    pub fn replayed_balance(&self) -> Decimal {
        self.history.iter().map(|e| e.delta).sum()
    }
}
