//! Domain error taxonomy

use rust_decimal::Decimal;
use thiserror::Error;

use super::subscription::SubscriptionStatus;

/// Why a remote entity cannot be served from the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableCause {
    /// A sync request is in flight; retry later.
    Syncing,
    /// The source of record confirmed the entity does not exist.
    NotProvisioned,
}

impl std::fmt::Display for UnavailableCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syncing => write!(f, "sync in progress"),
            Self::NotProvisioned => write!(f, "not provisioned upstream"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Insufficient balance for {owner_id}: requested {requested}, available {available}")]
    InsufficientBalance {
        owner_id: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid subscription transition: {from} -> {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    #[error("Entity {id} unavailable: {cause}")]
    EntityUnavailable { id: String, cause: UnavailableCause },

    #[error("Sync request for {0} timed out")]
    SyncTimeout(String),

    #[error("Revocation check failed: {0}")]
    RevocationCheckFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Whether the caller may retry the triggering operation later.
    ///
    /// `EntityUnavailable(NotProvisioned)` is deliberately not retryable:
    /// the source of record has confirmed the entity does not exist, so
    /// retrying would loop forever.
    pub fn is_retryable(&self) -> bool {
        match self {
            DomainError::EntityUnavailable { cause, .. } => *cause == UnavailableCause::Syncing,
            DomainError::SyncTimeout(_) => true,
            DomainError::Storage(_) => true,
            _ => false,
        }
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
