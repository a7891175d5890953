pub mod error;
pub mod events;
pub mod ledger;
pub mod remote_entity;
pub mod repositories;
pub mod subscription;

// Re-export commonly used types
pub use error::{DomainError, DomainResult, UnavailableCause};
pub use events::Event;
pub use ledger::{LedgerEntry, LedgerOperation, OwnerType, TokenLedger};
pub use remote_entity::{CachedEntity, EntityKind, SyncState};
pub use repositories::RepositoryProvider;
pub use subscription::{ChangedBy, Subscription, SubscriptionStatus};
