pub mod model;
pub mod repository;

pub use model::{LedgerEntry, LedgerOperation, OwnerType, TokenLedger};
pub use repository::LedgerRepository;
