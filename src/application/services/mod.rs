pub mod expiry;
pub mod ledger;
pub mod pricing;
pub mod revocation;
pub mod subscription;

pub use expiry::{start_subscription_expiry_task, sweep_expired};
pub use ledger::{LedgerConfig, TokenLedgerService};
pub use pricing::{PricingTable, TokenPackage};
pub use revocation::{
    AccessKind, GuardConfig, RevocationAuthority, RevocationGuard, RevocationPolicy, TokenClaims,
};
pub use subscription::SubscriptionService;
