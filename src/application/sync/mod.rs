pub mod client;
pub mod requests;

pub use client::{SyncConfig, SyncService};
pub use requests::{PendingSyncs, SyncOutcome};
