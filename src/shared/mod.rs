pub mod locks;
pub mod retry;
pub mod shutdown;

pub use locks::OwnerLocks;
pub use retry::{retry_with_backoff, RetryConfig};
pub use shutdown::{listen_for_shutdown_signals, ShutdownSignal};
