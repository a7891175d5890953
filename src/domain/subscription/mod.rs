pub mod model;
pub mod repository;

pub use model::{ChangedBy, Subscription, SubscriptionStatus};
pub use repository::SubscriptionRepository;
