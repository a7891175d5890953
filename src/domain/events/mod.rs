pub mod types;

pub use types::{
    EntityEventPayload, Event, SubscriptionChangedEvent, SyncRequestEvent, SyncResponseEvent,
    TokenBalanceEvent,
};
