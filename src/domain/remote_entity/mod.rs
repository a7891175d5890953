pub mod model;
pub mod repository;

pub use model::{CachedEntity, EntityKind, SyncState};
pub use repository::EntityCacheRepository;
