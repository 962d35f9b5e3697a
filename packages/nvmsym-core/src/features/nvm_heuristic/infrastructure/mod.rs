pub mod context_cache;
pub mod points_to_cache;
pub mod priority;

pub use context_cache::{ContextCache, ContextCacheStats, ContextKey};
pub use points_to_cache::PointsToCache;
pub use priority::compute_priorities;
