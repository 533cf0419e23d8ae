pub mod catalog;
pub mod filter_cache;
pub mod lifecycle;
pub mod pool_loader;
pub mod priority;
pub mod sequence;

pub use catalog::{CatalogClient, TmdbCatalog};
pub use filter_cache::FilterCache;
pub use lifecycle::{CleanupOutcome, LifecycleManager};
pub use pool_loader::PoolLoader;
pub use priority::{build_pool, RawTiers, CONTENT_POOL_SIZE};
pub use sequence::{DealtItem, SequenceAllocator, SequencePhase};
