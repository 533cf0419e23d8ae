//! Content pool and session engine for group movie-matching rooms.
//!
//! Each room pre-loads a bounded pool of candidate titles for its filter
//! criteria, serves the pool to every member in one agreed order, and
//! reclaims the pool's resources once the room has matched or gone quiet.
//!
//! The engine is built from five parts: a tiered priority algorithm that
//! composes pools from three catalog sets, a criteria-keyed pool cache, a
//! loader that orchestrates the two, a sequence allocator that deals
//! candidates race-free across concurrent members, and a lifecycle manager
//! that guarantees eventual teardown. All shared state lives in an external
//! store mutated through atomic conditional updates; nothing assumes two
//! requests share process memory.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use services::{
    CatalogClient, CleanupOutcome, DealtItem, FilterCache, LifecycleManager, PoolLoader,
    SequenceAllocator, SequencePhase, TmdbCatalog, CONTENT_POOL_SIZE,
};
