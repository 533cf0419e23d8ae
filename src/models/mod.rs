mod content;
mod criteria;
mod room;

pub use content::{CachedPool, ContentItem, PoolEntry};
pub use criteria::{FilterCriteria, MediaType, MAX_GENRES_PER_FILTER};
pub use room::{
    CleanupHistoryEntry, CleanupReason, CleanupStatus, CleanupTask, RoomRecord,
    RoomSequenceState, RoomStatus, MAX_CLEANUP_RETRIES,
};
