use std::fmt::Display;

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::FilterCriteria;

pub mod memory;
pub mod redis;

pub use memory::InMemoryStore;
pub use redis::RedisStore;

pub const POOL_KEY_PREFIX: &str = "pool:";
pub const ROOM_KEY_PREFIX: &str = "room:";
pub const CLEANUP_KEY_PREFIX: &str = "cleanup:";

/// Keys under which engine records live in the shared store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Cached pool for a canonical filter key
    Pool(FilterCriteria),
    /// Shared cursor state for a room
    Sequence(String),
    /// Room bookkeeping record
    Room(String),
    /// Pending cleanup task for a room
    Cleanup(String),
    /// Audit entry for one completed teardown
    CleanupHistory(String, Uuid),
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::Pool(criteria) => write!(
                f,
                "{}{}:{}:{}",
                POOL_KEY_PREFIX,
                criteria.room_id,
                criteria.media_type,
                criteria.genre_key()
            ),
            StoreKey::Sequence(room_id) => write!(f, "seq:{}", room_id),
            StoreKey::Room(room_id) => write!(f, "{}{}", ROOM_KEY_PREFIX, room_id),
            StoreKey::Cleanup(room_id) => write!(f, "{}{}", CLEANUP_KEY_PREFIX, room_id),
            StoreKey::CleanupHistory(room_id, id) => write!(f, "history:{}:{}", room_id, id),
        }
    }
}

/// Shared external state store
///
/// All engine state lives here because invocations are not guaranteed to
/// share process memory. The compare-and-swap primitive is what makes every
/// mutation a single atomic conditional update.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> EngineResult<Option<String>>;

    async fn put_raw(&self, key: &str, value: String, ttl_secs: Option<u64>) -> EngineResult<()>;

    /// Writes `value` only if the current value equals `expected`
    /// (`None` = key must be absent). Returns whether the write happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl_secs: Option<u64>,
    ) -> EngineResult<bool>;

    /// Removes a key, reporting whether it existed
    async fn delete(&self, key: &str) -> EngineResult<bool>;

    /// Lists keys starting with `prefix` (sweep support)
    async fn scan_prefix(&self, prefix: &str) -> EngineResult<Vec<String>>;
}

/// Reads and deserializes a JSON record
pub async fn get_json<S, T>(store: &S, key: &StoreKey) -> EngineResult<Option<T>>
where
    S: StateStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get_raw(&key.to_string()).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serializes and writes a JSON record
pub async fn put_json<S, T>(
    store: &S,
    key: &StoreKey,
    value: &T,
    ttl_secs: Option<u64>,
) -> EngineResult<()>
where
    S: StateStore + ?Sized,
    T: Serialize,
{
    let raw = serde_json::to_string(value)?;
    store.put_raw(&key.to_string(), raw, ttl_secs).await
}
