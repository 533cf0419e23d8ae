use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FilterCriteria;

/// A catalog title as served to rooms
///
/// Immutable once fetched; the engine never edits catalog data, it only
/// orders and filters it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub poster_path: Option<String>,
    pub overview: String,
    pub genre_ids: Vec<u32>,
    pub rating: f64,
    pub release_date: Option<String>,
}

/// A content item placed into an ordered pool
///
/// `sequence_index` is assigned once at pool materialization and is stable
/// for the life of that pool instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    #[serde(flatten)]
    pub item: ContentItem,
    pub priority_tier: u8,
    pub sequence_index: usize,
}

/// The stored pool for one canonical filter key
///
/// Replaced wholesale on every write, never partially mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPool {
    pub criteria: FilterCriteria,
    pub entries: Vec<PoolEntry>,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CachedPool {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.created_at + chrono::Duration::seconds(self.ttl_secs as i64)
    }
}
