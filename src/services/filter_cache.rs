use std::collections::HashSet;
use std::sync::Arc;

use crate::error::EngineResult;
use crate::models::{CachedPool, ContentItem, FilterCriteria, PoolEntry};
use crate::store::{self, StateStore, StoreKey};

/// Criteria-keyed pool cache
///
/// Single source of truth for one pool per canonical (media type, genre set,
/// room) triple. Exclusion sets are applied at read time only; the stored
/// pool is never narrowed by a caller's exclusions.
pub struct FilterCache<S: StateStore> {
    store: Arc<S>,
    ttl_secs: u64,
}

impl<S: StateStore> FilterCache<S> {
    pub fn new(store: Arc<S>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    /// Returns the cached items with `exclude` removed, or `None` on miss.
    ///
    /// A miss means no entry exists for the canonical key; a cached pool
    /// whose every item is excluded is a hit with an empty result.
    pub async fn get(
        &self,
        criteria: &FilterCriteria,
        exclude: &HashSet<String>,
    ) -> EngineResult<Option<Vec<ContentItem>>> {
        let pool = self.get_pool(criteria).await?;
        Ok(pool.map(|pool| apply_exclusions(&pool.entries, exclude)))
    }

    /// Returns the full cached pool record, tiers and timestamps included
    pub async fn get_pool(&self, criteria: &FilterCriteria) -> EngineResult<Option<CachedPool>> {
        store::get_json(&*self.store, &StoreKey::Pool(criteria.clone())).await
    }

    /// Replaces any existing entry for the canonical key wholesale
    pub async fn put(
        &self,
        criteria: &FilterCriteria,
        entries: Vec<PoolEntry>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<CachedPool> {
        let pool = CachedPool {
            criteria: criteria.clone(),
            entries,
            created_at: now,
            ttl_secs: self.ttl_secs,
        };
        // Native expiry trails the logical TTL: the sweep must still find the
        // record after `is_expired` turns true to tear the room down with it.
        store::put_json(
            &*self.store,
            &StoreKey::Pool(criteria.clone()),
            &pool,
            Some(self.ttl_secs.saturating_mul(2)),
        )
        .await?;

        tracing::debug!(
            room_id = %criteria.room_id,
            pool_size = pool.entries.len(),
            "Pool stored"
        );
        Ok(pool)
    }

    /// Removes the entry for the canonical key; unrelated keys are untouched
    pub async fn invalidate(&self, criteria: &FilterCriteria) -> EngineResult<bool> {
        self.store
            .delete(&StoreKey::Pool(criteria.clone()).to_string())
            .await
    }
}

/// Strips excluded ids from a stored pool, preserving order
pub fn apply_exclusions(entries: &[PoolEntry], exclude: &HashSet<String>) -> Vec<ContentItem> {
    entries
        .iter()
        .filter(|entry| !exclude.contains(&entry.item.id))
        .map(|entry| entry.item.clone())
        .collect()
}
