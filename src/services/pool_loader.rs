use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::models::{ContentItem, FilterCriteria, RoomRecord, RoomSequenceState};
use crate::services::catalog::CatalogClient;
use crate::services::filter_cache::{apply_exclusions, FilterCache};
use crate::services::priority::{self, RawTiers, CONTENT_POOL_SIZE};
use crate::store::{StateStore, StoreKey};

/// How long one build may hold the in-flight lease before it is presumed dead
const INFLIGHT_TTL_SECS: u64 = 30;

const INFLIGHT_POLL_MS: u64 = 50;
const INFLIGHT_MAX_POLLS: u32 = 100;

/// Orchestrates cache, catalog and the priority engine
///
/// On a cache hit the stored pool is returned with the caller's exclusions
/// applied. On a miss, concurrent callers for the same canonical key are
/// collapsed onto one fetch-build-store through a store-level lease, so the
/// collapse holds across independent invocations with no shared memory; only
/// the lease holder talks to the catalog.
pub struct PoolLoader<S: StateStore> {
    store: Arc<S>,
    cache: FilterCache<S>,
    catalog: Arc<dyn CatalogClient>,
    clock: Arc<dyn Clock>,
    page_budget: u32,
}

impl<S: StateStore> PoolLoader<S> {
    pub fn new(
        store: Arc<S>,
        cache: FilterCache<S>,
        catalog: Arc<dyn CatalogClient>,
        clock: Arc<dyn Clock>,
        page_budget: u32,
    ) -> Self {
        Self {
            store,
            cache,
            catalog,
            clock,
            page_budget,
        }
    }

    /// Loads the pool for `criteria`, building and storing it on a miss.
    ///
    /// The returned items never contain an excluded id, and repeated calls
    /// with the same criteria return the same cached pool until it is
    /// invalidated.
    pub async fn load_pool(
        &self,
        criteria: &FilterCriteria,
        exclude: &HashSet<String>,
    ) -> EngineResult<Vec<ContentItem>> {
        let marker_key = format!("inflight:{}", StoreKey::Pool(criteria.clone()));

        for _ in 0..INFLIGHT_MAX_POLLS {
            if let Some(items) = self.cache.get(criteria, exclude).await? {
                tracing::debug!(room_id = %criteria.room_id, items = items.len(), "Pool cache hit");
                return Ok(items);
            }

            // Create-if-absent on the marker is the lease: whoever wins builds
            // the pool, everyone else polls the cache until it lands. The TTL
            // releases leases held by crashed builders.
            let acquired = self
                .store
                .compare_and_swap(&marker_key, None, "1".to_string(), Some(INFLIGHT_TTL_SECS))
                .await?;
            if acquired {
                let result = self.fetch_build_store(criteria, exclude).await;
                if let Err(error) = self.store.delete(&marker_key).await {
                    tracing::warn!(%error, "Failed to release in-flight lease");
                }
                return result;
            }

            tokio::time::sleep(Duration::from_millis(INFLIGHT_POLL_MS)).await;
        }

        Err(EngineError::StoreConflict(marker_key))
    }

    async fn fetch_build_store(
        &self,
        criteria: &FilterCriteria,
        exclude: &HashSet<String>,
    ) -> EngineResult<Vec<ContentItem>> {
        let (all_genres, any_genre) = if criteria.genre_ids.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let all = self
                .catalog
                .fetch_all_genre_matches(criteria.media_type, &criteria.genre_ids, self.page_budget)
                .await;
            let any = self
                .catalog
                .fetch_any_genre_matches(criteria.media_type, &criteria.genre_ids, self.page_budget)
                .await;
            (
                tier_or_empty("all_genres", all),
                tier_or_empty("any_genre", any),
            )
        };
        let popular = tier_or_empty(
            "popular",
            self.catalog
                .fetch_popular(criteria.media_type, self.page_budget)
                .await,
        );

        let tiers = RawTiers {
            all_genres,
            any_genre,
            popular,
        };
        let entries = {
            let mut rng = rand::thread_rng();
            priority::build_pool(tiers, exclude, CONTENT_POOL_SIZE, &mut rng)
        };

        tracing::info!(
            room_id = %criteria.room_id,
            media_type = %criteria.media_type,
            pool_size = entries.len(),
            "Pool built"
        );

        let now = self.clock.now();
        let pool = self.cache.put(criteria, entries, now).await?;
        self.materialize_room(criteria, &pool.entries.iter().map(|e| e.item.clone()).collect::<Vec<_>>())
            .await?;

        Ok(apply_exclusions(&pool.entries, exclude))
    }

    /// Creates the room's sequence state and bookkeeping record if they do
    /// not exist yet. A rebuild after invalidation must not reset a live
    /// cursor, hence create-if-absent.
    async fn materialize_room(
        &self,
        criteria: &FilterCriteria,
        items: &[ContentItem],
    ) -> EngineResult<()> {
        let sequence = RoomSequenceState::new(&criteria.room_id, items.to_vec());
        let seq_key = StoreKey::Sequence(criteria.room_id.clone()).to_string();
        self.store
            .compare_and_swap(&seq_key, None, serde_json::to_string(&sequence)?, None)
            .await?;

        let record = RoomRecord::new(
            &criteria.room_id,
            StoreKey::Pool(criteria.clone()).to_string(),
            self.clock.now(),
        );
        let room_key = StoreKey::Room(criteria.room_id.clone()).to_string();
        self.store
            .compare_and_swap(&room_key, None, serde_json::to_string(&record)?, None)
            .await?;

        Ok(())
    }
}

fn tier_or_empty(tier: &str, result: EngineResult<Vec<ContentItem>>) -> Vec<ContentItem> {
    match result {
        Ok(items) => items,
        Err(error) => {
            tracing::warn!(%error, tier, "Catalog fetch failed, tier degraded to empty");
            Vec::new()
        }
    }
}
