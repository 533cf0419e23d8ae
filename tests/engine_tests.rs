//! End-to-end engine tests against the in-memory store.
//!
//! These drive the same flows the room/vote subsystem does: load a pool,
//! deal candidates concurrently, signal a match, and let the lifecycle
//! manager reclaim everything.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use mockall::mock;

use matchroom::clock::ManualClock;
use matchroom::error::{EngineError, EngineResult};
use matchroom::models::{ContentItem, FilterCriteria, MediaType, RoomRecord, RoomStatus};
use matchroom::services::catalog::CatalogClient;
use matchroom::services::{
    CleanupOutcome, FilterCache, LifecycleManager, PoolLoader, SequenceAllocator,
};
use matchroom::store::{InMemoryStore, StateStore};
use matchroom::Clock;

mock! {
    Catalog {}

    #[async_trait::async_trait]
    impl CatalogClient for Catalog {
        async fn fetch_all_genre_matches(
            &self,
            media_type: MediaType,
            genre_ids: &[u32],
            page_budget: u32,
        ) -> EngineResult<Vec<ContentItem>>;

        async fn fetch_any_genre_matches(
            &self,
            media_type: MediaType,
            genre_ids: &[u32],
            page_budget: u32,
        ) -> EngineResult<Vec<ContentItem>>;

        async fn fetch_popular(
            &self,
            media_type: MediaType,
            page_budget: u32,
        ) -> EngineResult<Vec<ContentItem>>;
    }
}

fn items(prefix: &str, count: usize) -> Vec<ContentItem> {
    (0..count)
        .map(|i| ContentItem {
            id: format!("{}{}", prefix, i),
            title: format!("{} {}", prefix, i),
            poster_path: Some(format!("/{}.jpg", i)),
            overview: "A movie.".to_string(),
            genre_ids: vec![28],
            rating: 7.2,
            release_date: Some("2020-01-01".to_string()),
        })
        .collect()
}

struct Engine {
    store: Arc<InMemoryStore>,
    clock: ManualClock,
    loader: PoolLoader<InMemoryStore>,
    allocator: SequenceAllocator<InMemoryStore>,
    lifecycle: LifecycleManager<InMemoryStore>,
}

fn engine(catalog: MockCatalog, pool_ttl_secs: u64) -> Engine {
    let store = Arc::new(InMemoryStore::new());
    let clock = ManualClock::new(Utc::now());
    let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());

    let loader = PoolLoader::new(
        store.clone(),
        FilterCache::new(store.clone(), pool_ttl_secs),
        Arc::new(catalog),
        clock_arc.clone(),
        3,
    );
    let allocator = SequenceAllocator::new(store.clone(), clock_arc.clone());
    let lifecycle = LifecycleManager::new(store.clone(), clock_arc, 60);

    Engine {
        store,
        clock,
        loader,
        allocator,
        lifecycle,
    }
}

#[tokio::test]
async fn full_room_lifecycle_from_load_to_teardown() {
    let mut catalog = MockCatalog::new();
    catalog
        .expect_fetch_all_genre_matches()
        .times(1)
        .returning(|_, _, _| Ok(items("all", 20)));
    catalog
        .expect_fetch_any_genre_matches()
        .times(1)
        .returning(|_, _, _| Ok(items("any", 15)));
    catalog
        .expect_fetch_popular()
        .times(1)
        .returning(|_, _| Ok(items("pop", 50)));

    let engine = engine(catalog, 86400);
    let criteria = FilterCriteria::new(MediaType::Movie, vec![28], "room-1").unwrap();
    let exclude: HashSet<String> = (0..5).map(|i| format!("all{}", i)).collect();

    let pool = engine.loader.load_pool(&criteria, &exclude).await.unwrap();
    assert_eq!(pool.len(), 30);
    assert!(pool.iter().all(|item| !exclude.contains(&item.id)));
    assert!(pool[..15].iter().all(|item| item.id.starts_with("all")));

    // Members swipe a few candidates
    for expected in 0..3 {
        let dealt = engine.allocator.next_for("room-1").await.unwrap().unwrap();
        assert_eq!(dealt.sequence_index, expected);
    }

    // Everyone agreed: matched rooms schedule their own teardown
    let task = engine.lifecycle.mark_matched("room-1").await.unwrap();
    assert_eq!(task.execute_at, engine.clock.now() + Duration::hours(1));

    assert_eq!(
        engine.lifecycle.execute_cleanup("room-1", false).await.unwrap(),
        CleanupOutcome::NotDue
    );

    engine.clock.advance(Duration::hours(1));
    assert_eq!(
        engine.lifecycle.execute_cleanup("room-1", false).await.unwrap(),
        CleanupOutcome::Done
    );

    // Pool and sequence state are gone; dealing is no longer possible
    assert!(engine
        .store
        .get_raw("pool:room-1:movie:28")
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        engine.allocator.next_for("room-1").await,
        Err(EngineError::Validation(_))
    ));

    // Racing a second execution is a no-op success
    assert_eq!(
        engine.lifecycle.execute_cleanup("room-1", false).await.unwrap(),
        CleanupOutcome::Done
    );
}

#[tokio::test]
async fn sequence_totality_under_concurrent_members() {
    let mut catalog = MockCatalog::new();
    catalog
        .expect_fetch_popular()
        .times(1)
        .returning(|_, _| Ok(items("pop", 5)));

    let engine = engine(catalog, 86400);
    let criteria = FilterCriteria::new(MediaType::Movie, vec![], "room-1").unwrap();
    engine.loader.load_pool(&criteria, &HashSet::new()).await.unwrap();

    let allocator = Arc::new(engine.allocator);
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let allocator = allocator.clone();
        tasks.push(tokio::spawn(async move {
            allocator.next_for("room-1").await.unwrap()
        }));
    }

    let mut indices = BTreeSet::new();
    let mut exhausted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Some(dealt) => {
                assert!(indices.insert(dealt.sequence_index), "duplicate index dealt");
            }
            None => exhausted += 1,
        }
    }

    // Pool of 5, 8 callers: exactly indices 0..=4 dealt, three see exhaustion
    assert_eq!(indices, (0..5).collect::<BTreeSet<_>>());
    assert_eq!(exhausted, 3);
}

#[tokio::test]
async fn hits_are_stable_and_rebuilds_keep_tier_membership() {
    let mut catalog = MockCatalog::new();
    catalog
        .expect_fetch_all_genre_matches()
        .times(2)
        .returning(|_, _, _| Ok(items("all", 10)));
    catalog
        .expect_fetch_any_genre_matches()
        .times(2)
        .returning(|_, _, _| Ok(items("any", 10)));
    catalog
        .expect_fetch_popular()
        .times(2)
        .returning(|_, _| Ok(items("pop", 10)));

    let store = Arc::new(InMemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
    let cache = FilterCache::new(store.clone(), 86400);
    let loader = PoolLoader::new(store.clone(), cache, Arc::new(catalog), clock, 3);

    let criteria = FilterCriteria::new(MediaType::Movie, vec![28], "room-1").unwrap();
    let first = loader.load_pool(&criteria, &HashSet::new()).await.unwrap();
    let second = loader.load_pool(&criteria, &HashSet::new()).await.unwrap();

    // Cache hits return the identical ordered pool
    assert_eq!(first, second);

    // Invalidation forces a rebuild: the per-tier id sets survive even if
    // the intra-tier order changes
    let invalidation_cache = FilterCache::new(store.clone(), 86400);
    assert!(invalidation_cache.invalidate(&criteria).await.unwrap());
    let rebuilt = loader.load_pool(&criteria, &HashSet::new()).await.unwrap();

    let ids = |pool: &[ContentItem]| -> BTreeSet<String> {
        pool.iter().map(|item| item.id.clone()).collect()
    };
    assert_eq!(ids(&first), ids(&rebuilt));
    assert!(rebuilt[..10].iter().all(|item| item.id.starts_with("all")));
    assert!(rebuilt[10..20].iter().all(|item| item.id.starts_with("any")));
}

/// Store wrapper that fails deletes a configurable number of times, to
/// exercise the cleanup retry state machine.
struct FlakyStore {
    inner: InMemoryStore,
    failures_left: AtomicUsize,
}

impl FlakyStore {
    fn failing(failures: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait::async_trait]
impl StateStore for FlakyStore {
    async fn get_raw(&self, key: &str) -> EngineResult<Option<String>> {
        self.inner.get_raw(key).await
    }

    async fn put_raw(&self, key: &str, value: String, ttl_secs: Option<u64>) -> EngineResult<()> {
        self.inner.put_raw(key, value, ttl_secs).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl_secs: Option<u64>,
    ) -> EngineResult<bool> {
        self.inner.compare_and_swap(key, expected, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> EngineResult<bool> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(EngineError::Internal("injected delete failure".into()));
        }
        self.inner.delete(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> EngineResult<Vec<String>> {
        self.inner.scan_prefix(prefix).await
    }
}

async fn seed_pool_and_room<S: StateStore>(store: &S, room_id: &str, ttl_secs: u64) {
    use matchroom::models::{CachedPool, PoolEntry, RoomRecord, RoomSequenceState};

    let criteria = FilterCriteria::new(MediaType::Movie, vec![28], room_id).unwrap();
    let pool_key = format!("pool:{}:movie:28", room_id);
    let entries: Vec<PoolEntry> = items("m", 3)
        .into_iter()
        .enumerate()
        .map(|(i, item)| PoolEntry {
            item,
            priority_tier: 1,
            sequence_index: i,
        })
        .collect();
    let pool = CachedPool {
        criteria,
        entries,
        created_at: Utc::now(),
        ttl_secs,
    };
    store
        .put_raw(&pool_key, serde_json::to_string(&pool).unwrap(), None)
        .await
        .unwrap();
    store
        .put_raw(
            &format!("seq:{}", room_id),
            serde_json::to_string(&RoomSequenceState::new(room_id, items("m", 3))).unwrap(),
            None,
        )
        .await
        .unwrap();
    store
        .put_raw(
            &format!("room:{}", room_id),
            serde_json::to_string(&RoomRecord::new(room_id, pool_key, Utc::now())).unwrap(),
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn cleanup_retries_with_backoff_then_fails_and_ttl_sweep_recovers() {
    use matchroom::models::{CleanupReason, CleanupStatus, CleanupTask};

    // Three injected failures: enough to exhaust max_retries
    let store = Arc::new(FlakyStore::failing(3));
    seed_pool_and_room(&*store, "room-1", 3600).await;

    let clock = ManualClock::new(Utc::now());
    let lifecycle = LifecycleManager::new(store.clone(), Arc::new(clock.clone()), 60);

    lifecycle
        .schedule_cleanup("room-1", Duration::zero(), CleanupReason::Inactive)
        .await
        .unwrap();

    // First attempt fails and schedules a retry with 2^1 * base backoff
    assert_eq!(
        lifecycle.execute_cleanup("room-1", false).await.unwrap(),
        CleanupOutcome::Failed
    );
    let task: CleanupTask = serde_json::from_str(
        &store.get_raw("cleanup:room-1").await.unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(task.status, CleanupStatus::RetryScheduled);
    assert_eq!(task.retry_count, 1);
    assert_eq!(task.execute_at, clock.now() + Duration::seconds(120));

    // Not due again until the backoff elapses
    assert_eq!(
        lifecycle.execute_cleanup("room-1", false).await.unwrap(),
        CleanupOutcome::NotDue
    );

    clock.advance(Duration::minutes(5));
    assert_eq!(
        lifecycle.execute_cleanup("room-1", false).await.unwrap(),
        CleanupOutcome::Failed
    );

    clock.advance(Duration::minutes(10));
    assert_eq!(
        lifecycle.execute_cleanup("room-1", false).await.unwrap(),
        CleanupOutcome::Failed
    );
    let task: CleanupTask = serde_json::from_str(
        &store.get_raw("cleanup:room-1").await.unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(task.status, CleanupStatus::Failed);

    // Retries exhausted: the pool is never silently lost
    assert!(store.get_raw("pool:room-1:movie:28").await.unwrap().is_some());

    // The TTL sweep is the safety net once the store recovers
    clock.advance(Duration::hours(2));
    let cleaned = lifecycle.process_ttl_sweep().await.unwrap();
    assert_eq!(cleaned, vec!["room-1"]);
    assert!(store.get_raw("pool:room-1:movie:28").await.unwrap().is_none());
}

/// Store that flips the room record to MATCHED between a writer's read and
/// its first conditional write, simulating a status change landing from
/// another invocation mid-update.
struct InterleavingStore {
    inner: InMemoryStore,
    interleaved: AtomicBool,
}

impl InterleavingStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            interleaved: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl StateStore for InterleavingStore {
    async fn get_raw(&self, key: &str) -> EngineResult<Option<String>> {
        self.inner.get_raw(key).await
    }

    async fn put_raw(&self, key: &str, value: String, ttl_secs: Option<u64>) -> EngineResult<()> {
        self.inner.put_raw(key, value, ttl_secs).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl_secs: Option<u64>,
    ) -> EngineResult<bool> {
        if key.starts_with("room:") && !self.interleaved.swap(true, Ordering::SeqCst) {
            if let Some(raw) = self.inner.get_raw(key).await? {
                let mut record: RoomRecord = serde_json::from_str(&raw).unwrap();
                record.status = RoomStatus::Matched;
                self.inner
                    .put_raw(key, serde_json::to_string(&record).unwrap(), None)
                    .await?;
            }
        }
        self.inner.compare_and_swap(key, expected, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> EngineResult<bool> {
        self.inner.delete(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> EngineResult<Vec<String>> {
        self.inner.scan_prefix(prefix).await
    }
}

#[tokio::test]
async fn activity_touch_preserves_concurrent_status_change() {
    let store = Arc::new(InterleavingStore::new());
    seed_pool_and_room(&*store, "room-1", 3600).await;

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
    let allocator = SequenceAllocator::new(store.clone(), clock);

    // Dealing touches the room's activity timestamp; the store flips the
    // status to MATCHED underneath it
    allocator.next_for("room-1").await.unwrap().unwrap();

    let record: RoomRecord =
        serde_json::from_str(&store.get_raw("room:room-1").await.unwrap().unwrap()).unwrap();
    assert_eq!(record.status, RoomStatus::Matched, "stale status written back");
}

/// Store that records the TTL of every conditional write to a room record
struct RoomWriteLog {
    inner: InMemoryStore,
    room_write_ttls: std::sync::Mutex<Vec<Option<u64>>>,
}

impl RoomWriteLog {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            room_write_ttls: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl StateStore for RoomWriteLog {
    async fn get_raw(&self, key: &str) -> EngineResult<Option<String>> {
        self.inner.get_raw(key).await
    }

    async fn put_raw(&self, key: &str, value: String, ttl_secs: Option<u64>) -> EngineResult<()> {
        self.inner.put_raw(key, value, ttl_secs).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl_secs: Option<u64>,
    ) -> EngineResult<bool> {
        if key.starts_with("room:") {
            self.room_write_ttls.lock().unwrap().push(ttl_secs);
        }
        self.inner.compare_and_swap(key, expected, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> EngineResult<bool> {
        self.inner.delete(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> EngineResult<Vec<String>> {
        self.inner.scan_prefix(prefix).await
    }
}

#[tokio::test]
async fn cleaned_room_records_expire_instead_of_accumulating() {
    use matchroom::models::CleanupReason;

    let store = Arc::new(RoomWriteLog::new());
    seed_pool_and_room(&*store, "room-1", 3600).await;

    let clock = ManualClock::new(Utc::now());
    let lifecycle = LifecycleManager::new(store.clone(), Arc::new(clock), 60);

    lifecycle
        .schedule_cleanup("room-1", Duration::zero(), CleanupReason::Manual)
        .await
        .unwrap();
    assert_eq!(
        lifecycle.execute_cleanup("room-1", false).await.unwrap(),
        CleanupOutcome::Done
    );

    // Scheduling writes the record without expiry; the terminal Cleaned
    // write carries one so room keys do not pile up forever
    let ttls = store.room_write_ttls.lock().unwrap().clone();
    assert_eq!(ttls.first(), Some(&None));
    assert!(ttls.last().unwrap().is_some(), "cleaned record stored without expiry");

    let record: RoomRecord =
        serde_json::from_str(&store.get_raw("room:room-1").await.unwrap().unwrap()).unwrap();
    assert_eq!(record.status, RoomStatus::Cleaned);
}
