use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    CachedPool, CleanupHistoryEntry, CleanupReason, CleanupStatus, CleanupTask, RoomRecord,
    RoomStatus,
};
use crate::store::{
    self, StateStore, StoreKey, CLEANUP_KEY_PREFIX, POOL_KEY_PREFIX, ROOM_KEY_PREFIX,
};

/// Delay before a matched room's resources are reclaimed
pub const MATCHED_CLEANUP_DELAY_SECS: i64 = 3600;

/// Cleanup audit records are kept for 30 days
const HISTORY_TTL_SECS: u64 = 30 * 86400;

/// Cleaned room records linger a day for observability, then expire
const CLEANED_ROOM_TTL_SECS: u64 = 86400;

const MAX_CAS_ATTEMPTS: u32 = 8;

/// Result of one cleanup execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Done,
    NotDue,
    Failed,
}

/// Schedules and executes pool teardown with bounded retries
///
/// The retry loop is the task's explicit state machine driven by a
/// poll-based scheduler, and the TTL sweep is the safety net for pools
/// whose scheduled cleanup never ran.
pub struct LifecycleManager<S: StateStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    retry_base_secs: u64,
}

impl<S: StateStore> LifecycleManager<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, retry_base_secs: u64) -> Self {
        Self {
            store,
            clock,
            retry_base_secs,
        }
    }

    /// Creates or replaces the room's cleanup task.
    ///
    /// At most one task per room is ever active; scheduling again simply
    /// replaces the pending task.
    pub async fn schedule_cleanup(
        &self,
        room_id: &str,
        delay: Duration,
        reason: CleanupReason,
    ) -> EngineResult<CleanupTask> {
        let now = self.clock.now();
        let task = CleanupTask::new(room_id, reason, now, delay);

        store::put_json(
            &*self.store,
            &StoreKey::Cleanup(room_id.to_string()),
            &task,
            None,
        )
        .await?;

        // Observability: stamp the room record so operators can see a
        // teardown is coming.
        self.update_room(room_id, None, |record| {
            record.cleanup_scheduled_at = Some(task.execute_at);
        })
        .await?;

        tracing::info!(
            room_id = %room_id,
            reason = ?reason,
            execute_at = %task.execute_at,
            "Cleanup scheduled"
        );
        Ok(task)
    }

    /// Transitions a room to its terminal matched status.
    ///
    /// Matching is a terminal event, so it schedules cleanup itself.
    pub async fn mark_matched(&self, room_id: &str) -> EngineResult<CleanupTask> {
        let updated = self
            .update_room(room_id, None, |record| {
                record.status = RoomStatus::Matched;
            })
            .await?;
        if !updated {
            return Err(EngineError::Validation(format!(
                "unknown room {}",
                room_id
            )));
        }

        self.schedule_cleanup(
            room_id,
            Duration::seconds(MATCHED_CLEANUP_DELAY_SECS),
            CleanupReason::Matched,
        )
        .await
    }

    /// Executes the room's cleanup task.
    ///
    /// Rejects with `NotDue` when a pending task is not yet due and `force`
    /// is off. Re-executing after a successful cleanup is an idempotent
    /// no-op success: scheduled and TTL-driven paths can race.
    pub async fn execute_cleanup(&self, room_id: &str, force: bool) -> EngineResult<CleanupOutcome> {
        let now = self.clock.now();
        let room: Option<RoomRecord> =
            store::get_json(&*self.store, &StoreKey::Room(room_id.to_string())).await?;
        let task: Option<CleanupTask> =
            store::get_json(&*self.store, &StoreKey::Cleanup(room_id.to_string())).await?;

        if room.as_ref().map(|r| r.status) == Some(RoomStatus::Cleaned)
            || (room.is_none() && task.is_none())
        {
            tracing::debug!(room_id = %room_id, "Cleanup already done, no-op");
            return Ok(CleanupOutcome::Done);
        }

        if let Some(task) = &task {
            if !force && !task.is_due(now) {
                return Ok(CleanupOutcome::NotDue);
            }
        }

        let reason = task
            .as_ref()
            .map(|t| t.reason)
            .unwrap_or(CleanupReason::Manual);

        let pool_key = room.as_ref().map(|r| r.pool_key.clone());
        match self.clean_room(room_id, pool_key.as_deref(), reason).await {
            Ok(pool_size) => {
                self.store
                    .delete(&StoreKey::Cleanup(room_id.to_string()).to_string())
                    .await?;
                tracing::info!(
                    room_id = %room_id,
                    reason = ?reason,
                    pool_size,
                    "Cleanup done"
                );
                Ok(CleanupOutcome::Done)
            }
            Err(error) => {
                tracing::error!(room_id = %room_id, %error, "Cleanup execution failed");
                if let Some(mut task) = task {
                    task.record_failure(self.clock.now(), self.retry_base_secs);
                    match task.status {
                        CleanupStatus::RetryScheduled => tracing::warn!(
                            room_id = %room_id,
                            retry_count = task.retry_count,
                            execute_at = %task.execute_at,
                            "Cleanup retry scheduled"
                        ),
                        _ => tracing::error!(
                            room_id = %room_id,
                            "Cleanup retries exhausted, pool left intact"
                        ),
                    }
                    store::put_json(
                        &*self.store,
                        &StoreKey::Cleanup(room_id.to_string()),
                        &task,
                        None,
                    )
                    .await?;
                }
                Ok(CleanupOutcome::Failed)
            }
        }
    }

    /// Rooms whose last activity is older than the threshold, are still
    /// active, and have no cleanup task on file. The caller decides what to
    /// do with them; the sweeper schedules immediate cleanup.
    ///
    /// Rooms with any task on file are already in the teardown pipeline;
    /// re-scheduling would replace the task and reset its retry budget.
    pub async fn check_inactive_rooms(&self, threshold_hours: i64) -> EngineResult<Vec<String>> {
        let cutoff = self.clock.now() - Duration::hours(threshold_hours);
        let mut inactive = Vec::new();

        for key in self.store.scan_prefix(ROOM_KEY_PREFIX).await? {
            let Some(raw) = self.store.get_raw(&key).await? else {
                continue;
            };
            let record: RoomRecord = serde_json::from_str(&raw)?;
            if record.status != RoomStatus::Active || record.last_activity >= cutoff {
                continue;
            }
            let task_key = StoreKey::Cleanup(record.room_id.clone()).to_string();
            if self.store.get_raw(&task_key).await?.is_none() {
                inactive.push(record.room_id);
            }
        }

        Ok(inactive)
    }

    /// Executes every due pending task; the poll-based scheduler entry point
    pub async fn process_due_tasks(&self) -> EngineResult<Vec<(String, CleanupOutcome)>> {
        let now = self.clock.now();
        let mut outcomes = Vec::new();

        for key in self.store.scan_prefix(CLEANUP_KEY_PREFIX).await? {
            let Some(raw) = self.store.get_raw(&key).await? else {
                continue;
            };
            let task: CleanupTask = serde_json::from_str(&raw)?;
            let actionable = matches!(
                task.status,
                CleanupStatus::Scheduled | CleanupStatus::RetryScheduled
            );
            if actionable && task.is_due(now) {
                let outcome = self.execute_cleanup(&task.room_id, false).await?;
                outcomes.push((task.room_id, outcome));
            }
        }

        Ok(outcomes)
    }

    /// Force-cleans every pool whose TTL has elapsed, whatever the state of
    /// its scheduled task. Returns the rooms cleaned.
    pub async fn process_ttl_sweep(&self) -> EngineResult<Vec<String>> {
        let now = self.clock.now();
        let mut cleaned = Vec::new();

        for key in self.store.scan_prefix(POOL_KEY_PREFIX).await? {
            let Some(raw) = self.store.get_raw(&key).await? else {
                continue;
            };
            let pool: CachedPool = serde_json::from_str(&raw)?;
            if !pool.is_expired(now) {
                continue;
            }

            let room_id = pool.criteria.room_id.clone();
            match self.clean_room(&room_id, Some(key.as_str()), CleanupReason::Ttl).await {
                Ok(pool_size) => {
                    self.store
                        .delete(&StoreKey::Cleanup(room_id.clone()).to_string())
                        .await?;
                    tracing::info!(room_id = %room_id, pool_size, "TTL sweep reclaimed pool");
                    cleaned.push(room_id);
                }
                Err(error) => {
                    tracing::error!(room_id = %room_id, %error, "TTL sweep failed for room");
                }
            }
        }

        Ok(cleaned)
    }

    /// Deletes the room's pool and sequence state, records the teardown in
    /// history and marks the room cleaned. Every step is safe to repeat.
    async fn clean_room(
        &self,
        room_id: &str,
        pool_key: Option<&str>,
        reason: CleanupReason,
    ) -> EngineResult<usize> {
        let mut pool_size = 0;
        if let Some(pool_key) = pool_key {
            if let Some(raw) = self.store.get_raw(pool_key).await? {
                let pool: CachedPool = serde_json::from_str(&raw)?;
                pool_size = pool.entries.len();
            }
            self.store.delete(pool_key).await?;
        }
        self.store
            .delete(&StoreKey::Sequence(room_id.to_string()).to_string())
            .await?;

        let entry = CleanupHistoryEntry {
            id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            reason,
            pool_size,
            cleaned_at: self.clock.now(),
        };
        store::put_json(
            &*self.store,
            &StoreKey::CleanupHistory(room_id.to_string(), entry.id),
            &entry,
            Some(HISTORY_TTL_SECS),
        )
        .await?;

        // The cleaned record expires on its own so room keys do not
        // accumulate across the store's lifetime
        self.update_room(room_id, Some(CLEANED_ROOM_TTL_SECS), |record| {
            record.status = RoomStatus::Cleaned;
        })
        .await?;

        Ok(pool_size)
    }

    /// Conditional update on the room record; returns whether it existed.
    ///
    /// Retries on write conflict so a concurrent mutation is never clobbered
    /// with a stale record.
    async fn update_room<F>(
        &self,
        room_id: &str,
        ttl_secs: Option<u64>,
        mutate: F,
    ) -> EngineResult<bool>
    where
        F: Fn(&mut RoomRecord),
    {
        let key = StoreKey::Room(room_id.to_string()).to_string();
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(raw) = self.store.get_raw(&key).await? else {
                return Ok(false);
            };
            let mut record: RoomRecord = serde_json::from_str(&raw)?;
            mutate(&mut record);
            let swapped = self
                .store
                .compare_and_swap(&key, Some(&raw), serde_json::to_string(&record)?, ttl_secs)
                .await?;
            if swapped {
                return Ok(true);
            }
        }
        Err(EngineError::StoreConflict(key))
    }
}
