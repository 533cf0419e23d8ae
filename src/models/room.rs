use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ContentItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Active,
    Matched,
    Cleaned,
}

/// Per-room bookkeeping record
///
/// Carries the pool key so the lifecycle manager can tear the cache down
/// without re-deriving criteria, plus the activity timestamp the inactivity
/// check reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: String,
    pub status: RoomStatus,
    pub pool_key: String,
    pub last_activity: DateTime<Utc>,
    pub cleanup_scheduled_at: Option<DateTime<Utc>>,
}

impl RoomRecord {
    pub fn new(room_id: impl Into<String>, pool_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            room_id: room_id.into(),
            status: RoomStatus::Active,
            pool_key: pool_key.into(),
            last_activity: now,
            cleanup_scheduled_at: None,
        }
    }
}

/// The shared cursor into a room's pool
///
/// Owned exclusively by the sequence allocator; every mutation goes through
/// a conditional update against the stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSequenceState {
    pub room_id: String,
    pub pool: Vec<ContentItem>,
    pub cursor: usize,
}

impl RoomSequenceState {
    pub fn new(room_id: impl Into<String>, pool: Vec<ContentItem>) -> Self {
        Self {
            room_id: room_id.into(),
            pool,
            cursor: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.pool.len()
    }

    pub fn is_valid(&self) -> bool {
        self.cursor <= self.pool.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanupReason {
    Matched,
    Inactive,
    Manual,
    Ttl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanupStatus {
    Scheduled,
    RetryScheduled,
    Failed,
    Done,
}

pub const MAX_CLEANUP_RETRIES: u32 = 3;

/// One scheduled teardown per room
///
/// Replaces any previous task for the room when created; the retry loop is
/// an explicit state machine driven by a poll-based scheduler rather than
/// in-process timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupTask {
    pub room_id: String,
    pub reason: CleanupReason,
    pub scheduled_at: DateTime<Utc>,
    pub execute_at: DateTime<Utc>,
    pub status: CleanupStatus,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl CleanupTask {
    pub fn new(
        room_id: impl Into<String>,
        reason: CleanupReason,
        now: DateTime<Utc>,
        delay: Duration,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            reason,
            scheduled_at: now,
            execute_at: now + delay,
            status: CleanupStatus::Scheduled,
            retry_count: 0,
            max_retries: MAX_CLEANUP_RETRIES,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.execute_at
    }

    /// Records a failed execution, moving to RETRY_SCHEDULED with exponential
    /// backoff or to FAILED once retries are exhausted.
    pub fn record_failure(&mut self, now: DateTime<Utc>, retry_base_secs: u64) {
        self.retry_count += 1;
        if self.retry_count < self.max_retries {
            let backoff = 2u64.pow(self.retry_count) * retry_base_secs;
            self.status = CleanupStatus::RetryScheduled;
            self.execute_at = now + Duration::seconds(backoff as i64);
        } else {
            self.status = CleanupStatus::Failed;
        }
    }
}

/// Audit record written after each successful teardown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupHistoryEntry {
    pub id: Uuid,
    pub room_id: String,
    pub reason: CleanupReason,
    pub pool_size: usize,
    pub cleaned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            title: id.to_string(),
            poster_path: None,
            overview: String::new(),
            genre_ids: vec![],
            rating: 5.0,
            release_date: None,
        }
    }

    #[test]
    fn test_sequence_state_exhaustion() {
        let mut state = RoomSequenceState::new("room-1", vec![item("a"), item("b")]);
        assert!(!state.is_exhausted());
        state.cursor = 2;
        assert!(state.is_exhausted());
        assert!(state.is_valid());
        state.cursor = 3;
        assert!(!state.is_valid());
    }

    #[test]
    fn test_cleanup_task_backoff_doubles() {
        let now = Utc::now();
        let mut task = CleanupTask::new("room-1", CleanupReason::Matched, now, Duration::zero());

        task.record_failure(now, 60);
        assert_eq!(task.status, CleanupStatus::RetryScheduled);
        assert_eq!(task.execute_at, now + Duration::seconds(120));

        task.record_failure(now, 60);
        assert_eq!(task.status, CleanupStatus::RetryScheduled);
        assert_eq!(task.execute_at, now + Duration::seconds(240));
    }

    #[test]
    fn test_cleanup_task_fails_after_max_retries() {
        let now = Utc::now();
        let mut task = CleanupTask::new("room-1", CleanupReason::Inactive, now, Duration::zero());

        for _ in 0..MAX_CLEANUP_RETRIES {
            task.record_failure(now, 60);
        }
        assert_eq!(task.status, CleanupStatus::Failed);
        assert_eq!(task.retry_count, MAX_CLEANUP_RETRIES);
    }

    #[test]
    fn test_task_due_check() {
        let now = Utc::now();
        let task = CleanupTask::new("room-1", CleanupReason::Matched, now, Duration::hours(1));
        assert!(!task.is_due(now));
        assert!(task.is_due(now + Duration::hours(1)));
    }
}
