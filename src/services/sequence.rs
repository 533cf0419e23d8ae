use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::models::{ContentItem, RoomRecord, RoomSequenceState};
use crate::store::{StateStore, StoreKey};

/// Attempts before a cursor conflict is surfaced to the caller
const MAX_CAS_ATTEMPTS: u32 = 8;

/// One candidate dealt from a room's pool
#[derive(Debug, Clone, PartialEq)]
pub struct DealtItem {
    pub item: ContentItem,
    pub sequence_index: usize,
}

/// Lifecycle phase of a room's sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePhase {
    Uninitialized,
    Active,
    Exhausted,
}

/// Deals candidates from a room's pool in one global order
///
/// Every advance is a conditional update on the stored cursor record, so
/// concurrent callers from independent invocations never observe the same
/// index and never skip one. Conflicts retry with a short randomized backoff.
pub struct SequenceAllocator<S: StateStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: StateStore> SequenceAllocator<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Atomically deals the next candidate for the room.
    ///
    /// Returns `None` once the pool is exhausted; that is a terminal state,
    /// not an error. A room with no materialized pool is a validation error.
    pub async fn next_for(&self, room_id: &str) -> EngineResult<Option<DealtItem>> {
        let key = StoreKey::Sequence(room_id.to_string()).to_string();

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let raw = self.store.get_raw(&key).await?.ok_or_else(|| {
                EngineError::Validation(format!("no pool materialized for room {}", room_id))
            })?;
            let mut state: RoomSequenceState = serde_json::from_str(&raw)?;

            if state.is_exhausted() {
                return Ok(None);
            }

            let index = state.cursor;
            let item = state.pool[index].clone();
            state.cursor += 1;

            let swapped = self
                .store
                .compare_and_swap(&key, Some(&raw), serde_json::to_string(&state)?, None)
                .await?;

            if swapped {
                self.touch_room(room_id).await;
                tracing::debug!(room_id = %room_id, sequence_index = index, "Candidate dealt");
                return Ok(Some(DealtItem {
                    item,
                    sequence_index: index,
                }));
            }

            tracing::debug!(
                room_id = %room_id,
                attempt,
                "Cursor write conflict, retrying"
            );
            let jitter_ms: u64 = rand::thread_rng().gen_range(1..=10);
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
        }

        Err(EngineError::StoreConflict(key))
    }

    /// Current cursor position for the room
    pub async fn current_index(&self, room_id: &str) -> EngineResult<usize> {
        Ok(self.state(room_id).await?.cursor)
    }

    /// Administrative cursor override, e.g. re-sync after a disconnection.
    ///
    /// Does not replay already-dealt items; it only repositions the shared
    /// pointer.
    pub async fn reset(&self, room_id: &str, index: usize) -> EngineResult<()> {
        let key = StoreKey::Sequence(room_id.to_string()).to_string();

        for _ in 0..MAX_CAS_ATTEMPTS {
            let raw = self.store.get_raw(&key).await?.ok_or_else(|| {
                EngineError::Validation(format!("no pool materialized for room {}", room_id))
            })?;
            let mut state: RoomSequenceState = serde_json::from_str(&raw)?;

            if index > state.pool.len() {
                return Err(EngineError::Validation(format!(
                    "index {} out of range for pool of {}",
                    index,
                    state.pool.len()
                )));
            }
            state.cursor = index;

            let swapped = self
                .store
                .compare_and_swap(&key, Some(&raw), serde_json::to_string(&state)?, None)
                .await?;
            if swapped {
                tracing::info!(room_id = %room_id, cursor = index, "Sequence cursor reset");
                return Ok(());
            }
        }

        Err(EngineError::StoreConflict(key))
    }

    /// Whether the stored cursor is within bounds
    pub async fn validate(&self, room_id: &str) -> EngineResult<bool> {
        Ok(self.state(room_id).await?.is_valid())
    }

    pub async fn phase(&self, room_id: &str) -> EngineResult<SequencePhase> {
        let key = StoreKey::Sequence(room_id.to_string()).to_string();
        match self.store.get_raw(&key).await? {
            None => Ok(SequencePhase::Uninitialized),
            Some(raw) => {
                let state: RoomSequenceState = serde_json::from_str(&raw)?;
                if state.is_exhausted() {
                    Ok(SequencePhase::Exhausted)
                } else {
                    Ok(SequencePhase::Active)
                }
            }
        }
    }

    async fn state(&self, room_id: &str) -> EngineResult<RoomSequenceState> {
        let key = StoreKey::Sequence(room_id.to_string()).to_string();
        let raw = self.store.get_raw(&key).await?.ok_or_else(|| {
            EngineError::Validation(format!("no pool materialized for room {}", room_id))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Refreshes the room's last-activity timestamp; best effort, a failed
    /// update here only delays inactivity detection.
    ///
    /// Goes through a conditional update so a touch racing a status change
    /// never writes the stale status back.
    async fn touch_room(&self, room_id: &str) {
        let key = StoreKey::Room(room_id.to_string()).to_string();
        let result: EngineResult<()> = async {
            for _ in 0..MAX_CAS_ATTEMPTS {
                let Some(raw) = self.store.get_raw(&key).await? else {
                    return Ok(());
                };
                let mut record: RoomRecord = serde_json::from_str(&raw)?;
                record.last_activity = self.clock.now();
                let swapped = self
                    .store
                    .compare_and_swap(&key, Some(&raw), serde_json::to_string(&record)?, None)
                    .await?;
                if swapped {
                    return Ok(());
                }
            }
            Err(EngineError::StoreConflict(key))
        }
        .await;

        if let Err(error) = result {
            tracing::warn!(room_id = %room_id, %error, "Failed to refresh room activity");
        }
    }
}
