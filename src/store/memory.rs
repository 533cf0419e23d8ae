use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::{EngineError, EngineResult};

use super::StateStore;

#[derive(Debug, Clone)]
struct Record {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory state store for tests and local development
///
/// Honors the same compare-and-swap and TTL contract as the Redis store so
/// the engine behaves identically against either backend.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, Record>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(records: &HashMap<String, Record>, key: &str) -> Option<String> {
        records.get(key).and_then(|record| {
            match record.expires_at {
                Some(expires_at) if Utc::now() >= expires_at => None,
                _ => Some(record.value.clone()),
            }
        })
    }

    fn lock(&self) -> EngineResult<std::sync::MutexGuard<'_, HashMap<String, Record>>> {
        self.records
            .lock()
            .map_err(|_| EngineError::Internal("in-memory store lock poisoned".into()))
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStore {
    async fn get_raw(&self, key: &str) -> EngineResult<Option<String>> {
        let records = self.lock()?;
        Ok(Self::live_value(&records, key))
    }

    async fn put_raw(&self, key: &str, value: String, ttl_secs: Option<u64>) -> EngineResult<()> {
        let mut records = self.lock()?;
        records.insert(
            key.to_string(),
            Record {
                value,
                expires_at: ttl_secs.map(|ttl| Utc::now() + Duration::seconds(ttl as i64)),
            },
        );
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl_secs: Option<u64>,
    ) -> EngineResult<bool> {
        let mut records = self.lock()?;
        let current = Self::live_value(&records, key);
        let matches = match expected {
            Some(expected) => current.as_deref() == Some(expected),
            None => current.is_none(),
        };
        if matches {
            records.insert(
                key.to_string(),
                Record {
                    value,
                    expires_at: ttl_secs.map(|ttl| Utc::now() + Duration::seconds(ttl as i64)),
                },
            );
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> EngineResult<bool> {
        let mut records = self.lock()?;
        Ok(records.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> EngineResult<Vec<String>> {
        let records = self.lock()?;
        Ok(records
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| Self::live_value(&records, key).is_some())
            .cloned()
            .collect())
    }
}
