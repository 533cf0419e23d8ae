use redis::{AsyncCommands, Client, Script};

use crate::error::EngineResult;

use super::StateStore;

/// Compare-and-swap as a single server-side script so concurrent writers
/// cannot interleave between the read and the write.
///
/// ARGV[1] = expected value, ARGV[2] = "1" when an expected value is given
/// ("0" means the key must be absent), ARGV[3] = new value, ARGV[4] = TTL in
/// seconds (0 = no expiry).
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
local matches
if ARGV[2] == '1' then
    matches = current == ARGV[1]
else
    matches = not current
end
if matches then
    if tonumber(ARGV[4]) > 0 then
        redis.call('SET', KEYS[1], ARGV[3], 'EX', tonumber(ARGV[4]))
    else
        redis.call('SET', KEYS[1], ARGV[3])
    end
    return 1
end
return 0
"#;

/// Redis-backed state store
///
/// Record TTLs use native `EX` expiry, which doubles as the last-resort
/// safety net when neither scheduled cleanup nor the sweep ever ran.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    pub fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl StateStore for RedisStore {
    async fn get_raw(&self, key: &str) -> EngineResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put_raw(&self, key: &str, value: String, ttl_secs: Option<u64>) -> EngineResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        match ttl_secs {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl_secs: Option<u64>,
    ) -> EngineResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let swapped: i64 = Script::new(CAS_SCRIPT)
            .key(key)
            .arg(expected.unwrap_or(""))
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(value)
            .arg(ttl_secs.unwrap_or(0))
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn delete(&self, key: &str) -> EngineResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> EngineResult<Vec<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}
