//! Redis-backed counter store.
//!
//! One sorted set per scope key holds the admission timestamps; the whole
//! prune-count-admit sequence runs as a single server-side Lua script, so no
//! two concurrent callers can both observe `count < limit` and both admit.
//! The member inserted for an admission is `"{now}-{nonce}"` since two
//! admits can land on the same millisecond.

use std::fmt;

use async_trait::async_trait;
use rand::Rng;
use redis::Script;

use super::store::{CounterError, CounterStore, RateLimitDecision};

const ADMIT_SCRIPT: &str = r"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local nonce = ARGV[4]

-- Remove entries that have left the window
redis.call('ZREMRANGEBYSCORE', key, 0, now - window)

local count = redis.call('ZCARD', key)

if count < limit then
  redis.call('ZADD', key, now, now .. '-' .. nonce)
  redis.call('EXPIRE', key, math.ceil(window / 1000))
  return {1, limit - count - 1, 0}
else
  local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
  if oldest and #oldest >= 2 then
    local wait = math.ceil(tonumber(oldest[2]) + window - now)
    if wait < 0 then
      wait = 0
    end
    return {0, 0, wait}
  else
    return {0, 0, window}
  end
end
";

/// Counter store backed by a shared Redis instance.
///
/// The connection manager reconnects transparently; per-call failures are
/// surfaced as [`CounterError::Unavailable`] and left to the limiter's
/// fail-open policy.
#[derive(Clone)]
pub struct RedisCounterStore {
    manager: redis::aio::ConnectionManager,
    script: Script,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the initial connection
    /// cannot be established. Startup fails fast here; fail-open only covers
    /// failures after the store was reachable once.
    pub async fn connect(url: &str) -> Result<Self, CounterError> {
        let client =
            redis::Client::open(url).map_err(|e| CounterError::Unavailable(e.to_string()))?;
        let manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| CounterError::Unavailable(e.to_string()))?;

        Ok(Self {
            manager,
            script: Script::new(ADMIT_SCRIPT),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn try_admit(
        &self,
        key: &str,
        limit: u32,
        window_ms: i64,
        now_ms: i64,
    ) -> Result<RateLimitDecision, CounterError> {
        let nonce: u32 = rand::rng().random_range(0..1_000_000);
        let mut conn = self.manager.clone();

        let (allowed, remaining, wait_ms): (i64, i64, i64) = self
            .script
            .key(key)
            .arg(limit)
            .arg(window_ms)
            .arg(now_ms)
            .arg(nonce)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CounterError::Unavailable(e.to_string()))?;

        Ok(RateLimitDecision {
            allowed: allowed == 1,
            remaining: u32::try_from(remaining).unwrap_or(0),
            wait_ms,
        })
    }

    async fn count(&self, key: &str, window_ms: i64, now_ms: i64) -> Result<u64, CounterError> {
        let mut conn = self.manager.clone();

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(key, 0, now_ms - window_ms)
            .ignore()
            .zcard(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CounterError::Unavailable(e.to_string()))?;

        Ok(count)
    }

    async fn clear(&self, key: &str) -> Result<(), CounterError> {
        let mut conn = self.manager.clone();

        let () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CounterError::Unavailable(e.to_string()))?;

        Ok(())
    }
}
