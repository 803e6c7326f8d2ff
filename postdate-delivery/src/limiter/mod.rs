//! Sliding-window rate limiting.
//!
//! The limiter answers one question for the worker: may the owner of this
//! scope key send another email right now? Checking and recording an
//! admission is a single atomic operation on the [`CounterStore`], so the
//! ceiling holds across every worker slot (and every process, with the Redis
//! backend) without coordination between callers.
//!
//! When the counter store itself is unreachable the limiter fails open: an
//! infrastructure outage must not silently stop all outbound mail. The
//! denial path only ever delays a send, never drops it.

mod redis;
mod store;

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::warn;

pub use self::redis::RedisCounterStore;
pub use self::store::{CounterError, CounterStore, MemoryCounterStore, RateLimitDecision};

const KEY_PREFIX: &str = "ratelimit:";

const fn default_limit() -> u32 {
    100
}

// One hour
const fn default_window_ms() -> i64 {
    3_600_000
}

/// Ceiling configuration shared by every scope key.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum admissions per window.
    pub limit: u32,
    /// Window length in milliseconds.
    pub window_ms: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
        }
    }
}

/// Sliding-window limiter over a shared counter store.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Check whether `key` may be admitted, recording the admission if so.
    ///
    /// A counter store failure is logged and treated as allowed.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        let now_ms = Utc::now().timestamp_millis();

        match self
            .store
            .try_admit(
                &self.scoped(key),
                self.config.limit,
                self.config.window_ms,
                now_ms,
            )
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    key = %key,
                    error = %err,
                    "Rate limiter unavailable, allowing send"
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: 0,
                    wait_ms: 0,
                }
            }
        }
    }

    /// Current admission count for `key` within the window.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter store is unavailable. Unlike
    /// [`check`](Self::check), a read-only query has no send to protect and
    /// does not fail open.
    pub async fn current_count(&self, key: &str) -> Result<u64, CounterError> {
        let now_ms = Utc::now().timestamp_millis();
        self.store
            .count(&self.scoped(key), self.config.window_ms, now_ms)
            .await
    }

    /// Forget all window history for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter store is unavailable.
    pub async fn reset(&self, key: &str) -> Result<(), CounterError> {
        self.store.clear(&self.scoped(key)).await
    }

    fn scoped(&self, key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}
