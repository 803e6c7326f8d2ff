//! Counter store backends for the sliding-window limiter.
//!
//! A counter store keeps one ordered set of admission timestamps per scope
//! key and must execute the prune-count-admit sequence of [`try_admit`]
//! atomically: two racing callers may never both observe `count < limit` and
//! both insert. The Redis backend gets this from a server-side script; the
//! in-memory backend from a mutex held across the whole operation.
//!
//! [`try_admit`]: CounterStore::try_admit

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Admissions left in the window after this one (0 when denied).
    pub remaining: u32,
    /// Milliseconds until the next slot frees up (0 when allowed).
    pub wait_ms: i64,
}

/// The counter store could not execute the operation.
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Shared admission counter with ordered-set semantics.
///
/// All timestamps are epoch milliseconds. `now_ms` is supplied by the caller
/// so that one clock reading covers the whole atomic operation (and so tests
/// can drive synthetic time).
#[async_trait]
pub trait CounterStore: Send + Sync + std::fmt::Debug {
    /// Atomically prune entries at or before `now_ms - window_ms`, count
    /// the remainder, and admit one more if the count is below `limit`.
    ///
    /// When denied, `wait_ms` is the time until the oldest surviving entry
    /// leaves the window, clamped to be non-negative; `window_ms` when the
    /// oldest entry cannot be read (racing with concurrent pruning).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the operation
    /// cannot be executed atomically.
    async fn try_admit(
        &self,
        key: &str,
        limit: u32,
        window_ms: i64,
        now_ms: i64,
    ) -> Result<RateLimitDecision, CounterError>;

    /// Count non-expired admissions for `key`, pruning lazily as a side
    /// effect. Never admits.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn count(&self, key: &str, window_ms: i64, now_ms: i64) -> Result<u64, CounterError>;

    /// Drop all window history for `key`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn clear(&self, key: &str) -> Result<(), CounterError>;
}

/// In-process counter store.
///
/// One mutex serialises every operation, which trivially satisfies the
/// atomicity requirement. Suitable for tests and single-process deployments;
/// a multi-process install needs the Redis backend.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, Vec<i64>>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn try_admit(
        &self,
        key: &str,
        limit: u32,
        window_ms: i64,
        now_ms: i64,
    ) -> Result<RateLimitDecision, CounterError> {
        let mut windows = self.windows.lock();
        let entries = windows.entry(key.to_string()).or_default();

        entries.retain(|&ts| ts > now_ms - window_ms);
        let count = u32::try_from(entries.len()).unwrap_or(u32::MAX);

        if count < limit {
            entries.push(now_ms);
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: limit - count - 1,
                wait_ms: 0,
            });
        }

        let wait_ms = entries.iter().min().map_or(window_ms, |&oldest| {
            (oldest + window_ms - now_ms).max(0)
        });

        Ok(RateLimitDecision {
            allowed: false,
            remaining: 0,
            wait_ms,
        })
    }

    async fn count(&self, key: &str, window_ms: i64, now_ms: i64) -> Result<u64, CounterError> {
        let mut windows = self.windows.lock();
        let Some(entries) = windows.get_mut(key) else {
            return Ok(0);
        };
        entries.retain(|&ts| ts > now_ms - window_ms);
        Ok(u64::try_from(entries.len()).unwrap_or(u64::MAX))
    }

    async fn clear(&self, key: &str) -> Result<(), CounterError> {
        self.windows.lock().remove(key);
        Ok(())
    }
}
