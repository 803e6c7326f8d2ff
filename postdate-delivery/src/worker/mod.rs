//! Delivery worker orchestration.
//!
//! The worker polls the job queue on an interval, claims whatever is due,
//! and drives each claimed job through the delivery state machine in
//! [`process`] with a bounded number of parallel slots.

mod process;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use postdate_common::{Signal, internal, tracing};
use postdate_store::EmailStore;
use serde::Deserialize;
use tokio::task::JoinSet;

use crate::error::DeliveryError;
use crate::limiter::RateLimiter;
use crate::queue::JobQueue;
use crate::transport::MailTransport;

const fn default_concurrency() -> usize {
    4
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_base_ms() -> u64 {
    1000 // 1 second
}

const fn default_backoff_max_ms() -> u64 {
    3_600_000 // 1 hour
}

const fn default_backoff_jitter() -> f64 {
    0.2 // ±20%
}

/// Worker tuning knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of jobs processed in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How often to poll the queue for due jobs (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of delivery attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff (in milliseconds)
    ///
    /// First retry will occur after this delay. Subsequent retries will
    /// double it (with jitter) up to `backoff_max_ms`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Maximum delay between retry attempts (in milliseconds)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Jitter factor for retry delays (0.0 to 1.0)
    ///
    /// Adds randomness to retry delays to prevent thundering herd.
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,

    /// Minimum spacing between consecutive successful sends from one slot
    /// (in milliseconds). 0 disables pacing.
    #[serde(default)]
    pub min_inter_send_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter: default_backoff_jitter(),
            min_inter_send_ms: 0,
        }
    }
}

/// Everything a worker slot needs to process a job.
#[derive(Debug)]
pub(crate) struct WorkerContext {
    pub(crate) config: WorkerConfig,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) store: Arc<dyn EmailStore>,
    pub(crate) limiter: RateLimiter,
    pub(crate) transport: Arc<dyn MailTransport>,
}

/// Worker pool draining the delivery queue.
#[derive(Debug)]
pub struct DeliveryWorker {
    ctx: Arc<WorkerContext>,
}

impl DeliveryWorker {
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        queue: Arc<JobQueue>,
        store: Arc<dyn EmailStore>,
        limiter: RateLimiter,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            ctx: Arc::new(WorkerContext {
                config,
                queue,
                store,
                limiter,
                transport,
            }),
        }
    }

    /// Run the worker until a shutdown signal arrives.
    ///
    /// Shutdown is only observed between drain passes, so every claimed job
    /// settles before the worker exits; nothing is left `Active`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker hits an unrecoverable internal fault.
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        internal!(
            "Delivery worker starting ({} slots, {}ms poll)",
            self.ctx.config.concurrency,
            self.ctx.config.poll_interval_ms
        );

        let mut timer =
            tokio::time::interval(Duration::from_millis(self.ctx.config.poll_interval_ms.max(1)));
        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.drive().await;
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Delivery worker received shutdown signal");
                            break;
                        }
                        Err(err) => {
                            tracing::error!("Delivery worker shutdown channel error: {err}");
                            break;
                        }
                    }
                }
            }
        }

        internal!("Delivery worker shutdown complete");
        Ok(())
    }

    /// Claim everything due right now and process it with bounded
    /// parallelism, refilling slots as jobs settle.
    async fn drive(&self) {
        let now_ms = Utc::now().timestamp_millis();
        let due = self.ctx.queue.claim_due(now_ms, usize::MAX);
        if due.is_empty() {
            return;
        }

        tracing::debug!(
            due_count = due.len(),
            slots = self.ctx.config.concurrency,
            "Processing due jobs"
        );

        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut pending = due.into_iter();

        for _ in 0..self.ctx.config.concurrency.max(1) {
            if let Some(job) = pending.next() {
                let ctx = Arc::clone(&self.ctx);
                join_set.spawn(async move {
                    process::run_one(&ctx, job).await;
                });
            }
        }

        // As slots free up, feed them the remaining jobs.
        while join_set.join_next().await.is_some() {
            if let Some(job) = pending.next() {
                let ctx = Arc::clone(&self.ctx);
                join_set.spawn(async move {
                    process::run_one(&ctx, job).await;
                });
            }
        }
    }

    /// One synchronous drain pass; exposed so embedders (and tests) can pump
    /// the worker without the interval loop.
    pub async fn drain_once(&self) {
        self.drive().await;
    }
}
