use std::sync::{Arc, LazyLock};

use postdate_common::{Signal, internal, logging, tracing};
use postdate_delivery::{
    CounterStore, DeliveryWorker, JobQueue, LoggingTransport, MemoryCounterStore, RateLimitConfig,
    RateLimiter, RedisCounterStore, Scheduler, WorkerConfig,
};
use postdate_store::MemoryEmailStore;
use serde::Deserialize;
use tokio::sync::broadcast;

/// Top-level runtime configuration, deserialized from the config file.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct Postdate {
    /// Redis connection URL for the shared rate-limit counters. When unset
    /// the limiter runs on an in-process store, which is only correct for a
    /// single-process deployment.
    redis_url: Option<String>,

    #[serde(alias = "rate_limit")]
    limiter: RateLimitConfig,

    #[serde(alias = "worker")]
    worker: WorkerConfig,
}

/// The wired-up runtime: the scheduling handle an embedding layer (HTTP API,
/// control socket) consumes, plus the worker pool that drains the queue.
pub struct Runtime {
    pub scheduler: Arc<Scheduler>,
    pub worker: DeliveryWorker,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(Signal::Finalised) => {
                        internal!("Worker drain finalised");
                        break;
                    }
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// Serve the worker, announcing its drain completion on the shutdown
/// channel so [`shutdown`] stops waiting.
async fn serve_worker(worker: &DeliveryWorker) -> anyhow::Result<()> {
    let ret = worker.serve(SHUTDOWN_BROADCAST.subscribe()).await;
    let _ = SHUTDOWN_BROADCAST.send(Signal::Finalised);
    ret.map_err(Into::into)
}

impl Postdate {
    /// Wire the store, counter store, limiter, queue, scheduler, and worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis counter store is configured but cannot
    /// be reached. An unreachable counter store is a deployment problem, so
    /// it surfaces here rather than silently failing open on every send.
    pub async fn build(self) -> anyhow::Result<Runtime> {
        let counters: Arc<dyn CounterStore> = match &self.redis_url {
            Some(url) => {
                internal!("Using Redis rate-limit counters at {url}");
                Arc::new(RedisCounterStore::connect(url).await?)
            }
            None => {
                internal!("Using in-process rate-limit counters");
                Arc::new(MemoryCounterStore::new())
            }
        };

        let limiter = RateLimiter::new(counters, self.limiter);
        let store = Arc::new(MemoryEmailStore::new());
        let queue = Arc::new(JobQueue::new());

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&queue),
            store.clone(),
            self.worker.max_attempts,
        ));

        let worker = DeliveryWorker::new(
            self.worker,
            queue,
            store,
            limiter,
            Arc::new(LoggingTransport::new()),
        );

        Ok(Runtime { scheduler, worker })
    }

    /// Run the delivery worker until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if wiring fails or the worker exits with a fault.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let runtime = self.build().await?;

        internal!("Controller running");

        let ret = tokio::select! {
            r = serve_worker(&runtime.worker) => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_with_defaults() {
        let config: Postdate = ron::from_str("()").unwrap();
        assert!(config.redis_url.is_none());
        assert_eq!(config.limiter.limit, 100);
        assert_eq!(config.worker.max_attempts, 3);
    }

    #[test]
    fn config_parses_explicit_values() {
        let config: Postdate = ron::from_str(
            r#"(
                redis_url: Some("redis://localhost:6379"),
                limiter: (limit: 10, window_ms: 60000),
                worker: (concurrency: 8, min_inter_send_ms: 250),
            )"#,
        )
        .unwrap();

        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.limiter.limit, 10);
        assert_eq!(config.limiter.window_ms, 60_000);
        assert_eq!(config.worker.concurrency, 8);
        assert_eq!(config.worker.min_inter_send_ms, 250);
    }

    #[tokio::test]
    async fn worker_announces_drain_completion() {
        let runtime = Postdate::default().build().await.unwrap();
        let mut receiver = SHUTDOWN_BROADCAST.subscribe();

        let handle = tokio::spawn(async move { serve_worker(&runtime.worker).await });

        // Let the worker subscribe before broadcasting.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        SHUTDOWN_BROADCAST.send(Signal::Shutdown).unwrap();

        loop {
            match receiver.recv().await.unwrap() {
                Signal::Finalised => break,
                Signal::Shutdown => {}
            }
        }

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn build_wires_an_in_memory_runtime() {
        let runtime = Postdate::default().build().await.unwrap();
        assert!(runtime.scheduler.status(postdate_common::EmailId::generate()).is_none());
    }
}
