//! Test support utilities for the delivery pipeline tests.
//!
//! Provides a programmable mock transport and a fully wired harness (queue,
//! in-memory stores, scheduler, worker) that tests pump by hand via
//! `drain_once`, so no timing depends on the worker's poll interval.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use postdate_common::{Email, EmailId, EmailStatus, StatusUpdate};
use postdate_delivery::{
    DeliveryWorker, JobQueue, MailTransport, MemoryCounterStore, RateLimitConfig, RateLimiter,
    Scheduler, SendReceipt, SendRequest, TransportError, WorkerConfig,
};
use postdate_store::{EmailStore, MemoryEmailStore, StoreError};

/// Transport double with a programmable outcome queue.
///
/// Outcomes are consumed in order; once the queue is empty every send
/// succeeds. Each call is counted and timestamped.
#[derive(Debug, Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<Result<SendReceipt, TransportError>>>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for an upcoming send.
    pub fn push_failure(&self, message: &str) {
        self.outcomes
            .lock()
            .push_back(Err(TransportError::new(message)));
    }

    /// Queue a success with the given tracking reference.
    pub fn push_success(&self, tracking_ref: &str) {
        self.outcomes.lock().push_back(Ok(SendReceipt {
            tracking_ref: Some(tracking_ref.to_string()),
        }));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(&self, _request: &SendRequest) -> Result<SendReceipt, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().push(Instant::now());

        self.outcomes.lock().pop_front().unwrap_or_else(|| {
            Ok(SendReceipt {
                tracking_ref: Some("mock-ref".to_string()),
            })
        })
    }
}

/// Email store double where every operation fails, simulating a database
/// outage.
#[derive(Debug, Default)]
pub struct FailingEmailStore;

#[async_trait]
impl EmailStore for FailingEmailStore {
    async fn insert(&self, _email: Email) -> postdate_store::Result<()> {
        Err(StoreError::Backend("connection reset".to_string()))
    }

    async fn find(&self, _id: &EmailId) -> postdate_store::Result<Option<Email>> {
        Err(StoreError::Backend("connection reset".to_string()))
    }

    async fn update(&self, _id: &EmailId, _update: StatusUpdate) -> postdate_store::Result<()> {
        Err(StoreError::Backend("connection reset".to_string()))
    }

    async fn update_if(
        &self,
        _id: &EmailId,
        _expected: EmailStatus,
        _update: StatusUpdate,
    ) -> postdate_store::Result<bool> {
        Err(StoreError::Backend("connection reset".to_string()))
    }
}

/// A fully wired delivery pipeline over in-memory backends.
pub struct Harness {
    pub queue: Arc<JobQueue>,
    pub store: Arc<MemoryEmailStore>,
    pub transport: Arc<MockTransport>,
    pub scheduler: Scheduler,
    pub worker: DeliveryWorker,
}

pub fn harness(worker_config: WorkerConfig, limiter_config: RateLimitConfig) -> Harness {
    let queue = Arc::new(JobQueue::new());
    let store = Arc::new(MemoryEmailStore::new());
    let transport = Arc::new(MockTransport::new());
    let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()), limiter_config);

    let scheduler = Scheduler::new(
        Arc::clone(&queue),
        store.clone(),
        worker_config.max_attempts,
    );

    let worker = DeliveryWorker::new(
        worker_config,
        Arc::clone(&queue),
        store.clone(),
        limiter,
        Arc::clone(&transport) as Arc<dyn MailTransport>,
    );

    Harness {
        queue,
        store,
        transport,
        scheduler,
        worker,
    }
}

/// Harness with the default worker config and an effectively unlimited rate
/// ceiling.
pub fn default_harness() -> Harness {
    harness(
        WorkerConfig::default(),
        RateLimitConfig {
            limit: 10_000,
            window_ms: 3_600_000,
        },
    )
}
