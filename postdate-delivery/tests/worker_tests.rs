//! Integration tests for the scheduling and delivery pipeline.
//!
//! These run the real scheduler, queue, limiter, and worker over in-memory
//! backends, with a mock transport standing in for the mail provider.
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use postdate_common::{Email, EmailStatus};
use postdate_delivery::{
    DeliveryWorker, JobQueue, JobState, JobStatus, MemoryCounterStore, RateLimitConfig,
    RateLimiter, Scheduler, WorkerConfig,
};
use postdate_store::EmailStore;
use support::{FailingEmailStore, MockTransport, default_harness, harness};

fn due_email(sender_id: &str) -> Email {
    Email::new(
        sender_id,
        "noreply@example.com",
        "someone@example.org",
        "Reminder",
        "<p>Hello</p>",
        Utc::now(),
    )
}

#[tokio::test]
async fn delivers_a_due_email_end_to_end() {
    let h = default_harness();
    let email = due_email("u1");
    let id = email.id;

    h.store.insert(email.clone()).await.unwrap();
    h.scheduler.schedule(&email);
    h.worker.drain_once().await;

    let record = h.store.find(&id).await.unwrap().unwrap();
    assert_eq!(record.status, EmailStatus::Sent);
    assert!(record.sent_at.is_some());
    assert_eq!(record.tracking_ref.as_deref(), Some("mock-ref"));

    assert_eq!(h.transport.calls(), 1);
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn future_emails_are_not_touched() {
    let h = default_harness();
    let mut email = due_email("u1");
    email.scheduled_at = Utc::now() + chrono::Duration::seconds(60);
    let id = email.id;

    h.store.insert(email.clone()).await.unwrap();
    h.scheduler.schedule(&email);
    h.worker.drain_once().await;

    assert_eq!(h.transport.calls(), 0);
    assert_eq!(h.scheduler.status(id), Some(JobStatus::Delayed));
    assert_eq!(
        h.store.find(&id).await.unwrap().unwrap().status,
        EmailStatus::Scheduled
    );
}

#[tokio::test]
async fn already_sent_email_is_never_resent() {
    let h = default_harness();
    let mut email = due_email("u1");
    email.status = EmailStatus::Sent;
    let id = email.id;

    h.store.insert(email.clone()).await.unwrap();
    // A stale duplicate job, as left behind by a crashed worker.
    h.scheduler.schedule(&email);
    h.worker.drain_once().await;

    assert_eq!(h.transport.calls(), 0);
    assert!(h.queue.is_empty());
    let record = h.store.find(&id).await.unwrap().unwrap();
    assert_eq!(record.status, EmailStatus::Sent);
    assert!(record.error_message.is_none());
}

#[tokio::test]
async fn cancelled_email_is_acked_without_side_effects() {
    let h = default_harness();
    let mut email = due_email("u1");
    email.status = EmailStatus::Cancelled;

    h.store.insert(email.clone()).await.unwrap();
    h.scheduler.schedule(&email);
    h.worker.drain_once().await;

    assert_eq!(h.transport.calls(), 0);
    assert!(h.queue.is_empty());
    assert_eq!(
        h.store.find(&email.id).await.unwrap().unwrap().status,
        EmailStatus::Cancelled
    );
}

#[tokio::test]
async fn missing_email_record_discards_the_job() {
    let h = default_harness();
    let email = due_email("u1");

    // Never inserted into the store.
    h.scheduler.schedule(&email);
    h.worker.drain_once().await;

    assert_eq!(h.transport.calls(), 0);
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn throttled_job_is_redelayed_without_consuming_an_attempt() {
    let h = harness(
        WorkerConfig::default(),
        RateLimitConfig {
            limit: 1,
            window_ms: 3_600_000,
        },
    );

    let first = due_email("u1");
    let second = due_email("u1");
    h.store.insert(first.clone()).await.unwrap();
    h.store.insert(second.clone()).await.unwrap();
    h.scheduler.schedule(&first);
    h.scheduler.schedule(&second);

    let before_ms = Utc::now().timestamp_millis();
    h.worker.drain_once().await;

    // Exactly one send went through the ceiling.
    assert_eq!(h.transport.calls(), 1);

    let statuses = [
        h.store.find(&first.id).await.unwrap().unwrap().status,
        h.store.find(&second.id).await.unwrap().unwrap().status,
    ];
    assert!(statuses.contains(&EmailStatus::Sent));
    assert!(statuses.contains(&EmailStatus::Scheduled));

    // The throttled job is parked, budget intact.
    assert_eq!(h.queue.len(), 1);
    let parked = if statuses[0] == EmailStatus::Sent {
        h.queue.get(second.id).unwrap()
    } else {
        h.queue.get(first.id).unwrap()
    };
    assert_eq!(parked.state, JobState::Delayed);
    assert_eq!(parked.attempts_made, 0);
    assert!(parked.run_at_ms >= before_ms + 1_000);
}

#[tokio::test]
async fn transient_failures_retry_and_then_succeed() {
    let h = harness(
        WorkerConfig {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 10,
            backoff_jitter: 0.0,
            ..WorkerConfig::default()
        },
        RateLimitConfig {
            limit: 10_000,
            window_ms: 3_600_000,
        },
    );

    let email = due_email("u1");
    let id = email.id;
    h.store.insert(email.clone()).await.unwrap();
    h.transport.push_failure("451 greylisted");
    h.transport.push_failure("451 greylisted");
    h.transport.push_success("provider-42");
    h.scheduler.schedule(&email);

    h.worker.drain_once().await;
    let job = h.queue.get(id).unwrap();
    assert_eq!(job.attempts_made, 1);
    assert_eq!(job.last_error.as_deref(), Some("451 greylisted"));
    // A pending retry is SCHEDULED, never externally FAILED.
    assert_eq!(
        h.store.find(&id).await.unwrap().unwrap().status,
        EmailStatus::Scheduled
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    h.worker.drain_once().await;
    assert_eq!(h.queue.get(id).unwrap().attempts_made, 2);

    tokio::time::sleep(Duration::from_millis(20)).await;
    h.worker.drain_once().await;

    let record = h.store.find(&id).await.unwrap().unwrap();
    assert_eq!(record.status, EmailStatus::Sent);
    assert_eq!(record.tracking_ref.as_deref(), Some("provider-42"));
    assert_eq!(h.transport.calls(), 3);
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn exhausted_attempts_mark_the_email_failed() {
    let h = harness(
        WorkerConfig {
            max_attempts: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 10,
            backoff_jitter: 0.0,
            ..WorkerConfig::default()
        },
        RateLimitConfig {
            limit: 10_000,
            window_ms: 3_600_000,
        },
    );

    let email = due_email("u1");
    let id = email.id;
    h.store.insert(email.clone()).await.unwrap();
    h.transport.push_failure("550 mailbox unavailable");
    h.transport.push_failure("550 mailbox unavailable");
    h.scheduler.schedule(&email);

    h.worker.drain_once().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.worker.drain_once().await;

    let record = h.store.find(&id).await.unwrap().unwrap();
    assert_eq!(record.status, EmailStatus::Failed);
    assert_eq!(
        record.error_message.as_deref(),
        Some("550 mailbox unavailable")
    );

    // The terminal job stays queryable.
    assert_eq!(h.scheduler.status(id), Some(JobStatus::Failed));
    assert_eq!(h.transport.calls(), 2);
}

#[tokio::test]
async fn store_outage_retries_are_bounded_by_the_attempt_budget() {
    let queue = Arc::new(JobQueue::new());
    let store = Arc::new(FailingEmailStore);
    let transport = Arc::new(MockTransport::new());
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        RateLimitConfig {
            limit: 10_000,
            window_ms: 3_600_000,
        },
    );
    let scheduler = Scheduler::new(Arc::clone(&queue), store.clone(), 3);
    let worker = DeliveryWorker::new(
        WorkerConfig {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 10,
            backoff_jitter: 0.0,
            ..WorkerConfig::default()
        },
        Arc::clone(&queue),
        store,
        limiter,
        Arc::clone(&transport) as Arc<dyn postdate_delivery::MailTransport>,
    );

    let email = due_email("u1");
    let id = email.id;
    scheduler.schedule(&email);

    worker.drain_once().await;
    let job = queue.get(id).unwrap();
    assert_eq!(job.attempts_made, 1);
    assert!(
        job.last_error
            .as_deref()
            .unwrap()
            .contains("store lookup failed")
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    worker.drain_once().await;
    assert_eq!(queue.get(id).unwrap().attempts_made, 2);

    // Third pass exhausts the budget; the job goes terminal instead of
    // looping forever against the broken store.
    tokio::time::sleep(Duration::from_millis(20)).await;
    worker.drain_once().await;

    let job = queue.get(id).unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts_made, 2);
    assert_eq!(scheduler.status(id), Some(JobStatus::Failed));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn cancel_before_claim_prevents_the_send() {
    let h = default_harness();
    let mut email = due_email("u1");
    email.scheduled_at = Utc::now() + chrono::Duration::seconds(60);
    let id = email.id;

    h.store.insert(email.clone()).await.unwrap();
    h.scheduler.schedule(&email);

    assert!(h.scheduler.cancel(id).await.unwrap());
    h.worker.drain_once().await;

    assert_eq!(h.transport.calls(), 0);
    assert!(h.queue.is_empty());
    assert_eq!(
        h.store.find(&id).await.unwrap().unwrap().status,
        EmailStatus::Cancelled
    );
}

#[tokio::test]
async fn cancel_after_claim_reports_too_late() {
    let h = default_harness();
    let email = due_email("u1");
    let id = email.id;

    h.store.insert(email.clone()).await.unwrap();
    h.scheduler.schedule(&email);

    // Claim the job the way a worker slot would, then race the cancel.
    let claimed = h.queue.claim_due(Utc::now().timestamp_millis(), 1);
    assert_eq!(claimed.len(), 1);

    assert!(!h.scheduler.cancel(id).await.unwrap());
    assert_eq!(h.queue.len(), 1);
}

#[tokio::test]
async fn pacing_spaces_out_consecutive_sends() {
    let h = harness(
        WorkerConfig {
            concurrency: 1,
            min_inter_send_ms: 50,
            ..WorkerConfig::default()
        },
        RateLimitConfig {
            limit: 10_000,
            window_ms: 3_600_000,
        },
    );

    for _ in 0..2 {
        let email = due_email("u1");
        h.store.insert(email.clone()).await.unwrap();
        h.scheduler.schedule(&email);
    }

    h.worker.drain_once().await;

    let times = h.transport.call_times();
    assert_eq!(times.len(), 2);
    assert!(times[1].duration_since(times[0]) >= Duration::from_millis(50));
}
