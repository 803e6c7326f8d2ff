//! Scheduling operations over the job queue.
//!
//! The scheduler turns a persisted email record into a delayed job and
//! offers the cancellation and status operations the outer CRUD layer needs.
//! It never sends anything itself; the worker does that.

use std::sync::Arc;

use chrono::Utc;
use postdate_common::{Email, EmailId, EmailStatus, StatusUpdate, internal};
use postdate_store::{EmailStore, StoreError};

use crate::error::DeliveryError;
use crate::queue::JobQueue;
use crate::types::{Job, JobStatus};

#[derive(Debug)]
pub struct Scheduler {
    queue: Arc<JobQueue>,
    store: Arc<dyn EmailStore>,
    max_attempts: u32,
}

impl Scheduler {
    #[must_use]
    pub fn new(queue: Arc<JobQueue>, store: Arc<dyn EmailStore>, max_attempts: u32) -> Self {
        Self {
            queue,
            store,
            max_attempts,
        }
    }

    /// Enqueue a delayed send for `email`, due at its `scheduled_at`.
    ///
    /// A send time in the past runs as soon as a worker slot frees up.
    /// Scheduling the same email again replaces its pending job, so the
    /// latest call wins; at most one job per email ever exists.
    pub fn schedule(&self, email: &Email) -> EmailId {
        let now_ms = Utc::now().timestamp_millis();
        let delay_ms = (email.scheduled_at.timestamp_millis() - now_ms).max(0);
        let run_at_ms = now_ms + delay_ms;

        internal!(
            "Scheduling email {} for {} (delay {delay_ms}ms)",
            email.id,
            email.recipient
        );

        self.queue.enqueue(Job::new(email, run_at_ms, self.max_attempts));
        email.id
    }

    /// Cancel a scheduled email before it is claimed.
    ///
    /// The record is marked `CANCELLED` first, then the pending job is
    /// removed; between those two steps a worker may still claim the job,
    /// in which case its idempotency gate sees the final status and acks
    /// without sending. Returns `true` if a pending job was removed. Once a
    /// worker holds the job the cancellation is too late and the in-flight
    /// attempt runs to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the email record store fails.
    pub async fn cancel(&self, id: EmailId) -> Result<bool, DeliveryError> {
        let cancelled = match self
            .store
            .update_if(
                &id,
                EmailStatus::Scheduled,
                StatusUpdate::to(EmailStatus::Cancelled),
            )
            .await
        {
            Ok(applied) => applied,
            // Nothing to cancel.
            Err(StoreError::NotFound(_)) => false,
            Err(err) => return Err(err.into()),
        };

        if !cancelled {
            return Ok(false);
        }

        let removed = self.queue.remove_pending(id);
        internal!("Cancelled email {id} (pending job removed: {removed})");
        Ok(removed)
    }

    /// Public status of the job for `id`, if one exists.
    #[must_use]
    pub fn status(&self, id: EmailId) -> Option<JobStatus> {
        self.queue.status(id, Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};
    use postdate_store::MemoryEmailStore;

    use super::*;

    fn scheduler() -> (Scheduler, Arc<JobQueue>, Arc<MemoryEmailStore>) {
        let queue = Arc::new(JobQueue::new());
        let store = Arc::new(MemoryEmailStore::new());
        (
            Scheduler::new(Arc::clone(&queue), store.clone(), 3),
            queue,
            store,
        )
    }

    #[tokio::test]
    async fn schedule_parks_the_job_until_the_send_time() {
        let (scheduler, queue, _) = scheduler();
        let email = Email::new(
            "u1",
            "a@b.c",
            "d@e.f",
            "s",
            "b",
            Utc::now() + Duration::seconds(60),
        );

        let id = scheduler.schedule(&email);
        let job = queue.get(id).unwrap();

        let expected = Utc::now().timestamp_millis() + 60_000;
        assert!((job.run_at_ms - expected).abs() < 1_000);
        assert_eq!(scheduler.status(id), Some(JobStatus::Delayed));
    }

    #[tokio::test]
    async fn past_send_times_are_due_immediately() {
        let (scheduler, queue, _) = scheduler();
        let email = Email::new(
            "u1",
            "a@b.c",
            "d@e.f",
            "s",
            "b",
            Utc::now() - Duration::seconds(60),
        );

        let id = scheduler.schedule(&email);
        let job = queue.get(id).unwrap();
        assert!(job.run_at_ms <= Utc::now().timestamp_millis());
        assert_eq!(scheduler.status(id), Some(JobStatus::Waiting));
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_pending_job() {
        let (scheduler, queue, _) = scheduler();
        let mut email = Email::new(
            "u1",
            "a@b.c",
            "d@e.f",
            "s",
            "b",
            Utc::now() + Duration::seconds(60),
        );

        scheduler.schedule(&email);
        email.scheduled_at = Utc::now() + Duration::seconds(600);
        let id = scheduler.schedule(&email);

        assert_eq!(queue.len(), 1);
        let job = queue.get(id).unwrap();
        assert!(job.run_at_ms > Utc::now().timestamp_millis() + 500_000);
    }

    #[tokio::test]
    async fn cancel_marks_the_record_and_removes_the_job() {
        let (scheduler, queue, store) = scheduler();
        let email = Email::new(
            "u1",
            "a@b.c",
            "d@e.f",
            "s",
            "b",
            Utc::now() + Duration::seconds(60),
        );
        store.insert(email.clone()).await.unwrap();
        let id = scheduler.schedule(&email);

        assert!(scheduler.cancel(id).await.unwrap());
        assert!(queue.is_empty());
        assert_eq!(
            store.find(&id).await.unwrap().unwrap().status,
            EmailStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn cancel_of_a_sent_email_is_refused() {
        let (scheduler, _, store) = scheduler();
        let mut email = Email::new("u1", "a@b.c", "d@e.f", "s", "b", Utc::now());
        email.status = EmailStatus::Sent;
        let id = email.id;
        store.insert(email).await.unwrap();

        assert!(!scheduler.cancel(id).await.unwrap());
        assert_eq!(
            store.find(&id).await.unwrap().unwrap().status,
            EmailStatus::Sent
        );
    }
}
