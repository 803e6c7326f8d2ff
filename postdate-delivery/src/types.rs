//! Type definitions for the delivery job queue.

use chrono::Utc;
use postdate_common::{Email, EmailId};
use serde::{Deserialize, Serialize};

/// Denormalised email fields carried in the job so a send needs no second
/// fetch of the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    /// The owning sender; the worker derives the rate-limit scope key
    /// (`user:<sender_id>`) from this.
    pub sender_id: String,
    pub from: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl From<&Email> for JobPayload {
    fn from(email: &Email) -> Self {
        Self {
            sender_id: email.sender_id.clone(),
            from: email.from.clone(),
            recipient: email.recipient.clone(),
            subject: email.subject.clone(),
            body: email.body.clone(),
        }
    }
}

/// Internal lifecycle state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Parked until `run_at_ms`; eligible for claiming once that time has
    /// passed.
    Delayed,
    /// Claimed by exactly one worker slot.
    Active,
    /// All attempts exhausted. Terminal; kept for status queries.
    Failed,
}

/// Read-only projection of a job's lifecycle, for display purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Parked, due time not yet reached.
    Delayed,
    /// Due and waiting for a free worker slot.
    Waiting,
    /// Being processed by a worker slot.
    Active,
    /// Exhausted its attempt budget.
    Failed,
}

/// A delivery job.
///
/// Its id IS the email id; that is the deduplication key enforcing the
/// one-job-per-email invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: EmailId,
    pub payload: JobPayload,
    pub state: JobState,
    /// Epoch milliseconds before which this job must not run.
    pub run_at_ms: i64,
    /// Completed delivery attempts. A throttled re-delay never increments
    /// this; only a failed send does.
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at_ms: i64,
}

impl Job {
    /// Build a delayed job for the given email, due at `run_at_ms`.
    #[must_use]
    pub fn new(email: &Email, run_at_ms: i64, max_attempts: u32) -> Self {
        Self {
            id: email.id,
            payload: JobPayload::from(email),
            state: JobState::Delayed,
            run_at_ms,
            attempts_made: 0,
            max_attempts,
            last_error: None,
            enqueued_at_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Project the internal state onto the public [`JobStatus`] as of
    /// `now_ms`.
    #[must_use]
    pub fn status(&self, now_ms: i64) -> JobStatus {
        match self.state {
            JobState::Delayed if now_ms < self.run_at_ms => JobStatus::Delayed,
            JobState::Delayed => JobStatus::Waiting,
            JobState::Active => JobStatus::Active,
            JobState::Failed => JobStatus::Failed,
        }
    }
}
