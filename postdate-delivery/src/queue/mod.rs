//! In-process delayed job queue.
//!
//! Jobs are keyed by email id, which makes the map itself the deduplication
//! mechanism: enqueueing for an email that already has a pending job replaces
//! it, and at most one job per email ever exists. Claiming flips a job to
//! `Active` under the shard lock, so no two worker slots can pick up the same
//! job.

pub mod retry;

use dashmap::DashMap;
use postdate_common::EmailId;

use crate::types::{Job, JobState, JobStatus};

/// Concurrent job queue shared between the scheduler and the worker.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: DashMap<EmailId, Job>,
}

impl JobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delayed job, deduplicated by email id.
    ///
    /// A pending (`Delayed` or `Failed`) job for the same email is replaced
    /// wholesale, which is how rescheduling works. A job already claimed by a
    /// worker is left alone; the in-flight attempt settles on its own and the
    /// caller's new schedule is dropped.
    pub fn enqueue(&self, job: Job) {
        match self.jobs.entry(job.id) {
            dashmap::Entry::Occupied(mut occupied) => {
                if occupied.get().state == JobState::Active {
                    return;
                }
                occupied.insert(job);
            }
            dashmap::Entry::Vacant(vacant) => {
                vacant.insert(job);
            }
        }
    }

    /// Claim up to `max` due jobs, flipping each to `Active`.
    ///
    /// The state is re-checked under the entry lock after the candidate scan,
    /// so a job cancelled or claimed in between is skipped rather than
    /// double-claimed.
    #[must_use]
    pub fn claim_due(&self, now_ms: i64, max: usize) -> Vec<Job> {
        if max == 0 {
            return Vec::new();
        }

        let candidates: Vec<EmailId> = self
            .jobs
            .iter()
            .filter(|entry| entry.state == JobState::Delayed && entry.run_at_ms <= now_ms)
            .map(|entry| entry.id)
            .take(max)
            .collect();

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(mut job) = self.jobs.get_mut(&id) {
                if job.state == JobState::Delayed && job.run_at_ms <= now_ms {
                    job.state = JobState::Active;
                    claimed.push(job.clone());
                }
            }
        }

        claimed
    }

    /// Remove a job after its attempt settled without needing a retry. Also
    /// the acknowledgement path for jobs skipped by the idempotency gate.
    pub fn complete(&self, id: EmailId) {
        self.jobs.remove(&id);
    }

    /// Mark a job terminally failed. The job is kept for status queries.
    pub fn fail(&self, id: EmailId, error: impl Into<String>) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            job.state = JobState::Failed;
            job.last_error = Some(error.into());
        }
    }

    /// Park a job for another attempt at `run_at_ms`, consuming one attempt
    /// from its budget.
    pub fn retry(&self, id: EmailId, error: impl Into<String>, run_at_ms: i64) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            job.state = JobState::Delayed;
            job.run_at_ms = run_at_ms;
            job.attempts_made += 1;
            job.last_error = Some(error.into());
        }
    }

    /// Park a job until `resume_at_ms` without touching its attempt budget.
    ///
    /// This is the rate-limit path: being throttled is not a failed attempt,
    /// so a job can be re-delayed any number of times and still retain its
    /// full retry budget for actual send failures.
    pub fn redelay(&self, id: EmailId, resume_at_ms: i64) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            job.state = JobState::Delayed;
            job.run_at_ms = resume_at_ms;
        }
    }

    /// Remove a job only if it has not been claimed yet.
    ///
    /// Returns `true` if a pending job was removed. A job currently `Active`
    /// is left in place and `false` is returned; cancellation lost the race
    /// with the worker.
    pub fn remove_pending(&self, id: EmailId) -> bool {
        self.jobs
            .remove_if(&id, |_, job| job.state == JobState::Delayed)
            .is_some()
    }

    /// Public status projection for `id` as of `now_ms`.
    #[must_use]
    pub fn status(&self, id: EmailId, now_ms: i64) -> Option<JobStatus> {
        self.jobs.get(&id).map(|job| job.status(now_ms))
    }

    /// Snapshot of the job for `id`, if one exists.
    #[must_use]
    pub fn get(&self, id: EmailId) -> Option<Job> {
        self.jobs.get(&id).map(|job| job.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
