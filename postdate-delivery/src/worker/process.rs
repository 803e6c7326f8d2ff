//! Per-job delivery state machine.
//!
//! Each claimed job runs through the same gate sequence: fetch the record,
//! refuse to touch anything already final, ask the rate limiter for a slot,
//! then attempt the send. The outcome drives the queue bookkeeping: acked,
//! re-delayed (no attempt consumed), retried with backoff, or terminally
//! failed.

use chrono::Utc;
use postdate_common::{EmailStatus, StatusUpdate, tracing};

use super::WorkerContext;
use crate::queue::retry::backoff_delay_ms;
use crate::transport::SendRequest;
use crate::types::Job;

/// A throttled job resumes no sooner than this, even when the limiter
/// reports a smaller wait.
const MIN_THROTTLE_DELAY_MS: i64 = 1_000;

/// How a single delivery attempt settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum JobOutcome {
    /// Sent and recorded; the job is done.
    Completed,
    /// Rate limited. Park until `resume_at_ms` without consuming an attempt.
    Throttled { resume_at_ms: i64 },
    /// The send failed but budget remains; park for a backoff retry.
    Retry { error: String },
    /// The send failed and the budget is exhausted. Terminal.
    Failed { error: String },
    /// Nothing to do (missing record, or already past the idempotency
    /// boundary). Ack without side effects.
    Skipped,
}

/// Run the delivery state machine for one claimed job.
pub(super) async fn process_job(ctx: &WorkerContext, job: &Job) -> JobOutcome {
    let email = match ctx.store.find(&job.id).await {
        Ok(Some(email)) => email,
        Ok(None) => {
            tracing::warn!(email_id = %job.id, "Email record missing, discarding job");
            return JobOutcome::Skipped;
        }
        Err(err) => {
            // Transient store trouble; the record may well be back for the
            // retry. Bounded by the same attempt budget as a failed send so
            // a store outage cannot retry a job forever.
            let error = format!("store lookup failed: {err}");
            if job.attempts_made + 1 < job.max_attempts {
                return JobOutcome::Retry { error };
            }
            tracing::error!(
                email_id = %job.id,
                attempts = job.attempts_made + 1,
                "Store lookup failed, attempts exhausted: {err}"
            );
            if let Err(write_err) = ctx
                .store
                .update(&job.id, StatusUpdate::failed(error.clone()))
                .await
            {
                tracing::error!(email_id = %job.id, "Failed to record failure: {write_err}");
            }
            return JobOutcome::Failed { error };
        }
    };

    // Idempotency gate: a SENT or CANCELLED email is never touched again,
    // which is what makes duplicate deliveries of the same job safe.
    if email.status.is_final() {
        tracing::debug!(
            email_id = %job.id,
            status = %email.status,
            "Email already settled, discarding job"
        );
        return JobOutcome::Skipped;
    }

    let decision = ctx
        .limiter
        .check(&format!("user:{}", job.payload.sender_id))
        .await;
    if !decision.allowed {
        let resume_at_ms =
            Utc::now().timestamp_millis() + decision.wait_ms.max(MIN_THROTTLE_DELAY_MS);
        tracing::info!(
            email_id = %job.id,
            sender_id = %job.payload.sender_id,
            wait_ms = decision.wait_ms,
            "Rate limited, re-delaying job"
        );
        return JobOutcome::Throttled { resume_at_ms };
    }

    // Best effort; a failed marker write must not block the send itself.
    if let Err(err) = ctx
        .store
        .update(&job.id, StatusUpdate::to(EmailStatus::Processing))
        .await
    {
        tracing::warn!(email_id = %job.id, "Failed to mark email processing: {err}");
    }

    let request = SendRequest {
        from: job.payload.from.clone(),
        to: job.payload.recipient.clone(),
        subject: job.payload.subject.clone(),
        html_body: job.payload.body.clone(),
    };

    match ctx.transport.send(&request).await {
        Ok(receipt) => {
            tracing::info!(
                email_id = %job.id,
                recipient = %job.payload.recipient,
                "Email sent"
            );
            // The message is out the door. If recording that fails the email
            // stays PROCESSING until operator intervention; retrying here
            // would risk a duplicate send.
            if let Err(err) = ctx
                .store
                .update(&job.id, StatusUpdate::sent(Utc::now(), receipt.tracking_ref))
                .await
            {
                tracing::error!(
                    email_id = %job.id,
                    "Email sent but status write failed: {err}"
                );
            }
            JobOutcome::Completed
        }
        Err(err) => {
            let error = err.to_string();
            if job.attempts_made + 1 < job.max_attempts {
                tracing::warn!(
                    email_id = %job.id,
                    attempt = job.attempts_made + 1,
                    max_attempts = job.max_attempts,
                    "Send failed, will retry: {error}"
                );
                // Back to SCHEDULED so the record reflects the pending retry.
                if let Err(err) = ctx
                    .store
                    .update(&job.id, StatusUpdate::to(EmailStatus::Scheduled))
                    .await
                {
                    tracing::warn!(email_id = %job.id, "Failed to reset email status: {err}");
                }
                JobOutcome::Retry { error }
            } else {
                tracing::error!(
                    email_id = %job.id,
                    attempts = job.attempts_made + 1,
                    "Send failed, attempts exhausted: {error}"
                );
                if let Err(err) = ctx
                    .store
                    .update(&job.id, StatusUpdate::failed(error.clone()))
                    .await
                {
                    tracing::error!(email_id = %job.id, "Failed to record failure: {err}");
                }
                JobOutcome::Failed { error }
            }
        }
    }
}

/// Settle the queue side of a finished attempt.
pub(super) fn apply_outcome(ctx: &WorkerContext, job: &Job, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed | JobOutcome::Skipped => ctx.queue.complete(job.id),
        JobOutcome::Throttled { resume_at_ms } => ctx.queue.redelay(job.id, *resume_at_ms),
        JobOutcome::Retry { error } => {
            let delay_ms = backoff_delay_ms(
                job.attempts_made + 1,
                ctx.config.backoff_base_ms,
                ctx.config.backoff_max_ms,
                ctx.config.backoff_jitter,
            );
            let run_at_ms = Utc::now().timestamp_millis().saturating_add_unsigned(delay_ms);
            ctx.queue.retry(job.id, error.clone(), run_at_ms);
        }
        JobOutcome::Failed { error } => ctx.queue.fail(job.id, error.clone()),
    }
}

/// Process one job end to end, holding the caller's concurrency slot.
///
/// After a successful send the slot is held for `min_inter_send_ms` before
/// being released, which paces consecutive sends from the same pool.
pub(super) async fn run_one(ctx: &WorkerContext, job: Job) {
    let outcome = process_job(ctx, &job).await;
    apply_outcome(ctx, &job, &outcome);

    if outcome == JobOutcome::Completed && ctx.config.min_inter_send_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(ctx.config.min_inter_send_ms)).await;
    }
}
