//! Service trait abstraction for scheduling operations
//!
//! This module decouples outer interfaces (an HTTP CRUD layer, a control
//! socket) from the concrete [`Scheduler`] implementation.

use async_trait::async_trait;
use postdate_common::{Email, EmailId};

use crate::error::DeliveryError;
use crate::scheduler::Scheduler;
use crate::types::JobStatus;

/// Service trait for scheduling, cancelling, and inspecting delayed sends.
///
/// Outer layers hold a `dyn SchedulingService` rather than the scheduler
/// itself, which keeps them mockable in tests and ignorant of the queue
/// wiring behind it.
#[async_trait]
pub trait SchedulingService: Send + Sync {
    /// Enqueue a delayed send for `email`; returns the job id (the email id).
    fn schedule(&self, email: &Email) -> EmailId;

    /// Cancel a scheduled email. Returns `true` if a pending job was
    /// removed before any worker claimed it.
    ///
    /// # Errors
    ///
    /// Returns an error if the email record store fails.
    async fn cancel(&self, id: EmailId) -> Result<bool, DeliveryError>;

    /// Current job status for `id`, or `None` if no job exists.
    fn job_status(&self, id: EmailId) -> Option<JobStatus>;
}

#[async_trait]
impl SchedulingService for Scheduler {
    fn schedule(&self, email: &Email) -> EmailId {
        Self::schedule(self, email)
    }

    async fn cancel(&self, id: EmailId) -> Result<bool, DeliveryError> {
        Self::cancel(self, id).await
    }

    fn job_status(&self, id: EmailId) -> Option<JobStatus> {
        self.status(id)
    }
}
