//! Typed error handling for scheduling and delivery operations.
//!
//! Two classes matter to the worker:
//! - send failures, retried with backoff until the job's attempt budget is
//!   exhausted (at which point the email goes terminal `FAILED`);
//! - store/system failures, also retried out of the same budget since they
//!   are assumed transient.
//!
//! A rate-limit denial is deliberately NOT an error: it re-delays the job
//! without consuming an attempt and never reaches this type.

use thiserror::Error;

use crate::transport::TransportError;

/// Top-level error for scheduling and delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The mail transport reported a failed send.
    #[error("send failed: {0}")]
    Send(#[from] TransportError),

    /// The email record store failed.
    #[error(transparent)]
    Store(#[from] postdate_store::StoreError),

    /// The worker or scheduler was asked to operate before being wired up,
    /// or hit an internal inconsistency.
    #[error("internal error: {0}")]
    Internal(String),
}
