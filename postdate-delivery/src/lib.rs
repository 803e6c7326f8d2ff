//! Delayed job scheduling and rate-limited delivery for outbound email.
//!
//! This crate is the concurrency core of postdate:
//! - Track delayed send jobs, deduplicated by email id
//! - Enforce a sliding-window rate ceiling across all worker slots
//! - Drive each email through an idempotent, retry-safe delivery state
//!   machine
//!
//! The mail transport, the email record store, and the counter store backing
//! the limiter are all injected collaborators.

mod error;
pub mod limiter;
pub mod queue;
mod scheduler;
mod service;
mod transport;
mod types;
pub mod worker;

// Re-export error types
pub use error::DeliveryError;
// Re-export the rate limiter surface
pub use limiter::{
    CounterError, CounterStore, MemoryCounterStore, RateLimitConfig, RateLimitDecision,
    RateLimiter, RedisCounterStore,
};
// Re-export core types
pub use queue::JobQueue;
pub use scheduler::Scheduler;
pub use service::SchedulingService;
pub use transport::{LoggingTransport, MailTransport, SendReceipt, SendRequest, TransportError};
pub use types::{Job, JobPayload, JobState, JobStatus};
pub use worker::{DeliveryWorker, WorkerConfig};
