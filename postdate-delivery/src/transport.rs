//! Mail transport abstraction.
//!
//! The worker only knows how to hand a fully-assembled message to a
//! [`MailTransport`] and interpret success or failure. What "sending" means
//! (SMTP relay, provider API, test double) is the implementor's business.

use async_trait::async_trait;
use postdate_common::internal;
use thiserror::Error;
use ulid::Ulid;

/// A fully-assembled outbound message.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Provider acknowledgement for a delivered message.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Provider-side reference for the delivery, when one is issued.
    pub tracking_ref: Option<String>,
}

/// The transport could not deliver the message.
///
/// All transport failures are treated as transient by the worker and retried
/// until the job's attempt budget runs out.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Something that can deliver an email.
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Deliver `request`, returning a receipt on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handed off.
    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, TransportError>;
}

/// Transport that logs instead of delivering.
///
/// Stands in wherever no real provider is wired up, so the rest of the
/// pipeline can run end to end.
#[derive(Debug, Default)]
pub struct LoggingTransport;

impl LoggingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailTransport for LoggingTransport {
    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, TransportError> {
        let tracking_ref = Ulid::new().to_string();

        internal!(
            "Delivering to {} from {} (subject: {:?}, ref: {tracking_ref})",
            request.to,
            request.from,
            request.subject
        );

        Ok(SendReceipt {
            tracking_ref: Some(tracking_ref),
        })
    }
}
