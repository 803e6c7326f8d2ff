//! The email record and its delivery state machine.
//!
//! An [`Email`] is owned by the persistence layer; only the scheduler and the
//! delivery worker mutate it. Its [`EmailStatus`] advances
//! `Scheduled -> Processing -> Sent | Failed`, with `Cancelled` reachable
//! only from `Scheduled`. Once an email is `Sent` or `Cancelled` no further
//! mutation by the worker is permitted; that boundary is what makes duplicate
//! job deliveries safe.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a scheduled email.
///
/// A ULID: globally unique, lexicographically sortable by creation time, and
/// collision-resistant. The same value doubles as the job deduplication key,
/// which is what enforces the one-job-per-email invariant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EmailId(ulid::Ulid);

impl EmailId {
    /// Generate a new unique email id.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Create an id from an existing ULID.
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self(id)
    }

    /// Parse an id from its canonical string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid ULID.
    pub fn parse(value: &str) -> Result<Self, ulid::DecodeError> {
        ulid::Ulid::from_string(value).map(Self)
    }
}

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    /// Waiting for its scheduled send time (or for a retry).
    Scheduled,
    /// A worker slot is currently attempting delivery.
    Processing,
    /// Accepted by the mail transport. Terminal.
    Sent,
    /// All delivery attempts exhausted. Terminal for the worker; the caller
    /// may re-schedule.
    Failed,
    /// Cancelled before delivery. Terminal.
    Cancelled,
}

impl EmailStatus {
    /// Whether this status is past the idempotency boundary: the worker must
    /// not mutate the email or attempt delivery once this returns `true`.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Sent | Self::Cancelled)
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "SCHEDULED",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// A scheduled outbound email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    /// The owning sender; the rate-limit scope key is derived from this.
    pub sender_id: String,
    pub from: String,
    pub recipient: String,
    pub subject: String,
    /// HTML body, passed through to the transport untouched.
    pub body: String,
    pub status: EmailStatus,
    /// Target send time.
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Transport-provided reference for the accepted message.
    pub tracking_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Email {
    /// Create a new email in `Scheduled` state.
    #[must_use]
    pub fn new(
        sender_id: impl Into<String>,
        from: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EmailId::generate(),
            sender_id: sender_id.into(),
            from: from.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            status: EmailStatus::Scheduled,
            scheduled_at,
            sent_at: None,
            error_message: None,
            tracking_ref: None,
            created_at: Utc::now(),
        }
    }
}

/// A partial mutation applied to an email record.
///
/// Only `Some` fields are written; single-row atomicity is the store's
/// responsibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: Option<EmailStatus>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub tracking_ref: Option<String>,
}

impl StatusUpdate {
    /// Move to the given status, touching nothing else.
    #[must_use]
    pub const fn to(status: EmailStatus) -> Self {
        Self {
            status: Some(status),
            sent_at: None,
            error_message: None,
            tracking_ref: None,
        }
    }

    /// Terminal success: `Sent`, with the send time and any tracking
    /// reference the transport handed back.
    #[must_use]
    pub const fn sent(at: DateTime<Utc>, tracking_ref: Option<String>) -> Self {
        Self {
            status: Some(EmailStatus::Sent),
            sent_at: Some(at),
            error_message: None,
            tracking_ref,
        }
    }

    /// Terminal failure with the recorded error message.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(EmailStatus::Failed),
            sent_at: None,
            error_message: Some(error.into()),
            tracking_ref: None,
        }
    }

    /// Apply this update to an email record.
    pub fn apply(&self, email: &mut Email) {
        if let Some(status) = self.status {
            email.status = status;
        }
        if let Some(sent_at) = self.sent_at {
            email.sent_at = Some(sent_at);
        }
        if let Some(error) = &self.error_message {
            email.error_message = Some(error.clone());
        }
        if let Some(tracking_ref) = &self.tracking_ref {
            email.tracking_ref = Some(tracking_ref.clone());
        }
    }
}
