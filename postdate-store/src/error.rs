//! Error types for email store operations.

use postdate_common::EmailId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure while reading or writing an email record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No email exists with the given id.
    #[error("email not found: {0}")]
    NotFound(EmailId),

    /// An email with this id already exists.
    #[error("email already exists: {0}")]
    AlreadyExists(EmailId),

    /// Backend-specific failure (connection loss, lock poisoning, etc.).
    #[error("store error: {0}")]
    Backend(String),
}
