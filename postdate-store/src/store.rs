use async_trait::async_trait;
use postdate_common::{Email, EmailId, EmailStatus, StatusUpdate};

use crate::Result;

/// Abstraction over the durable email record store.
///
/// Implementations must make each operation atomic with respect to the single
/// row it touches; no multi-row transactional guarantees are required by the
/// delivery core.
#[async_trait]
pub trait EmailStore: Send + Sync + std::fmt::Debug {
    /// Persist a new email record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// if an email with the same id is already stored.
    async fn insert(&self, email: Email) -> Result<()>;

    /// Fetch an email by id. `Ok(None)` when no such record exists.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn find(&self, id: &EmailId) -> Result<Option<Email>>;

    /// Apply a status update to the email with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// email does not exist.
    async fn update(&self, id: &EmailId, update: StatusUpdate) -> Result<()>;

    /// Apply a status update only if the email's current status matches
    /// `expected`. Returns whether the update was applied.
    ///
    /// This is the compare-against-current-status primitive cancellation
    /// relies on: it must be atomic so a concurrent worker cannot observe a
    /// half-applied transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// email does not exist.
    async fn update_if(
        &self,
        id: &EmailId,
        expected: EmailStatus,
        update: StatusUpdate,
    ) -> Result<bool>;
}
