use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use postdate_common::{Email, EmailId, EmailStatus, StatusUpdate};

use crate::{EmailStore, StoreError};

/// In-memory email store.
///
/// Records live in a `HashMap` behind an `RwLock`. Intended for testing and
/// single-process deployments; production installs back this trait with a
/// real database through the same interface.
///
/// # Concurrency
/// Every operation takes the lock for its whole duration, which is what makes
/// `update_if` an atomic compare-against-current-status.
#[derive(Debug, Clone, Default)]
pub struct MemoryEmailStore {
    emails: Arc<RwLock<HashMap<EmailId, Email>>>,
}

impl MemoryEmailStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored emails.
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the
    /// underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emails
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no emails.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EmailStore for MemoryEmailStore {
    async fn insert(&self, email: Email) -> crate::Result<()> {
        let mut emails = self
            .emails
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if emails.contains_key(&email.id) {
            return Err(StoreError::AlreadyExists(email.id));
        }
        emails.insert(email.id, email);
        Ok(())
    }

    async fn find(&self, id: &EmailId) -> crate::Result<Option<Email>> {
        let emails = self
            .emails
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(emails.get(id).cloned())
    }

    async fn update(&self, id: &EmailId, update: StatusUpdate) -> crate::Result<()> {
        let mut emails = self
            .emails
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let email = emails.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        update.apply(email);
        Ok(())
    }

    async fn update_if(
        &self,
        id: &EmailId,
        expected: EmailStatus,
        update: StatusUpdate,
    ) -> crate::Result<bool> {
        let mut emails = self
            .emails
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let email = emails.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        if email.status != expected {
            return Ok(false);
        }
        update.apply(email);
        Ok(true)
    }
}
