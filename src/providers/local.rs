//! Local mailer for development and testing.
//!
//! Stores emails in memory so tests can assert on what the dispatcher sent.
//!
//! ```rust,ignore
//! use courier::providers::LocalMailer;
//! use courier::testing::*;
//!
//! let mailer = Arc::new(LocalMailer::new());
//! let processor = TaskProcessor::new(mailer.clone(), templates, "noreply@example.com");
//!
//! processor.process("email:welcome", payload).await?;
//!
//! assert_email_sent(&mailer);
//! assert_email_to(&mailer, "user@example.com");
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};
use crate::storage::{MemoryStorage, StoredEmail};

/// Local mailer that stores emails in memory.
pub struct LocalMailer {
    storage: Arc<MemoryStorage>,
    /// If set, `send()` returns this error (for testing error paths).
    fail_with: RwLock<Option<String>>,
}

impl LocalMailer {
    /// Create a new local mailer with fresh storage.
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::shared())
    }

    /// Create a local mailer with existing storage.
    pub fn with_storage(storage: Arc<MemoryStorage>) -> Self {
        Self {
            storage,
            fail_with: RwLock::new(None),
        }
    }

    /// Get a reference to the underlying storage.
    pub fn storage(&self) -> Arc<MemoryStorage> {
        Arc::clone(&self.storage)
    }

    /// Configure the mailer to fail with an error message.
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.fail_with.write() = Some(message.into());
    }

    /// Clear the failure state.
    pub fn clear_failure(&self) {
        *self.fail_with.write() = None;
    }

    /// Get all captured emails (newest first).
    pub fn emails(&self) -> Vec<StoredEmail> {
        self.storage.all()
    }

    /// Get the most recently sent email.
    pub fn last_email(&self) -> Option<StoredEmail> {
        self.storage.all().into_iter().next()
    }

    /// Get the count of sent emails.
    pub fn email_count(&self) -> usize {
        self.storage.count()
    }

    /// Clear all captured emails.
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Remove and return all captured emails.
    pub fn flush(&self) -> Vec<StoredEmail> {
        self.storage.flush()
    }

    /// Check if any email was sent.
    pub fn has_emails(&self) -> bool {
        self.storage.count() > 0
    }

    /// Check if an email was sent to a specific address.
    pub fn sent_to(&self, email: &str) -> bool {
        self.storage.all().iter().any(|stored| {
            stored
                .email
                .to
                .iter()
                .any(|addr| addr.email.eq_ignore_ascii_case(email))
        })
    }

    /// Find emails matching a predicate.
    pub fn find_emails<F>(&self, predicate: F) -> Vec<StoredEmail>
    where
        F: Fn(&Email) -> bool,
    {
        self.storage
            .all()
            .into_iter()
            .filter(|stored| predicate(&stored.email))
            .collect()
    }
}

impl Default for LocalMailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LocalMailer {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            fail_with: RwLock::new(self.fail_with.read().clone()),
        }
    }
}

#[async_trait]
impl Mailer for LocalMailer {
    async fn send(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        if let Some(ref message) = *self.fail_with.read() {
            return Err(MailError::SendError(message.clone()));
        }

        let message_id = self.storage.push(email.clone());
        Ok(DeliveryResult::new(message_id))
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
