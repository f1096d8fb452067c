//! In-memory store behind [`LocalMailer`](crate::providers::LocalMailer).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::email::Email;

/// A stored email with metadata.
#[derive(Debug, Clone)]
pub struct StoredEmail {
    /// Unique identifier for this email.
    pub id: String,
    /// The email content.
    pub email: Email,
    /// When the email was "sent" (stored).
    pub sent_at: DateTime<Utc>,
}

/// Thread-safe in-memory storage for emails.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    emails: RwLock<HashMap<String, StoredEmail>>,
    /// Insertion order of email IDs.
    order: RwLock<Vec<String>>,
}

impl MemoryStorage {
    /// Create a new empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Store an email and return its ID.
    pub fn push(&self, email: Email) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let stored = StoredEmail {
            id: id.clone(),
            email,
            sent_at: Utc::now(),
        };

        let mut emails = self.emails.write();
        let mut order = self.order.write();
        emails.insert(id.clone(), stored);
        order.push(id.clone());

        id
    }

    /// Get an email by ID.
    pub fn get(&self, id: &str) -> Option<StoredEmail> {
        self.emails.read().get(id).cloned()
    }

    /// Get all stored emails, newest first.
    pub fn all(&self) -> Vec<StoredEmail> {
        let emails = self.emails.read();
        let order = self.order.read();
        order
            .iter()
            .rev()
            .filter_map(|id| emails.get(id).cloned())
            .collect()
    }

    /// Clear all stored emails.
    pub fn clear(&self) {
        let mut emails = self.emails.write();
        let mut order = self.order.write();
        emails.clear();
        order.clear();
    }

    /// Get the count of stored emails.
    pub fn count(&self) -> usize {
        self.emails.read().len()
    }

    /// Remove and return all stored emails, newest first.
    pub fn flush(&self) -> Vec<StoredEmail> {
        let mut emails = self.emails.write();
        let mut order = self.order.write();

        let result = order
            .iter()
            .rev()
            .filter_map(|id| emails.get(id).cloned())
            .collect();

        emails.clear();
        order.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();

        let id = storage.push(Email::new().to("recipient@example.com").subject("First"));
        assert_eq!(storage.count(), 1);
        assert_eq!(storage.get(&id).unwrap().email.subject, "First");

        let id2 = storage.push(Email::new().subject("Second"));
        let all = storage.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, id2);

        storage.clear();
        assert_eq!(storage.count(), 0);
    }

    #[test]
    fn test_flush() {
        let storage = MemoryStorage::new();
        storage.push(Email::new().subject("First"));
        storage.push(Email::new().subject("Second"));

        let flushed = storage.flush();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].email.subject, "Second");
        assert_eq!(storage.count(), 0);
        assert!(storage.flush().is_empty());
    }
}
