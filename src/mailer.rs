//! Mailer port and delivery result types.
//!
//! The port uses `#[async_trait]` because the dispatcher holds a single
//! `Arc<dyn Mailer>` chosen at startup and shares it across every backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::email::Email;
use crate::error::MailError;

/// Result of a successful email delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Message ID assigned by the provider
    pub message_id: String,
    /// Optional provider-specific response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<serde_json::Value>,
}

impl DeliveryResult {
    /// Create a new delivery result with just a message ID.
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            provider_response: None,
        }
    }

    /// Create a delivery result with provider response.
    pub fn with_response(message_id: impl Into<String>, response: serde_json::Value) -> Self {
        Self {
            message_id: message_id.into(),
            provider_response: Some(response),
        }
    }
}

/// Capability to hand a rendered email to an email vendor.
///
/// Implementations must be safe to share across concurrently running tasks.
///
/// ```ignore
/// use courier::{Email, Mailer};
/// use courier::providers::PostmarkMailer;
///
/// let mailer = PostmarkMailer::new("server-token");
/// let email = Email::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .html_body("<p>World</p>");
///
/// let result = mailer.send(&email).await?;
/// println!("Sent with ID: {}", result.message_id);
/// ```
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single email.
    async fn send(&self, email: &Email) -> Result<DeliveryResult, MailError>;

    /// Send the same email to many recipients, each seeing only themselves.
    ///
    /// The default fans out one [`send`](Mailer::send) per recipient and stops
    /// at the first failure. Providers with batch APIs override it. Individual
    /// recipients are never retried.
    async fn send_batch(
        &self,
        email: &Email,
        recipients: &[String],
    ) -> Result<Vec<DeliveryResult>, MailError> {
        let mut results = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            results.push(self.send(&email.for_recipient(recipient.as_str())).await?);
        }
        Ok(results)
    }

    /// Get the provider name (for logging/debugging).
    fn provider_name(&self) -> &'static str {
        "unknown"
    }

    /// Validate configuration.
    ///
    /// Called at startup to verify required configuration is present.
    fn validate_config(&self) -> Result<(), MailError> {
        Ok(())
    }
}
