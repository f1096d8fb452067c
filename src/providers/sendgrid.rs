//! SendGrid API provider.
//!
//! ```rust,ignore
//! use courier::providers::SendGridMailer;
//!
//! let mailer = SendGridMailer::new("SG.xxxxx");
//! ```
//!
//! `send_batch` issues a single `/mail/send` call carrying one
//! personalization per recipient, so recipients never see each other.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::address::Address;
use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};

const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3";

/// SendGrid API email provider.
pub struct SendGridMailer {
    api_key: String,
    client: Client,
    base_url: String,
}

impl SendGridMailer {
    /// Create a new SendGrid mailer with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(api_key, Client::new())
    }

    /// Create with a custom reqwest client.
    pub fn with_client(api_key: impl Into<String>, client: Client) -> Self {
        Self {
            api_key: api_key.into(),
            client,
            base_url: SENDGRID_API_URL.to_string(),
        }
    }

    /// Set a custom base URL (for testing).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn build_request(
        &self,
        email: &Email,
        personalizations: Vec<SendGridPersonalization>,
    ) -> Result<SendGridRequest, MailError> {
        let from = email.from.as_ref().ok_or(MailError::MissingField("from"))?;

        let mut content = Vec::new();
        if let Some(ref text) = email.text_body {
            content.push(SendGridContent {
                content_type: "text/plain".to_string(),
                value: text.clone(),
            });
        }
        if let Some(ref html) = email.html_body {
            content.push(SendGridContent {
                content_type: "text/html".to_string(),
                value: html.clone(),
            });
        }

        Ok(SendGridRequest {
            personalizations,
            from: SendGridAddress::from(from),
            reply_to: email.reply_to.first().map(SendGridAddress::from),
            subject: email.subject.clone(),
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            headers: if email.headers.is_empty() {
                None
            } else {
                Some(email.headers.clone())
            },
            categories: email.tag.clone().map(|tag| vec![tag]),
            custom_args: if email.metadata.is_empty() {
                None
            } else {
                Some(email.metadata.clone())
            },
        })
    }

    fn personalization(email: &Email) -> SendGridPersonalization {
        let list = |addrs: &Vec<Address>| {
            if addrs.is_empty() {
                None
            } else {
                Some(addrs.iter().map(SendGridAddress::from).collect())
            }
        };

        SendGridPersonalization {
            to: email.to.iter().map(SendGridAddress::from).collect(),
            cc: list(&email.cc),
            bcc: list(&email.bcc),
        }
    }

    async fn post(&self, request: &SendGridRequest) -> Result<String, MailError> {
        let url = format!("{}/mail/send", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("User-Agent", format!("courier/{}", crate::VERSION))
            .json(request)
            .send()
            .await?;

        let status = response.status();

        // SendGrid returns 202 Accepted on success with no body
        if status.is_success() {
            Ok(response
                .headers()
                .get("X-Message-Id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()))
        } else {
            let error: SendGridError = response.json().await.unwrap_or(SendGridError {
                errors: vec![SendGridErrorDetail {
                    message: "Unknown error".to_string(),
                }],
            });

            let error_msg = error
                .errors
                .iter()
                .map(|e| e.message.clone())
                .collect::<Vec<_>>()
                .join("; ");

            Err(MailError::provider_with_status(
                "sendgrid",
                error_msg,
                status.as_u16(),
            ))
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        if email.to.is_empty() {
            return Err(MailError::MissingField("to"));
        }

        let request = self.build_request(email, vec![Self::personalization(email)])?;
        let message_id = self.post(&request).await?;

        Ok(DeliveryResult::with_response(
            message_id,
            serde_json::json!({ "provider": "sendgrid" }),
        ))
    }

    async fn send_batch(
        &self,
        email: &Email,
        recipients: &[String],
    ) -> Result<Vec<DeliveryResult>, MailError> {
        if recipients.is_empty() {
            return Ok(vec![]);
        }

        let personalizations = recipients
            .iter()
            .map(|recipient| Self::personalization(&email.for_recipient(recipient.as_str())))
            .collect();

        let request = self.build_request(email, personalizations)?;
        let message_id = self.post(&request).await?;

        Ok(recipients
            .iter()
            .map(|recipient| {
                DeliveryResult::with_response(
                    message_id.clone(),
                    serde_json::json!({ "provider": "sendgrid", "to": recipient }),
                )
            })
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "sendgrid"
    }

    fn validate_config(&self) -> Result<(), MailError> {
        if self.api_key.is_empty() {
            return Err(MailError::Configuration("sendgrid API key is required".into()));
        }
        Ok(())
    }
}

// ============================================================================
// SendGrid API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SendGridRequest {
    personalizations: Vec<SendGridPersonalization>,
    from: SendGridAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<SendGridAddress>,
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Vec<SendGridContent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_args: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct SendGridPersonalization {
    to: Vec<SendGridAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cc: Option<Vec<SendGridAddress>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<Vec<SendGridAddress>>,
}

#[derive(Debug, Serialize)]
struct SendGridAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl From<&Address> for SendGridAddress {
    fn from(addr: &Address) -> Self {
        Self {
            email: addr.email.clone(),
            name: addr.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendGridContent {
    #[serde(rename = "type")]
    content_type: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SendGridError {
    errors: Vec<SendGridErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct SendGridErrorDetail {
    message: String,
}
