//! Mailgun API provider.
//!
//! For reference: [Mailgun API docs](https://documentation.mailgun.com/en/latest/api-sending.html#sending)
//!
//! ```rust,ignore
//! use courier::providers::MailgunMailer;
//!
//! let mailer = MailgunMailer::new("your-api-key", "mg.yourdomain.com");
//! ```
//!
//! For EU domains, use `.base_url(MAILGUN_EU_BASE_URL)`.
//!
//! `send_batch` posts every recipient in one request together with
//! `recipient-variables`, which makes Mailgun deliver an individual copy to
//! each address instead of a single message with a shared `To` line.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{multipart::Form, Client};
use serde::Deserialize;

use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};

const MAILGUN_BASE_URL: &str = "https://api.mailgun.net/v3";

/// Base URL for domains hosted in Mailgun's EU region.
pub const MAILGUN_EU_BASE_URL: &str = "https://api.eu.mailgun.net/v3";

/// Mailgun API email provider.
pub struct MailgunMailer {
    api_key: String,
    domain: String,
    base_url: String,
    client: Client,
}

impl MailgunMailer {
    /// Create a new Mailgun mailer with the given API key and domain.
    pub fn new(api_key: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            domain: domain.into(),
            base_url: MAILGUN_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Set a custom base URL (e.g., [`MAILGUN_EU_BASE_URL`]).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn auth_header(&self) -> String {
        let credentials = format!("api:{}", self.api_key);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
        format!("Basic {}", encoded)
    }

    fn build_form(&self, email: &Email, to: String) -> Result<Form, MailError> {
        let from = email.from.as_ref().ok_or(MailError::MissingField("from"))?;

        let mut form = Form::new()
            .text("from", from.formatted())
            .text("to", to)
            .text("subject", email.subject.clone());

        if let Some(ref text) = email.text_body {
            form = form.text("text", text.clone());
        }
        if let Some(ref html) = email.html_body {
            form = form.text("html", html.clone());
        }

        if !email.cc.is_empty() {
            form = form.text(
                "cc",
                email
                    .cc
                    .iter()
                    .map(|a| a.formatted())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }
        if !email.bcc.is_empty() {
            form = form.text(
                "bcc",
                email
                    .bcc
                    .iter()
                    .map(|a| a.formatted())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }

        // Mailgun takes Reply-To as a custom header
        if let Some(reply_to) = email.reply_to.first() {
            form = form.text("h:Reply-To", reply_to.email.clone());
        }

        for (name, value) in &email.headers {
            form = form.text(format!("h:{}", name), value.clone());
        }

        if let Some(ref tag) = email.tag {
            form = form.text("o:tag", tag.clone());
        }

        if !email.metadata.is_empty() {
            form = form.text(
                "h:X-Mailgun-Variables",
                serde_json::to_string(&email.metadata)?,
            );
        }

        Ok(form)
    }

    async fn post(&self, form: Form) -> Result<MailgunResponse, MailError> {
        let url = format!("{}/{}/messages", self.base_url, self.domain);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("User-Agent", format!("courier/{}", crate::VERSION))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let error_body = response.text().await.unwrap_or_default();
            let error_msg = serde_json::from_str::<MailgunError>(&error_body)
                .map(|e| e.message)
                .unwrap_or(error_body);

            Err(MailError::provider_with_status(
                "mailgun",
                error_msg,
                status.as_u16(),
            ))
        }
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        if email.to.is_empty() {
            return Err(MailError::MissingField("to"));
        }

        let to = email
            .to
            .iter()
            .map(|a| a.formatted())
            .collect::<Vec<_>>()
            .join(", ");
        let result = self.post(self.build_form(email, to)?).await?;

        Ok(DeliveryResult::with_response(
            result.id,
            serde_json::json!({
                "provider": "mailgun",
                "message": result.message,
            }),
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

        let variables: serde_json::Map<String, serde_json::Value> = recipients
            .iter()
            .map(|r| (r.clone(), serde_json::json!({})))
            .collect();

        let form = self
            .build_form(email, recipients.join(", "))?
            .text("recipient-variables", serde_json::to_string(&variables)?);
        let result = self.post(form).await?;

        Ok(recipients
            .iter()
            .map(|recipient| {
                DeliveryResult::with_response(
                    result.id.clone(),
                    serde_json::json!({
                        "provider": "mailgun",
                        "message": result.message,
                        "to": recipient,
                    }),
                )
            })
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "mailgun"
    }

    fn validate_config(&self) -> Result<(), MailError> {
        if self.api_key.is_empty() || self.domain.is_empty() {
            return Err(MailError::Configuration(
                "mailgun API key and domain are required".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Mailgun API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MailgunResponse {
    id: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct MailgunError {
    message: String,
}
