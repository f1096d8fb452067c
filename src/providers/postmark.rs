//! Postmark API provider.
//!
//! ```rust,ignore
//! use courier::providers::PostmarkMailer;
//!
//! let mailer = PostmarkMailer::new("xxxxx-xxxx-xxxx-xxxx-xxxxxx")
//!     .message_stream("outbound");
//! ```
//!
//! `send_batch` goes through `/email/batch`, one message per recipient.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};

const POSTMARK_API_URL: &str = "https://api.postmarkapp.com";

/// Postmark API email provider.
pub struct PostmarkMailer {
    api_token: String,
    client: Client,
    base_url: String,
    message_stream: Option<String>,
}

impl PostmarkMailer {
    /// Create a new Postmark mailer with the given server token.
    pub fn new(api_token: impl Into<String>) -> Self {
        Self::with_client(api_token, Client::new())
    }

    /// Create with a custom reqwest client.
    pub fn with_client(api_token: impl Into<String>, client: Client) -> Self {
        Self {
            api_token: api_token.into(),
            client,
            base_url: POSTMARK_API_URL.to_string(),
            message_stream: None,
        }
    }

    /// Set a custom base URL (for testing).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Send through a specific message stream instead of the server default.
    pub fn message_stream(mut self, stream: impl Into<String>) -> Self {
        self.message_stream = Some(stream.into());
        self
    }

    fn build_request(&self, email: &Email) -> Result<PostmarkRequest, MailError> {
        let from = email.from.as_ref().ok_or(MailError::MissingField("from"))?;

        if email.to.is_empty() {
            return Err(MailError::MissingField("to"));
        }

        Ok(PostmarkRequest {
            from: from.formatted(),
            to: join_addresses(&email.to).unwrap_or_default(),
            subject: if email.subject.is_empty() {
                None
            } else {
                Some(email.subject.clone())
            },
            html_body: email.html_body.clone(),
            text_body: email.text_body.clone(),
            cc: join_addresses(&email.cc),
            bcc: join_addresses(&email.bcc),
            reply_to: email.reply_to.first().map(|a| a.formatted()),
            tag: email.tag.clone(),
            message_stream: self.message_stream.clone(),
            metadata: if email.metadata.is_empty() {
                None
            } else {
                Some(email.metadata.clone())
            },
            headers: if email.headers.is_empty() {
                None
            } else {
                Some(
                    email
                        .headers
                        .iter()
                        .map(|(name, value)| PostmarkHeader {
                            name: name.clone(),
                            value: value.clone(),
                        })
                        .collect(),
                )
            },
        })
    }

    async fn send_request(
        &self,
        url: &str,
        body: &impl Serialize,
    ) -> Result<reqwest::Response, MailError> {
        Ok(self
            .client
            .post(url)
            .header("X-Postmark-Server-Token", &self.api_token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("User-Agent", format!("courier/{}", crate::VERSION))
            .json(body)
            .send()
            .await?)
    }

    async fn parse_error(response: reqwest::Response) -> MailError {
        let status = response.status();
        let error: PostmarkError = response.json().await.unwrap_or(PostmarkError {
            error_code: 0,
            message: "Unknown error".to_string(),
        });
        MailError::provider_with_status(
            "postmark",
            format!("[{}] {}", error.error_code, error.message),
            status.as_u16(),
        )
    }
}

#[async_trait]
impl Mailer for PostmarkMailer {
    async fn send(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        let request = self.build_request(email)?;
        let url = format!("{}/email", self.base_url);

        let response = self.send_request(&url, &request).await?;

        if response.status().is_success() {
            let result: PostmarkResponse = response.json().await?;
            Ok(DeliveryResult::with_response(
                result.message_id,
                serde_json::json!({
                    "provider": "postmark",
                    "submitted_at": result.submitted_at,
                }),
            ))
        } else {
            Err(Self::parse_error(response).await)
        }
    }

    async fn send_batch(
        &self,
        email: &Email,
        recipients: &[String],
    ) -> Result<Vec<DeliveryResult>, MailError> {
        if recipients.is_empty() {
            return Ok(vec![]);
        }

        let requests = recipients
            .iter()
            .map(|recipient| self.build_request(&email.for_recipient(recipient.as_str())))
            .collect::<Result<Vec<_>, _>>()?;

        let url = format!("{}/email/batch", self.base_url);
        let response = self.send_request(&url, &requests).await?;

        if !response.status().is_success() {
            return Err(Self::parse_error(response).await);
        }

        // The batch endpoint answers 200 even when individual messages fail.
        let results: Vec<PostmarkBatchResponse> = response.json().await?;
        results
            .into_iter()
            .map(|r| {
                if r.error_code != 0 {
                    return Err(MailError::provider(
                        "postmark",
                        format!("[{}] {} ({})", r.error_code, r.message, r.to),
                    ));
                }
                Ok(DeliveryResult::with_response(
                    r.message_id,
                    serde_json::json!({
                        "provider": "postmark",
                        "to": r.to,
                        "submitted_at": r.submitted_at,
                    }),
                ))
            })
            .collect()
    }

    fn provider_name(&self) -> &'static str {
        "postmark"
    }

    fn validate_config(&self) -> Result<(), MailError> {
        if self.api_token.is_empty() {
            return Err(MailError::Configuration(
                "postmark server token is required".into(),
            ));
        }
        Ok(())
    }
}

fn join_addresses(addrs: &[Address]) -> Option<String> {
    if addrs.is_empty() {
        return None;
    }
    Some(
        addrs
            .iter()
            .map(|a| a.formatted())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

// ============================================================================
// Postmark API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkRequest {
    from: String,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_stream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<std::collections::HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<Vec<PostmarkHeader>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkResponse {
    #[serde(rename = "MessageID")]
    message_id: String,
    submitted_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkBatchResponse {
    #[serde(rename = "MessageID", default)]
    message_id: String,
    error_code: i32,
    message: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    submitted_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkError {
    error_code: i32,
    message: String,
}
