//! Publish/subscribe backend.
//!
//! Each message carries an [`Envelope`] naming the task type and its body.
//! Messages are acknowledged as soon as they arrive, before processing, so a
//! task that fails is not redelivered. Every error is logged and the loop
//! moves on to the next message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{task_span, BackendError};
use crate::processor::TaskProcessor;

/// A message delivered on a subscribed subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait Subscription: Send {
    /// Wait up to `timeout` for a message. `Ok(None)` on timeout.
    async fn next_message(&mut self, timeout: Duration)
        -> Result<Option<PubSubMessage>, BackendError>;

    async fn ack(&self, message: &PubSubMessage) -> Result<(), BackendError>;
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("envelope value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// `{"Key": "<task type>", "Value": <body>}`
///
/// `Value` is either a base64 string holding the JSON body, which is what
/// byte-oriented producers emit, or the JSON body inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "Key", default)]
    key: String,
    #[serde(rename = "Value", default)]
    value: serde_json::Value,
}

impl Envelope {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope = serde_json::from_slice(data)?;
        let value = match raw.value {
            serde_json::Value::String(encoded) => {
                base64::engine::general_purpose::STANDARD.decode(encoded)?
            }
            serde_json::Value::Null => Vec::new(),
            inline => serde_json::to_vec(&inline)?,
        };
        Ok(Self {
            key: raw.key,
            value,
        })
    }

    /// Encode with a base64 `Value`.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let raw = RawEnvelope {
            key: self.key.clone(),
            value: serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(&self.value),
            ),
        };
        Ok(serde_json::to_vec(&raw)?)
    }
}

pub struct PubSubConsumer<S> {
    subscription: S,
    processor: Arc<TaskProcessor>,
    wait: Duration,
}

impl<S: Subscription> PubSubConsumer<S> {
    pub fn new(subscription: S, processor: Arc<TaskProcessor>) -> Self {
        Self {
            subscription,
            processor,
            wait: Duration::from_secs(5),
        }
    }

    /// How long each receive waits before checking for shutdown (default: 5s).
    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn subscription(&self) -> &S {
        &self.subscription
    }

    /// Consume until `shutdown` is cancelled or the subscription fails
    /// fatally.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), BackendError> {
        tracing::info!("Pub/sub consumer running");

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.subscription.next_message(self.wait) => received,
            };

            let message = match received {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "subscription failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to receive message");
                    continue;
                }
            };

            if let Err(e) = self.subscription.ack(&message).await {
                tracing::debug!(subject = %message.subject, error = %e, "ack failed");
            }

            let envelope = match Envelope::decode(&message.payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(subject = %message.subject, error = %e, "dropping message");
                    continue;
                }
            };

            // Errors are already reported by the processor.
            let _ = self
                .processor
                .process(&envelope.key, &envelope.value)
                .instrument(task_span("nats", &envelope.key))
                .await;
        }

        tracing::info!("Pub/sub consumer stopped");
        Ok(())
    }
}
