use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use super::pubsub::{PubSubMessage, Subscription};
use super::BackendError;
use crate::config::NatsSettings;

/// [`Subscription`] on a NATS subject.
pub struct NatsSubscription {
    client: async_nats::Client,
    subscriber: async_nats::Subscriber,
}

impl NatsSubscription {
    pub async fn connect(settings: &NatsSettings) -> Result<Self, BackendError> {
        let address = settings.address();
        let client = async_nats::connect(address.as_str())
            .await
            .map_err(|e| BackendError::TransportFatal(e.to_string()))?;
        let subscriber = client
            .subscribe(settings.nats_subject.clone())
            .await
            .map_err(|e| BackendError::TransportFatal(e.to_string()))?;

        tracing::info!(%address, subject = %settings.nats_subject, "Subscribed to NATS subject");

        Ok(Self { client, subscriber })
    }
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next_message(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<PubSubMessage>, BackendError> {
        match tokio::time::timeout(timeout, self.subscriber.next()).await {
            Err(_) => Ok(None),
            // The stream only ends when the connection is gone for good.
            Ok(None) => Err(BackendError::TransportFatal(
                "NATS subscription closed".into(),
            )),
            Ok(Some(message)) => Ok(Some(PubSubMessage {
                subject: message.subject.to_string(),
                reply: message.reply.map(|r| r.to_string()),
                payload: message.payload.to_vec(),
            })),
        }
    }

    async fn ack(&self, message: &PubSubMessage) -> Result<(), BackendError> {
        let Some(reply) = &message.reply else {
            return Ok(());
        };
        self.client
            .publish(reply.clone(), Vec::<u8>::new().into())
            .await
            .map_err(|e| BackendError::Commit(e.to_string()))
    }
}
