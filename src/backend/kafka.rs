use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::{Message, Offset, TopicPartitionList};

use super::log::{LogMessage, PartitionReader};
use super::{off_runtime, BackendError};
use crate::config::KafkaSettings;

/// [`PartitionReader`] over a Kafka consumer group with manual commits.
pub struct KafkaReader {
    consumer: Arc<StreamConsumer>,
}

impl KafkaReader {
    pub fn new(settings: &KafkaSettings) -> Result<Self, BackendError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", settings.kafka_addresses.join(","))
            .set("group.id", &settings.kafka_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BackendError::TransportFatal(e.to_string()))?;

        consumer
            .subscribe(&[settings.kafka_topic.as_str()])
            .map_err(|e| BackendError::TransportFatal(e.to_string()))?;

        tracing::info!(
            brokers = %settings.kafka_addresses.join(","),
            topic = %settings.kafka_topic,
            group = %settings.kafka_group,
            "Subscribed to Kafka topic"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }
}

fn classify(e: KafkaError) -> BackendError {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::Fatal) => BackendError::TransportFatal(e.to_string()),
        _ => BackendError::Queue(e.to_string()),
    }
}

#[async_trait]
impl PartitionReader for KafkaReader {
    async fn fetch(&self) -> Result<LogMessage, BackendError> {
        let message = self.consumer.recv().await.map_err(classify)?;
        Ok(LogMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&self, message: &LogMessage) -> Result<(), BackendError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| BackendError::Commit(e.to_string()))?;

        // A synchronous commit blocks until the broker answers.
        let consumer = self.consumer.clone();
        off_runtime(move || consumer.commit(&offsets, CommitMode::Sync))
            .await?
            .map_err(|e| BackendError::Commit(e.to_string()))
    }
}
