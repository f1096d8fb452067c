//! Partitioned log backend.
//!
//! Messages are consumed sequentially. The message key names the task type
//! and the value is the JSON body. An offset is committed only after the
//! task was delivered; a failing task is logged and skipped without a
//! commit, so it is replayed only if the consumer group rewinds (at most once
//! on failure). A failed commit is retried once after a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{task_span, BackendError};
use crate::processor::TaskProcessor;

/// One record read from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl LogMessage {
    /// The key as a task type; empty when missing or not UTF-8.
    pub fn task_type(&self) -> &str {
        self.key
            .as_deref()
            .and_then(|k| std::str::from_utf8(k).ok())
            .unwrap_or_default()
    }
}

/// Reader over a consumer group's assigned partitions.
#[async_trait]
pub trait PartitionReader: Send + Sync {
    /// Wait for the next message.
    async fn fetch(&self) -> Result<LogMessage, BackendError>;

    /// Record `message` as processed for the consumer group.
    async fn commit(&self, message: &LogMessage) -> Result<(), BackendError>;
}

pub struct LogConsumer<R> {
    reader: R,
    processor: Arc<TaskProcessor>,
    commit_retry_delay: Duration,
    fetch_retry_delay: Duration,
}

impl<R: PartitionReader> LogConsumer<R> {
    pub fn new(reader: R, processor: Arc<TaskProcessor>) -> Self {
        Self {
            reader,
            processor,
            commit_retry_delay: Duration::from_secs(2),
            fetch_retry_delay: Duration::from_secs(1),
        }
    }

    /// Delay before the single commit retry (default: 2s).
    pub fn commit_retry_delay(mut self, delay: Duration) -> Self {
        self.commit_retry_delay = delay;
        self
    }

    /// Pause after a failed read before fetching again (default: 1s).
    pub fn fetch_retry_delay(mut self, delay: Duration) -> Self {
        self.fetch_retry_delay = delay;
        self
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Consume until `shutdown` is cancelled or the reader fails fatally.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), BackendError> {
        tracing::info!("Log consumer running");

        loop {
            let fetched = tokio::select! {
                _ = shutdown.cancelled() => break,
                fetched = self.reader.fetch() => fetched,
            };

            let message = match fetched {
                Ok(message) => message,
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "log reader failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read message");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.fetch_retry_delay) => continue,
                    }
                }
            };

            self.handle(&message).await;
        }

        tracing::info!("Log consumer stopped");
        Ok(())
    }

    async fn handle(&self, message: &LogMessage) {
        let task_type = message.task_type();
        let span = task_span("kafka", task_type);

        let processed = self
            .processor
            .process(task_type, &message.payload)
            .instrument(span.clone())
            .await;

        if let Err(e) = processed {
            tracing::debug!(
                parent: &span,
                partition = message.partition,
                offset = message.offset,
                kind = e.kind().as_str(),
                "skipping message without commit"
            );
            return;
        }

        if let Err(first) = self.reader.commit(message).await {
            tracing::warn!(
                parent: &span,
                offset = message.offset,
                error = %first,
                "commit failed, retrying"
            );
            tokio::time::sleep(self.commit_retry_delay).await;

            if let Err(e) = self.reader.commit(message).await {
                tracing::error!(
                    parent: &span,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "failed to commit message"
                );
            }
        }
    }
}
