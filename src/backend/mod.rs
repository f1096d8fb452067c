//! Backend adapters: where email tasks come from.
//!
//! Each adapter pulls units of work from its transport, hands
//! `(task_type, payload)` to the shared [`TaskProcessor`] inside an
//! `email.task` span, and applies its own acknowledgement policy:
//!
//! | Adapter | Ack policy |
//! |---------|------------|
//! | [`http`] | Synchronous response per request |
//! | [`queue`] | Ack on success, retry or archive on failure |
//! | [`log`] | Commit after success only |
//! | [`pubsub`] | Ack before processing |
//!
//! Loops stop between units once the shutdown token is cancelled. Only a
//! [`BackendError::TransportFatal`] ends a loop with an error.

pub mod http;
pub mod log;
pub mod pubsub;
pub mod queue;

#[cfg(feature = "kafka")]
mod kafka;
#[cfg(feature = "kafka")]
pub use kafka::KafkaReader;

#[cfg(feature = "nats")]
mod nats;
#[cfg(feature = "nats")]
pub use nats::NatsSubscription;

#[cfg(feature = "redis")]
mod redis_queue;
#[cfg(feature = "redis")]
pub use redis_queue::RedisQueue;

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{Backend, Settings};
use crate::processor::TaskProcessor;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Offset or acknowledgement could not be recorded.
    #[error("commit failed: {0}")]
    Commit(String),

    /// The transport cannot continue; the consumer loop ends.
    #[error("transport failure: {0}")]
    TransportFatal(String),

    /// Queue storage operation failed.
    #[error("queue error: {0}")]
    Queue(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::TransportFatal(_))
    }
}

/// Span wrapping the processing of one unit of work.
pub fn task_span(backend: &'static str, task_type: &str) -> tracing::Span {
    tracing::info_span!("email.task", backend, task_type = %task_type)
}

/// Run a blocking client call on the blocking pool so a stalled broker
/// never holds a runtime worker thread.
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
pub(crate) async fn off_runtime<T, F>(call: F) -> Result<T, BackendError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| BackendError::Commit(e.to_string()))
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Run the configured primary backend until shutdown or a fatal error.
///
/// [`Backend::None`] returns immediately; the HTTP surface is driven
/// separately.
pub async fn run(
    settings: &Settings,
    processor: Arc<TaskProcessor>,
    shutdown: CancellationToken,
) -> Result<(), BackendError> {
    match settings.backend {
        Backend::None => Ok(()),

        #[cfg(feature = "redis")]
        Backend::Queue => {
            let queue = Arc::new(RedisQueue::connect(&settings.redis, &settings.queue).await?);

            let stop = shutdown.child_token();
            let maintenance = tokio::spawn({
                let queue = queue.clone();
                let stop = stop.clone();
                async move { queue.maintain(stop).await }
            });

            let result = queue::Worker::new(queue.clone(), processor)
                .concurrency(settings.concurrency)
                .max_retry(settings.redis.max_retry)
                .run(shutdown)
                .await;

            stop.cancel();
            let _ = maintenance.await;
            match queue.release().await {
                Ok(requeued) => tracing::info!(requeued, "released queue worker"),
                Err(e) => tracing::warn!(error = %e, "failed to release queue worker"),
            }
            result
        }

        #[cfg(feature = "kafka")]
        Backend::Kafka => {
            let reader = KafkaReader::new(&settings.kafka)?;
            log::LogConsumer::new(reader, processor)
                .commit_retry_delay(std::time::Duration::from_millis(
                    settings.kafka.kafka_commit_retry_ms,
                ))
                .run(shutdown)
                .await
        }

        #[cfg(feature = "nats")]
        Backend::Nats => {
            let subscription = NatsSubscription::connect(&settings.nats).await?;
            pubsub::PubSubConsumer::new(subscription, processor)
                .run(shutdown)
                .await
        }

        #[allow(unreachable_patterns)]
        other => Err(BackendError::TransportFatal(format!(
            "backend '{}' is not compiled in",
            other.as_str()
        ))),
    }
}

/// Serde adapter storing raw bytes as a standard base64 string.
pub(crate) mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
