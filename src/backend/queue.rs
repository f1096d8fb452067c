//! Work queue backend.
//!
//! A [`Worker`] pulls [`QueuedTask`]s from any [`QueueProvider`] and runs up
//! to `concurrency` of them at once. The worker owns the outcome policy:
//!
//! - success: `ack`
//! - retryable failure (template or delivery): `retry` with exponential
//!   backoff until `max_retry` attempts, then `archive`
//! - anything else: `archive` immediately
//!
//! [`MemoryQueue`] is an in-process provider for development and tests. The
//! Redis provider lives behind the `redis` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::{base64_bytes, task_span, BackendError};
use crate::processor::TaskProcessor;

/// Longest delay between two attempts of the same task.
const MAX_BACKOFF_SECS: u64 = 300;

/// A task as stored in a work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub max_retry: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Exact stored form this task was dequeued as, for providers that
    /// address entries by value.
    #[serde(skip)]
    pub lease: Option<String>,
}

impl QueuedTask {
    pub fn new(task_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            payload: payload.into(),
            attempts: 0,
            max_retry: 0,
            last_error: None,
            lease: None,
        }
    }

    /// Cap the number of attempts; 0 defers to the worker's setting.
    pub fn max_retry(mut self, n: u32) -> Self {
        self.max_retry = n;
        self
    }
}

/// Delay before attempt `attempts + 1`: `2^attempts` seconds, capped.
pub fn backoff(attempts: u32) -> Duration {
    Duration::from_secs(2_u64.saturating_pow(attempts).min(MAX_BACKOFF_SECS))
}

/// Storage for queued tasks.
///
/// `dequeue` moves a task into an in-flight state that survives until the
/// worker settles it with exactly one of `ack`, `retry` or `archive`.
#[async_trait]
pub trait QueueProvider: Send + Sync + 'static {
    async fn enqueue(&self, task: QueuedTask) -> Result<(), BackendError>;

    /// Wait up to `wait` for the next ready task.
    async fn dequeue(&self, wait: Duration) -> Result<Option<QueuedTask>, BackendError>;

    /// The task completed; forget it.
    async fn ack(&self, task: &QueuedTask) -> Result<(), BackendError>;

    /// Make the task ready again after `delay`. `task` carries the updated
    /// attempt count and last error.
    async fn retry(&self, task: &QueuedTask, delay: Duration) -> Result<(), BackendError>;

    /// Move the task to the dead set for inspection.
    async fn archive(&self, task: &QueuedTask) -> Result<(), BackendError>;
}

#[derive(Debug, Default)]
struct MemoryQueueState {
    pending: VecDeque<QueuedTask>,
    active: HashMap<String, QueuedTask>,
    scheduled: Vec<(Instant, QueuedTask)>,
    archived: Vec<QueuedTask>,
    completed: usize,
}

impl MemoryQueueState {
    fn promote_due(&mut self, now: Instant) {
        let (due, later): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|(at, _)| *at <= now);
        self.scheduled = later;
        self.pending.extend(due.into_iter().map(|(_, task)| task));
    }

    fn next_due(&self) -> Option<Instant> {
        self.scheduled.iter().map(|(at, _)| *at).min()
    }
}

/// In-process [`QueueProvider`]. Nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<MemoryQueueState>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn scheduled(&self) -> Vec<QueuedTask> {
        self.state
            .lock()
            .scheduled
            .iter()
            .map(|(_, task)| task.clone())
            .collect()
    }

    pub fn archived(&self) -> Vec<QueuedTask> {
        self.state.lock().archived.clone()
    }

    pub fn completed(&self) -> usize {
        self.state.lock().completed
    }
}

#[async_trait]
impl QueueProvider for MemoryQueue {
    async fn enqueue(&self, task: QueuedTask) -> Result<(), BackendError> {
        self.state.lock().pending.push_back(task);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<QueuedTask>, BackendError> {
        let deadline = Instant::now() + wait;

        loop {
            let wake_at = {
                let mut state = self.state.lock();
                state.promote_due(Instant::now());

                if let Some(task) = state.pending.pop_front() {
                    state.active.insert(task.id.clone(), task.clone());
                    return Ok(Some(task));
                }

                match state.next_due() {
                    Some(due) => due.min(deadline),
                    None => deadline,
                }
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Either a producer wakes us or the next scheduled task comes due.
            let _ = tokio::time::timeout_at(wake_at, self.notify.notified()).await;
        }
    }

    async fn ack(&self, task: &QueuedTask) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.active.remove(&task.id);
        state.completed += 1;
        Ok(())
    }

    async fn retry(&self, task: &QueuedTask, delay: Duration) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.active.remove(&task.id);
        state.scheduled.push((Instant::now() + delay, task.clone()));
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn archive(&self, task: &QueuedTask) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.active.remove(&task.id);
        state.archived.push(task.clone());
        Ok(())
    }
}

/// Bounded-concurrency consumer of a [`QueueProvider`].
///
/// ```ignore
/// Worker::new(Arc::new(queue), processor)
///     .concurrency(10)
///     .run(shutdown)
///     .await?;
/// ```
pub struct Worker {
    queue: Arc<dyn QueueProvider>,
    processor: Arc<TaskProcessor>,
    concurrency: usize,
    max_retry: u32,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(queue: Arc<dyn QueueProvider>, processor: Arc<TaskProcessor>) -> Self {
        Self {
            queue,
            processor,
            concurrency: 10,
            max_retry: 25,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Maximum number of tasks processed in parallel (default: 10).
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Attempts before a retryable task is archived, for tasks that do not
    /// carry their own limit (default: 25).
    pub fn max_retry(mut self, n: u32) -> Self {
        self.max_retry = n;
        self
    }

    /// How long one `dequeue` waits before the loop checks for shutdown
    /// again (default: 1s).
    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    /// Consume until `shutdown` is cancelled, then wait for in-flight tasks.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), BackendError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let tracker = TaskTracker::new();

        tracing::info!(concurrency = self.concurrency, "Queue worker running");

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.queue.dequeue(self.poll_interval) => next,
            };

            let task = match next {
                Ok(Some(task)) => task,
                Ok(None) => continue,
                Err(e) if e.is_fatal() => {
                    tracker.close();
                    tracker.wait().await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to poll queue");
                    drop(permit);
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            let queue = self.queue.clone();
            let processor = self.processor.clone();
            let max_retry = if task.max_retry > 0 {
                task.max_retry
            } else {
                self.max_retry
            };
            let span = task_span("queue", &task.task_type);

            tracker.spawn(
                async move {
                    let _permit = permit;
                    handle(queue.as_ref(), &processor, task, max_retry).await;
                }
                .instrument(span),
            );
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!("Queue worker stopped");
        Ok(())
    }
}

async fn handle(
    queue: &dyn QueueProvider,
    processor: &TaskProcessor,
    mut task: QueuedTask,
    max_retry: u32,
) {
    let started = std::time::Instant::now();
    tracing::info!(task_id = %task.id, "Processing task");

    let result = processor.process(&task.task_type, &task.payload).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let settled = match result {
        Ok(_) => {
            tracing::info!(task_id = %task.id, elapsed_ms, "Task completed");
            queue.ack(&task).await
        }
        Err(e) => {
            task.attempts += 1;
            task.last_error = Some(e.to_string());

            if e.is_retryable() && task.attempts < max_retry {
                let delay = backoff(task.attempts);
                tracing::warn!(
                    task_id = %task.id,
                    attempt = task.attempts,
                    elapsed_ms,
                    backoff_secs = delay.as_secs(),
                    "Task failed, scheduling retry"
                );
                queue.retry(&task, delay).await
            } else {
                tracing::error!(
                    task_id = %task.id,
                    attempts = task.attempts,
                    elapsed_ms,
                    "Task archived"
                );
                queue.archive(&task).await
            }
        }
    };

    if let Err(e) = settled {
        tracing::error!(task_id = %task.id, error = %e, "failed to settle task");
    }
}
