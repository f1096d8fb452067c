//! Redis-backed reliable work queue.
//!
//! ## Keys
//!
//! - `courier:{queue}:pending` - list of ready tasks, consumed from the right
//! - `courier:{queue}:active:{worker}` - tasks one worker is processing
//! - `courier:{queue}:workers` - sorted set of worker ids, scored by last heartbeat (ms)
//! - `courier:{queue}:scheduled` - sorted set of retries, scored by due time (ms)
//! - `courier:{queue}:archived` - list of tasks that will not be retried
//!
//! `BLMOVE` moves a task from pending into the worker's own active list
//! atomically, so a crash never loses it. A worker whose heartbeat is older
//! than the lease TTL is presumed dead: whoever notices first claims it and
//! pushes its active list back to pending. Live peers are never touched.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;

use super::queue::{QueueProvider, QueuedTask};
use super::BackendError;
use crate::config::RedisSettings;

impl From<redis::RedisError> for BackendError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() {
            BackendError::TransportFatal(e.to_string())
        } else {
            BackendError::Queue(e.to_string())
        }
    }
}

#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    /// Dedicated connection for `BLMOVE`, which would otherwise stall every
    /// command multiplexed behind it.
    blocking: ConnectionManager,
    worker_id: String,
    lease_ttl: Duration,
    prefix: String,
    pending: String,
    active: String,
    workers: String,
    scheduled: String,
    archived: String,
}

impl RedisQueue {
    /// Connect using the service settings.
    pub async fn connect(settings: &RedisSettings, queue: &str) -> Result<Self, BackendError> {
        let url = settings
            .url()
            .map_err(|e| BackendError::TransportFatal(e.to_string()))?;
        Self::open(url.as_str(), queue).await
    }

    /// Connect to `url`, register this worker and recover tasks that dead
    /// workers left in flight.
    pub async fn open(url: &str, queue: &str) -> Result<Self, BackendError> {
        let client =
            redis::Client::open(url).map_err(|e| BackendError::TransportFatal(e.to_string()))?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let blocking = ConnectionManager::new(client).await?;

        let queue = Self::with_connections(conn, blocking, queue);
        queue.heartbeat().await?;
        let recovered = queue.recover().await?;
        tracing::info!(
            queue = %queue.pending,
            worker = %queue.worker_id,
            recovered,
            "Connected to Redis work queue"
        );
        Ok(queue)
    }

    pub fn with_connections(conn: ConnectionManager, blocking: ConnectionManager, queue: &str) -> Self {
        let prefix = format!("courier:{queue}");
        let worker_id = uuid::Uuid::new_v4().to_string();
        Self {
            conn,
            blocking,
            active: format!("{prefix}:active:{worker_id}"),
            pending: format!("{prefix}:pending"),
            workers: format!("{prefix}:workers"),
            scheduled: format!("{prefix}:scheduled"),
            archived: format!("{prefix}:archived"),
            worker_id,
            lease_ttl: Duration::from_secs(30),
            prefix,
        }
    }

    /// How long a silent worker keeps its in-flight tasks (default: 30s).
    pub fn lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Record that this worker is alive.
    pub async fn heartbeat(&self) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let now = chrono::Utc::now().timestamp_millis();
        let _: () = conn.zadd(&self.workers, &self.worker_id, now).await?;
        Ok(())
    }

    /// Push the in-flight tasks of every expired worker back to pending.
    /// Returns how many moved.
    pub async fn recover(&self) -> Result<usize, BackendError> {
        let mut conn = self.conn.clone();
        let cutoff = chrono::Utc::now().timestamp_millis() - self.lease_ttl.as_millis() as i64;

        let expired: Vec<String> = conn
            .zrangebyscore(&self.workers, "-inf", format!("({cutoff}"))
            .await?;

        let mut moved = 0;
        for worker in expired {
            if worker == self.worker_id {
                continue;
            }
            // Only the caller that removes the worker requeues its tasks.
            let claimed: i64 = conn.zrem(&self.workers, &worker).await?;
            if claimed == 0 {
                continue;
            }
            let requeued = self.drain(&format!("{}:active:{worker}", self.prefix)).await?;
            if requeued > 0 {
                tracing::warn!(%worker, requeued, "recovered tasks from expired worker");
            }
            moved += requeued;
        }
        Ok(moved)
    }

    /// Requeue whatever is left in this worker's active list and deregister.
    ///
    /// Call once the worker has stopped; entries left behind by a cancelled
    /// `BLMOVE` end up here.
    pub async fn release(&self) -> Result<usize, BackendError> {
        let moved = self.drain(&self.active).await?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.zrem(&self.workers, &self.worker_id).await?;
        Ok(moved)
    }

    /// Heartbeat and recover expired peers until `shutdown` is cancelled.
    pub async fn maintain(&self, shutdown: CancellationToken) {
        let period = self.lease_ttl / 3;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
            if let Err(e) = self.heartbeat().await {
                tracing::warn!(error = %e, "queue heartbeat failed");
                continue;
            }
            if let Err(e) = self.recover().await {
                tracing::warn!(error = %e, "queue recovery failed");
            }
        }
    }

    async fn drain(&self, active: &str) -> Result<usize, BackendError> {
        let mut conn = self.conn.clone();
        let mut moved = 0;
        loop {
            let task: Option<String> = redis::cmd("LMOVE")
                .arg(active)
                .arg(&self.pending)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if task.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Move retries whose due time has passed back to pending.
    async fn promote_due(&self) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let now = chrono::Utc::now().timestamp_millis();

        let due: Vec<String> = conn.zrangebyscore(&self.scheduled, "-inf", now).await?;
        for task in due {
            // Only the caller that removes the entry re-queues it.
            let removed: i64 = conn.zrem(&self.scheduled, &task).await?;
            if removed > 0 {
                let _: () = conn.lpush(&self.pending, &task).await?;
            }
        }
        Ok(())
    }

    fn lease<'a>(&self, task: &'a QueuedTask) -> Result<&'a str, BackendError> {
        task.lease
            .as_deref()
            .ok_or_else(|| BackendError::Queue(format!("task {} was not dequeued", task.id)))
    }

    fn encode(task: &QueuedTask) -> Result<String, BackendError> {
        serde_json::to_string(task).map_err(|e| BackendError::Queue(e.to_string()))
    }
}

#[async_trait]
impl QueueProvider for RedisQueue {
    async fn enqueue(&self, task: QueuedTask) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(&self.pending, Self::encode(&task)?).await?;
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<QueuedTask>, BackendError> {
        self.promote_due().await?;

        let mut blocking = self.blocking.clone();
        let raw: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.pending)
            .arg(&self.active)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64())
            .query_async(&mut blocking)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<QueuedTask>(&raw) {
            Ok(mut task) => {
                task.lease = Some(raw);
                Ok(Some(task))
            }
            Err(e) => {
                // Unreadable entries go straight to the dead list.
                tracing::warn!(error = %e, "discarding malformed queue entry");
                let mut conn = self.conn.clone();
                redis::pipe()
                    .atomic()
                    .lrem(&self.active, 1, &raw)
                    .ignore()
                    .lpush(&self.archived, &raw)
                    .ignore()
                    .query_async::<_, ()>(&mut conn)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, task: &QueuedTask) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let _: () = conn.lrem(&self.active, 1, self.lease(task)?).await?;
        Ok(())
    }

    async fn retry(&self, task: &QueuedTask, delay: Duration) -> Result<(), BackendError> {
        let due = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .lrem(&self.active, 1, self.lease(task)?)
            .ignore()
            .zadd(&self.scheduled, Self::encode(task)?, due)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn archive(&self, task: &QueuedTask) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .lrem(&self.active, 1, self.lease(task)?)
            .ignore()
            .lpush(&self.archived, Self::encode(task)?)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
