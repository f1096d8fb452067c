//! Work queue worker tests against the in-process queue.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier::backend::queue::{MemoryQueue, QueueProvider, QueuedTask, Worker};
use courier::providers::LocalMailer;
use courier::{DeliveryResult, Email, MailError, Mailer};
use tokio_util::sync::CancellationToken;

use common::{processor, reset_payload};

/// Run a worker until `done` holds, then shut it down.
async fn run_until(
    queue: &MemoryQueue,
    mailer: Arc<dyn Mailer>,
    concurrency: usize,
    max_retry: u32,
    done: impl Fn(&MemoryQueue) -> bool,
) {
    let shutdown = CancellationToken::new();
    let worker = Worker::new(Arc::new(queue.clone()), processor(mailer))
        .concurrency(concurrency)
        .max_retry(max_retry)
        .poll_interval(Duration::from_millis(10));
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(queue) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker did not settle the queue in time");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn successful_task_is_acked() {
    let queue = MemoryQueue::new();
    let mailer = Arc::new(LocalMailer::new());
    queue
        .enqueue(QueuedTask::new("email:reset", reset_payload("a@example.com")))
        .await
        .unwrap();

    run_until(&queue, mailer.clone(), 2, 25, |q| q.completed() == 1).await;

    assert_eq!(queue.active_len(), 0);
    assert!(queue.archived().is_empty());
    assert!(mailer.sent_to("a@example.com"));
}

#[tokio::test]
async fn invalid_task_is_archived_without_retry() {
    let queue = MemoryQueue::new();
    let mailer = Arc::new(LocalMailer::new());
    queue
        .enqueue(QueuedTask::new("email:reset", reset_payload("")))
        .await
        .unwrap();

    run_until(&queue, mailer.clone(), 2, 25, |q| q.archived().len() == 1).await;

    let archived = queue.archived();
    assert_eq!(archived[0].attempts, 1);
    assert_eq!(
        archived[0].last_error.as_deref(),
        Some("invalid to parameter")
    );
    assert!(queue.scheduled().is_empty());
    assert_eq!(mailer.email_count(), 0);
}

#[tokio::test]
async fn delivery_failure_is_scheduled_for_retry() {
    let queue = MemoryQueue::new();
    let mailer = Arc::new(LocalMailer::new());
    mailer.set_failure("vendor unavailable");
    queue
        .enqueue(QueuedTask::new("email:reset", reset_payload("a@example.com")))
        .await
        .unwrap();

    run_until(&queue, mailer, 2, 25, |q| q.scheduled().len() == 1).await;

    let scheduled = queue.scheduled();
    assert_eq!(scheduled[0].attempts, 1);
    assert!(scheduled[0]
        .last_error
        .as_deref()
        .unwrap()
        .contains("vendor unavailable"));
    assert!(queue.archived().is_empty());
}

#[tokio::test]
async fn retries_exhausted_task_is_archived() {
    let queue = MemoryQueue::new();
    let mailer = Arc::new(LocalMailer::new());
    mailer.set_failure("vendor unavailable");
    queue
        .enqueue(QueuedTask::new("email:reset", reset_payload("a@example.com")).max_retry(1))
        .await
        .unwrap();

    run_until(&queue, mailer, 2, 25, |q| q.archived().len() == 1).await;

    assert!(queue.scheduled().is_empty());
    assert_eq!(queue.archived()[0].attempts, 1);
}

/// Mailer that holds each send briefly and tracks the peak number of
/// concurrent sends.
#[derive(Default)]
struct SlowMailer {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    sent: AtomicUsize,
}

#[async_trait]
impl Mailer for SlowMailer {
    async fn send(&self, _email: &Email) -> Result<DeliveryResult, MailError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryResult::new("id"))
    }
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let queue = MemoryQueue::new();
    let mailer = Arc::new(SlowMailer::default());
    for i in 0..12 {
        queue
            .enqueue(QueuedTask::new(
                "email:reset",
                reset_payload(&format!("user{i}@example.com")),
            ))
            .await
            .unwrap();
    }

    run_until(&queue, mailer.clone(), 3, 25, |q| q.completed() == 12).await;

    assert_eq!(mailer.sent.load(Ordering::SeqCst), 12);
    let peak = mailer.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {peak}");
    assert!(peak > 1, "tasks never overlapped");
}
