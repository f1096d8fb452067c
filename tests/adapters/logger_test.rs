//! Logger adapter tests.

use courier::providers::LoggerMailer;
use courier::{Email, Mailer};

fn email() -> Email {
    Email::new()
        .from("team@example.com")
        .to("ada@example.com")
        .subject("Hello")
        .html_body("<h1>Hello!</h1>")
}

#[tokio::test]
async fn send_returns_message_id() {
    let mailer = LoggerMailer::new();

    let delivery = mailer.send(&email()).await.unwrap();
    assert!(!delivery.message_id.is_empty());
}

#[tokio::test]
async fn full_logging_returns_ok() {
    let mailer = LoggerMailer::full();
    assert!(mailer.send(&email()).await.is_ok());
}

#[tokio::test]
async fn batch_logs_each_recipient() {
    let mailer = LoggerMailer::new();
    let results = mailer
        .send_batch(&email(), &["a@example.com".into(), "b@example.com".into()])
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_ne!(results[0].message_id, results[1].message_id);
}

#[test]
fn provider_name_is_logger() {
    assert_eq!(LoggerMailer::new().provider_name(), "logger");
}
