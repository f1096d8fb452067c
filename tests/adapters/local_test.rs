//! Local adapter tests.

use courier::providers::LocalMailer;
use courier::testing::*;
use courier::{Email, MailError, Mailer};

fn email_to(recipient: &str) -> Email {
    Email::new()
        .from("team@example.com")
        .to(recipient)
        .subject("Hello")
        .html_body("<p>Hello!</p>")
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn send_stores_the_email() {
    let mailer = LocalMailer::new();

    let delivery = mailer.send(&email_to("ada@example.com")).await.unwrap();

    assert_email_count(&mailer, 1);
    assert_email_to(&mailer, "ada@example.com");
    assert_email_from(&mailer, "team@example.com");
    assert_email_html_contains(&mailer, "Hello!");
    assert_eq!(mailer.last_email().unwrap().id, delivery.message_id);
}

#[tokio::test]
async fn failure_mode_rejects_without_storing() {
    let mailer = LocalMailer::new();
    mailer.set_failure("vendor unavailable");

    let err = mailer.send(&email_to("ada@example.com")).await.unwrap_err();
    assert!(matches!(err, MailError::SendError(ref m) if m == "vendor unavailable"));
    assert_no_emails_sent(&mailer);

    mailer.clear_failure();
    assert!(mailer.send(&email_to("ada@example.com")).await.is_ok());
    assert_email_sent(&mailer);
}

// ============================================================================
// Batch (default fan-out)
// ============================================================================

#[tokio::test]
async fn batch_sends_one_copy_per_recipient() {
    let mailer = LocalMailer::new();
    let email = email_to("placeholder@example.com").cc("boss@example.com");

    let results = mailer
        .send_batch(&email, &["a@example.com".into(), "b@example.com".into()])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(mailer.sent_to("a@example.com"));
    assert!(mailer.sent_to("b@example.com"));
    assert!(!mailer.sent_to("placeholder@example.com"));
    assert!(mailer.emails().iter().all(|s| s.email.cc.is_empty()));
}

// ============================================================================
// Storage
// ============================================================================

#[tokio::test]
async fn shared_storage_sees_every_send() {
    let storage = courier::MemoryStorage::shared();
    let mailer = LocalMailer::with_storage(storage.clone());

    mailer.send(&email_to("a@example.com")).await.unwrap();
    mailer.send(&email_to("b@example.com")).await.unwrap();

    assert_eq!(storage.count(), 2);
    let flushed = mailer.flush();
    assert_eq!(flushed.len(), 2);
    assert_eq!(storage.count(), 0);
}

#[tokio::test]
async fn find_emails_filters_by_predicate() {
    let mailer = LocalMailer::new();
    mailer.send(&email_to("a@example.com").tag("welcome")).await.unwrap();
    mailer.send(&email_to("b@example.com").tag("reset")).await.unwrap();

    let resets = mailer.find_emails(|e| e.tag.as_deref() == Some("reset"));
    assert_eq!(resets.len(), 1);
    assert_eq!(resets[0].email.to[0].email, "b@example.com");
}
