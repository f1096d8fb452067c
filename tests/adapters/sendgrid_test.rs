//! SendGrid adapter tests.

use courier::providers::SendGridMailer;
use courier::{Email, MailError, Mailer};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helper Functions
// ============================================================================

fn valid_email() -> Email {
    Email::new()
        .from("team@example.com")
        .to("ada@example.com")
        .subject("Verify your email")
        .html_body("<h1>Hello</h1>")
}

fn accepted() -> ResponseTemplate {
    ResponseTemplate::new(202).insert_header("X-Message-Id", "sg-message-1")
}

// ============================================================================
// Single Delivery
// ============================================================================

#[tokio::test]
async fn successful_delivery_returns_message_id() {
    let server = MockServer::start().await;
    let mailer = SendGridMailer::new("SG.key").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .and(header("Authorization", "Bearer SG.key"))
        .and(body_json(json!({
            "personalizations": [{"to": [{"email": "ada@example.com"}]}],
            "from": {"email": "team@example.com"},
            "subject": "Verify your email",
            "content": [{"type": "text/html", "value": "<h1>Hello</h1>"}]
        })))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let delivery = mailer.send(&valid_email()).await.unwrap();
    assert_eq!(delivery.message_id, "sg-message-1");
}

#[tokio::test]
async fn tag_and_metadata_map_to_categories_and_custom_args() {
    let server = MockServer::start().await;
    let mailer = SendGridMailer::new("SG.key").base_url(server.uri());

    let email = valid_email()
        .tag("verification")
        .metadata("task_type", "email:verification");

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .and(body_partial_json(json!({
            "categories": ["verification"],
            "custom_args": {"task_type": "email:verification"}
        })))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    assert!(mailer.send(&email).await.is_ok());
}

#[tokio::test]
async fn api_errors_are_joined() {
    let server = MockServer::start().await;
    let mailer = SendGridMailer::new("SG.key").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [
                {"message": "The from address does not match a verified Sender Identity."},
                {"message": "Invalid subject."}
            ]
        })))
        .mount(&server)
        .await;

    let err = mailer.send(&valid_email()).await.unwrap_err();
    match err {
        MailError::ProviderError { status, message, .. } => {
            assert_eq!(status, Some(400));
            assert!(message.contains("Sender Identity.; Invalid subject."));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// Batch
// ============================================================================

#[tokio::test]
async fn batch_uses_one_personalization_per_recipient() {
    let server = MockServer::start().await;
    let mailer = SendGridMailer::new("SG.key").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .and(body_partial_json(json!({
            "personalizations": [
                {"to": [{"email": "a@example.com"}]},
                {"to": [{"email": "b@example.com"}]},
                {"to": [{"email": "c@example.com"}]}
            ]
        })))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let recipients = vec![
        "a@example.com".to_string(),
        "b@example.com".to_string(),
        "c@example.com".to_string(),
    ];
    let results = mailer.send_batch(&valid_email(), &recipients).await.unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.message_id == "sg-message-1"));
}

#[tokio::test]
async fn empty_batch_makes_no_request() {
    let server = MockServer::start().await;
    let mailer = SendGridMailer::new("SG.key").base_url(server.uri());

    Mock::given(method("POST"))
        .respond_with(accepted())
        .expect(0)
        .mount(&server)
        .await;

    let results = mailer.send_batch(&valid_email(), &[]).await.unwrap();
    assert!(results.is_empty());
}
