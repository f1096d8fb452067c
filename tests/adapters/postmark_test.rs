//! Postmark adapter tests.

use courier::providers::PostmarkMailer;
use courier::{Email, MailError, Mailer};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helper Functions
// ============================================================================

fn valid_email() -> Email {
    Email::new()
        .from("team@example.com")
        .to("ada@example.com")
        .subject("Welcome aboard")
        .html_body("<h1>Hello</h1>")
}

fn success_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "ErrorCode": 0,
        "Message": "OK",
        "MessageID": "b7bc2f4a-e38e-4336-af7d-e6c392c2f817",
        "SubmittedAt": "2010-11-26T12:01:05.1794748-05:00",
        "To": "ada@example.com"
    }))
}

// ============================================================================
// Single Delivery
// ============================================================================

#[tokio::test]
async fn successful_delivery_returns_ok() {
    let server = MockServer::start().await;
    let mailer = PostmarkMailer::new("server-token").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/email"))
        .and(header("X-Postmark-Server-Token", "server-token"))
        .and(header("Content-Type", "application/json"))
        .and(body_string_contains("\"Subject\":\"Welcome aboard\""))
        .and(body_string_contains("\"To\":\"ada@example.com\""))
        .and(body_string_contains("\"From\":\"team@example.com\""))
        .and(body_string_contains("\"HtmlBody\":\"<h1>Hello</h1>\""))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    let delivery = mailer.send(&valid_email()).await.unwrap();
    assert_eq!(delivery.message_id, "b7bc2f4a-e38e-4336-af7d-e6c392c2f817");
}

#[tokio::test]
async fn tag_metadata_and_stream_are_sent() {
    let server = MockServer::start().await;
    let mailer = PostmarkMailer::new("server-token")
        .base_url(server.uri())
        .message_stream("outbound");

    let email = valid_email()
        .tag("welcome")
        .metadata("task_type", "email:welcome");

    Mock::given(method("POST"))
        .and(path("/email"))
        .and(body_string_contains("\"Tag\":\"welcome\""))
        .and(body_string_contains("\"MessageStream\":\"outbound\""))
        .and(body_string_contains("\"Metadata\":{\"task_type\":\"email:welcome\"}"))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    assert!(mailer.send(&email).await.is_ok());
}

#[tokio::test]
async fn named_addresses_are_formatted() {
    let server = MockServer::start().await;
    let mailer = PostmarkMailer::new("server-token").base_url(server.uri());

    let email = Email::new()
        .from(("Team", "team@example.com"))
        .to("ada@example.com")
        .to(("Grace Hopper", "grace@example.com"))
        .cc("lin@example.com")
        .reply_to("support@example.com")
        .subject("Hello")
        .text_body("Hello");

    Mock::given(method("POST"))
        .and(path("/email"))
        .and(body_string_contains("\"From\":\"Team <team@example.com>\""))
        .and(body_string_contains(
            "\"To\":\"ada@example.com, Grace Hopper <grace@example.com>\"",
        ))
        .and(body_string_contains("\"Cc\":\"lin@example.com\""))
        .and(body_string_contains("\"ReplyTo\":\"support@example.com\""))
        .and(body_string_contains("\"TextBody\":\"Hello\""))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    assert!(mailer.send(&email).await.is_ok());
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn api_error_carries_status_and_code() {
    let server = MockServer::start().await;
    let mailer = PostmarkMailer::new("server-token").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "ErrorCode": 300,
            "Message": "Invalid 'From' address"
        })))
        .mount(&server)
        .await;

    let err = mailer.send(&valid_email()).await.unwrap_err();
    match err {
        MailError::ProviderError {
            provider,
            message,
            status,
        } => {
            assert_eq!(provider, "postmark");
            assert_eq!(status, Some(422));
            assert!(message.contains("[300]"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_sender_is_rejected_before_request() {
    let server = MockServer::start().await;
    let mailer = PostmarkMailer::new("server-token").base_url(server.uri());

    Mock::given(method("POST"))
        .respond_with(success_response())
        .expect(0)
        .mount(&server)
        .await;

    let email = Email::new().to("ada@example.com").subject("Hi");
    let err = mailer.send(&email).await.unwrap_err();
    assert!(matches!(err, MailError::MissingField("from")));
}

// ============================================================================
// Batch
// ============================================================================

#[tokio::test]
async fn batch_sends_one_message_per_recipient() {
    let server = MockServer::start().await;
    let mailer = PostmarkMailer::new("server-token").base_url(server.uri());

    let email = Email::new()
        .from("team@example.com")
        .to("placeholder@example.com")
        .subject("News")
        .html_body("<p>News</p>");

    Mock::given(method("POST"))
        .and(path("/email/batch"))
        .and(body_json(json!([
            {"From": "team@example.com", "To": "a@example.com", "Subject": "News", "HtmlBody": "<p>News</p>"},
            {"From": "team@example.com", "To": "b@example.com", "Subject": "News", "HtmlBody": "<p>News</p>"}
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ErrorCode": 0, "Message": "OK", "MessageID": "id-a", "To": "a@example.com", "SubmittedAt": "2024-01-01T00:00:00Z"},
            {"ErrorCode": 0, "Message": "OK", "MessageID": "id-b", "To": "b@example.com", "SubmittedAt": "2024-01-01T00:00:00Z"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let results = mailer
        .send_batch(&email, &["a@example.com".into(), "b@example.com".into()])
        .await
        .unwrap();

    let ids: Vec<_> = results.iter().map(|r| r.message_id.as_str()).collect();
    assert_eq!(ids, vec!["id-a", "id-b"]);
}

#[tokio::test]
async fn batch_reports_per_message_failure() {
    let server = MockServer::start().await;
    let mailer = PostmarkMailer::new("server-token").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ErrorCode": 0, "Message": "OK", "MessageID": "id-a", "To": "a@example.com"},
            {"ErrorCode": 406, "Message": "Inactive recipient", "To": "b@example.com"}
        ])))
        .mount(&server)
        .await;

    let err = mailer
        .send_batch(&valid_email(), &["a@example.com".into(), "b@example.com".into()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Inactive recipient"));
}

#[test]
fn empty_token_fails_validation() {
    assert!(PostmarkMailer::new("").validate_config().is_err());
    assert!(PostmarkMailer::new("token").validate_config().is_ok());
}
