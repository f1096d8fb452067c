//! Mailgun adapter tests.

use courier::providers::{MailgunMailer, MAILGUN_EU_BASE_URL};
use courier::{Email, MailError, Mailer};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helper Functions
// ============================================================================

fn valid_email() -> Email {
    Email::new()
        .from("team@example.com")
        .to("ada@example.com")
        .subject("Reset your password")
        .html_body("<h1>Hello</h1>")
}

fn success_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "message": "Queued. Thank you.",
        "id": "<20111114174239.25659.5817@samples.mailgun.org>"
    }))
}

// ============================================================================
// Single Delivery
// ============================================================================

#[tokio::test]
async fn successful_delivery_returns_ok() {
    let server = MockServer::start().await;
    let mailer = MailgunMailer::new("fake-api-key", "mg.example.com").base_url(server.uri());

    let expected_auth = format!(
        "Basic {}",
        base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            "api:fake-api-key"
        )
    );

    Mock::given(method("POST"))
        .and(path("/mg.example.com/messages"))
        .and(header("Authorization", expected_auth.as_str()))
        .and(body_string_contains("ada@example.com"))
        .and(body_string_contains("Reset your password"))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    let delivery = mailer.send(&valid_email()).await.unwrap();
    assert_eq!(
        delivery.message_id,
        "<20111114174239.25659.5817@samples.mailgun.org>"
    );
}

#[tokio::test]
async fn tag_is_sent_as_option() {
    let server = MockServer::start().await;
    let mailer = MailgunMailer::new("fake-api-key", "mg.example.com").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mg.example.com/messages"))
        .and(body_string_contains("name=\"o:tag\""))
        .and(body_string_contains("name=\"h:X-Mailgun-Variables\""))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    let email = valid_email().tag("reset").metadata("task_type", "email:reset");
    assert!(mailer.send(&email).await.is_ok());
}

#[tokio::test]
async fn error_message_is_extracted() {
    let server = MockServer::start().await;
    let mailer = MailgunMailer::new("fake-api-key", "mg.example.com").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mg.example.com/messages"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid private key"})),
        )
        .mount(&server)
        .await;

    let err = mailer.send(&valid_email()).await.unwrap_err();
    match err {
        MailError::ProviderError { provider, message, status } => {
            assert_eq!(provider, "mailgun");
            assert_eq!(message, "Invalid private key");
            assert_eq!(status, Some(401));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// Batch
// ============================================================================

#[tokio::test]
async fn batch_sends_recipient_variables_in_one_request() {
    let server = MockServer::start().await;
    let mailer = MailgunMailer::new("fake-api-key", "mg.example.com").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mg.example.com/messages"))
        .and(body_string_contains("a@example.com, b@example.com"))
        .and(body_string_contains("name=\"recipient-variables\""))
        .and(body_string_contains(r#"{"a@example.com":{},"b@example.com":{}}"#))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    let results = mailer
        .send_batch(&valid_email(), &["a@example.com".into(), "b@example.com".into()])
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn eu_base_url_points_at_eu_region() {
    assert!(MAILGUN_EU_BASE_URL.contains(".eu."));
}

#[test]
fn missing_domain_fails_validation() {
    assert!(MailgunMailer::new("key", "").validate_config().is_err());
    assert!(MailgunMailer::new("", "mg.example.com").validate_config().is_err());
    assert!(MailgunMailer::new("key", "mg.example.com").validate_config().is_ok());
}
