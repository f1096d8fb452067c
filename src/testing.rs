//! Assertion helpers for tests that drive the dispatcher against a
//! [`LocalMailer`].
//!
//! ```rust,ignore
//! use courier::providers::LocalMailer;
//! use courier::testing::*;
//!
//! assert_email_sent(&mailer);
//! assert_email_to(&mailer, "user@example.com");
//! assert_email_html_contains(&mailer, "Welcome, Ada");
//! assert_no_placeholders(&mailer);
//! ```

use crate::providers::LocalMailer;
use crate::storage::StoredEmail;

/// Format a list of emails for error messages.
fn format_email_summary(emails: &[StoredEmail]) -> String {
    if emails.is_empty() {
        return "  (no emails sent)".to_string();
    }

    emails
        .iter()
        .enumerate()
        .map(|(i, stored)| {
            let e = &stored.email;
            let to = e
                .to
                .iter()
                .map(|a| a.email.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let from = e
                .from
                .as_ref()
                .map(|a| a.email.as_str())
                .unwrap_or("<none>");
            format!(
                "  {}. To: [{}], From: {}, Subject: \"{}\"",
                i + 1,
                to,
                from,
                e.subject
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_email(mailer: &LocalMailer) -> StoredEmail {
    mailer
        .last_email()
        .expect("Expected at least one email to be sent, but none were sent")
}

/// Assert that at least one email was sent.
pub fn assert_email_sent(mailer: &LocalMailer) {
    assert!(
        mailer.has_emails(),
        "Expected at least one email to be sent, but none were sent"
    );
}

/// Assert that no emails were sent.
pub fn assert_no_emails_sent(mailer: &LocalMailer) {
    let emails = mailer.emails();
    assert!(
        emails.is_empty(),
        "Expected no emails to be sent, but {} were sent.\n\nEmails sent:\n{}",
        emails.len(),
        format_email_summary(&emails)
    );
}

/// Assert that exactly N emails were sent.
pub fn assert_email_count(mailer: &LocalMailer, expected: usize) {
    let actual = mailer.email_count();
    assert!(
        actual == expected,
        "Expected {} email(s) to be sent, but {} were sent.\n\nEmails sent:\n{}",
        expected,
        actual,
        format_email_summary(&mailer.emails())
    );
}

/// Assert that an email was sent to a specific address.
pub fn assert_email_to(mailer: &LocalMailer, email: &str) {
    assert!(
        mailer.sent_to(email),
        "Expected an email to be sent to '{}'.\n\nEmails sent:\n{}",
        email,
        format_email_summary(&mailer.emails())
    );
}

/// Assert the last email was sent from a specific address.
pub fn assert_email_from(mailer: &LocalMailer, from_email: &str) {
    let last = last_email(mailer);
    let actual_from = last
        .email
        .from
        .as_ref()
        .map(|a| a.email.as_str())
        .unwrap_or("<none>");

    assert!(
        actual_from.eq_ignore_ascii_case(from_email),
        "Expected last email from '{}', but was from '{}'.\n\nEmails sent:\n{}",
        from_email,
        actual_from,
        format_email_summary(&mailer.emails())
    );
}

/// Assert the last email has HTML body containing text.
pub fn assert_email_html_contains(mailer: &LocalMailer, text: &str) {
    let last = last_email(mailer);
    let html = last.email.html_body.as_deref().unwrap_or("");

    assert!(
        html.contains(text),
        "Expected HTML body to contain '{}', but it didn't.\n\nLast email:\n{}\n\nHTML body (first 500 chars):\n{}",
        text,
        format_email_summary(std::slice::from_ref(&last)),
        html.chars().take(500).collect::<String>()
    );
}

/// Assert that no sent email still carries an unfilled `%s` placeholder.
pub fn assert_no_placeholders(mailer: &LocalMailer) {
    for stored in mailer.emails() {
        let html = stored.email.html_body.as_deref().unwrap_or("");
        assert!(
            !html.contains("%s"),
            "Email to {:?} still contains a '%s' placeholder:\n{}",
            stored.email.to.iter().map(|a| &a.email).collect::<Vec<_>>(),
            html.chars().take(500).collect::<String>()
        );
    }
}
