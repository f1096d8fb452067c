//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use courier::template::TemplateCache;
use courier::{Mailer, TaskProcessor};
use serde_json::json;

pub const DEFAULT_SENDER: &str = "noreply@example.com";

/// The templates shipped with the service.
pub fn shipped_templates() -> Arc<TemplateCache> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
    Arc::new(TemplateCache::load(dir).unwrap())
}

/// Small templates with the same placeholder counts as the shipped ones.
pub fn write_templates(dir: &Path) {
    std::fs::write(dir.join("layout.html"), "<html><body>%s</body></html>").unwrap();
    std::fs::write(dir.join("welcome.html"), "<p>Welcome %s, start at %s</p>").unwrap();
    std::fs::write(
        dir.join("verification.html"),
        "<p>Hi %s, verify at <a href=\"%s\">%s</a></p>",
    )
    .unwrap();
    std::fs::write(dir.join("reset.html"), "<p>Reset at <a href=\"%s\">%s</a></p>").unwrap();
}

pub fn processor(mailer: Arc<dyn Mailer>) -> Arc<TaskProcessor> {
    Arc::new(TaskProcessor::new(mailer, shipped_templates(), DEFAULT_SENDER))
}

pub fn welcome_payload(to: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "from": "team@example.com",
        "to": to,
        "subject": "Welcome",
        "params": { "name": "Ada", "url": "https://example.com/start" }
    }))
    .unwrap()
}

pub fn reset_payload(to: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "to": to,
        "subject": "Reset your password",
        "params": { "url": "https://example.com/reset?token=abc" }
    }))
    .unwrap()
}
