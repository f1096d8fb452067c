//! # Courier
//!
//! Email notification dispatcher. Tasks arrive over HTTP, a work queue, a
//! partitioned log or a pub/sub subject; each is validated, rendered from an
//! HTML template and handed to a transactional email vendor.
//!
//! ## Task types
//!
//! | Type | Body | Template |
//! |------|------|----------|
//! | `email:welcome` | `from`, `to`, `subject`, `params.name`, `params.url` | `welcome.html` |
//! | `email:verification` | `to`, `subject`, `params.name`, `params.url` | `verification.html` |
//! | `email:reset` | `to`, `subject`, `params.url` | `reset.html` |
//!
//! Verification and reset emails fall back to the configured sender when
//! `from` is empty. Welcome emails must name their sender.
//!
//! ## Processing a task
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier::{providers::LocalMailer, template::TemplateCache, TaskProcessor};
//!
//! let templates = TemplateCache::init("templates/")?;
//! let processor = TaskProcessor::new(Arc::new(LocalMailer::new()), templates, "info@test.com");
//!
//! processor
//!     .process("email:reset", br#"{"to":"ada@example.com","subject":"Reset","params":{"url":"https://example.com/r"}}"#)
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `postmark` - Postmark API provider
//! - `sendgrid` - SendGrid API provider
//! - `mailgun` - Mailgun API provider
//! - `local` - LocalMailer and test assertions
//! - `redis` - Redis work queue backend
//! - `kafka` - Kafka log backend (links librdkafka)
//! - `nats` - NATS pub/sub backend
//! - `metrics` - Counters through the `metrics` facade
//! - `prometheus` - Prometheus scrape endpoint
//!
//! ## Metrics
//!
//! | Metric | Description |
//! |--------|-------------|
//! | `<backend>.emails` | Emails sent by this backend |
//! | `<backend>.emails.<variant>` | Emails sent per task variant |
//!
//! `<backend>` is `asynq`, `kafka`, `NATS` or `http`.

/// The version of the courier crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod email;
mod error;
mod mailer;

pub mod backend;
pub mod config;
pub mod processor;
pub mod providers;
pub mod task;
pub mod telemetry;
pub mod template;

#[cfg(feature = "local")]
mod storage;

#[cfg(feature = "local")]
pub mod testing;

pub use address::{Address, ToAddress};
pub use email::Email;
pub use error::MailError;
pub use mailer::{DeliveryResult, Mailer};
pub use processor::{ProcessingError, TaskProcessor};
pub use task::{EmailTask, TaskType, ValidationError};

#[cfg(feature = "local")]
pub use storage::{MemoryStorage, StoredEmail};
