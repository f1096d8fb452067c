//! Task processor: decode, validate, render, send.
//!
//! Every backend funnels its units of work through [`TaskProcessor::process`].
//! The processor only holds read-only shared state, so a single instance is
//! shared as `Arc<TaskProcessor>` across HTTP handlers and consumer loops.

use std::sync::Arc;

use thiserror::Error;

use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};
use crate::task::{EmailTask, TaskType, UnknownTaskType, ValidationError};
use crate::telemetry::EmailCounters;
use crate::template::{TemplateCache, TemplateError};

/// Why a task could not be delivered.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    UnknownType(#[from] UnknownTaskType),

    #[error("could not decode task payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Delivery(#[from] MailError),
}

/// Failure class of a [`ProcessingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownType,
    Decode,
    Validation,
    Template,
    Delivery,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownType => "UnmatchedCase",
            ErrorKind::Decode => "DecodeError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Template => "TemplateError",
            ErrorKind::Delivery => "DeliveryError",
        }
    }
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::UnknownType(_) => ErrorKind::UnknownType,
            ProcessingError::Decode(_) => ErrorKind::Decode,
            ProcessingError::Validation(_) => ErrorKind::Validation,
            ProcessingError::Template(_) => ErrorKind::Template,
            ProcessingError::Delivery(_) => ErrorKind::Delivery,
        }
    }

    /// Whether trying the same payload again could succeed.
    ///
    /// Malformed or invalid tasks never will; a missing template or a
    /// failing vendor might.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessingError::Template(_) | ProcessingError::Delivery(_)
        )
    }

    /// True when the caller sent something we cannot act on.
    pub fn is_client_error(&self) -> bool {
        !self.is_retryable()
    }
}

/// Turns raw task payloads into delivered emails.
pub struct TaskProcessor {
    mailer: Arc<dyn Mailer>,
    templates: Arc<TemplateCache>,
    default_sender: String,
    counters: Arc<EmailCounters>,
}

impl TaskProcessor {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        templates: Arc<TemplateCache>,
        default_sender: impl Into<String>,
    ) -> Self {
        Self {
            mailer,
            templates,
            default_sender: default_sender.into(),
            counters: Arc::new(EmailCounters::new("courier")),
        }
    }

    /// Use the given counters instead of the default `courier.*` set.
    pub fn with_counters(mut self, counters: Arc<EmailCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> &EmailCounters {
        &self.counters
    }

    pub fn default_sender(&self) -> &str {
        &self.default_sender
    }

    pub fn provider_name(&self) -> &'static str {
        self.mailer.provider_name()
    }

    /// Process one task end to end.
    ///
    /// On failure a single error event is emitted with the task type and
    /// the error; the error is also returned so the backend can pick its
    /// ack, retry or commit policy.
    pub async fn process(
        &self,
        task_type: &str,
        payload: &[u8],
    ) -> Result<DeliveryResult, ProcessingError> {
        let result = self.try_process(task_type, payload).await;

        if let Err(ref e) = result {
            tracing::error!(
                task_type = %task_type,
                kind = e.kind().as_str(),
                error = %e,
                "Email task failed"
            );
        }

        result
    }

    async fn try_process(
        &self,
        task_type: &str,
        payload: &[u8],
    ) -> Result<DeliveryResult, ProcessingError> {
        let task_type: TaskType = task_type.parse()?;
        let mut task = EmailTask::decode(task_type, payload)?;
        task.validate(&self.default_sender)?;

        let email = self.render(&task)?;
        let result = self.mailer.send(&email).await?;

        self.counters.record(task_type);
        tracing::info!(
            task_type = %task_type,
            to = %task.recipient(),
            message_id = %result.message_id,
            "Email sent"
        );

        Ok(result)
    }

    /// Build the outgoing email for a validated task.
    pub fn render(&self, task: &EmailTask) -> Result<Email, TemplateError> {
        let task_type = task.task_type();
        let fragment = self
            .templates
            .render(task_type.template(), &task.render_args())?;
        let html = self.templates.wrap_in_layout(&fragment)?;

        Ok(Email::new()
            .from(task.sender())
            .to(task.recipient())
            .subject(task.subject())
            .html_body(html)
            .tag(task_type.name())
            .metadata("task_type", task_type.as_str()))
    }
}

impl std::fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("provider", &self.mailer.provider_name())
            .field("templates", &self.templates.dir())
            .field("default_sender", &self.default_sender)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        let delivery = ProcessingError::Delivery(MailError::SendError("down".into()));
        assert!(delivery.is_retryable());
        assert_eq!(delivery.kind(), ErrorKind::Delivery);

        let validation = ProcessingError::Validation(ValidationError::InvalidRecipient);
        assert!(!validation.is_retryable());
        assert!(validation.is_client_error());

        let unknown = ProcessingError::UnknownType(UnknownTaskType("email:other".into()));
        assert_eq!(unknown.kind().as_str(), "UnmatchedCase");
        assert!(!unknown.is_retryable());
    }

    #[test]
    fn test_validation_error_message() {
        let err = ProcessingError::from(ValidationError::InvalidUrl);
        assert_eq!(err.to_string(), "invalid URL parameter");
    }
}
