//! Email task model.
//!
//! A task arrives as a discriminator string plus a JSON body. It is decoded
//! into an [`EmailTask`], validated once, and then rendered by the
//! processor. Every field is optional on the wire; a missing field decodes
//! as empty and is rejected by validation.

mod reset;
mod verification;
mod welcome;

pub use reset::{ResetEmailBody, ResetEmailParams};
pub use verification::{VerificationEmailBody, VerificationEmailParams};
pub use welcome::{WelcomeEmailBody, WelcomeEmailParams};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::template::TemplateKind;

/// Maximum length of the `params.name` field, in characters.
pub const MAX_NAME_LEN: usize = 200;

/// Discriminator of an email task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Welcome,
    Verification,
    Reset,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [TaskType::Welcome, TaskType::Verification, TaskType::Reset];

    /// Wire form, e.g. `email:welcome`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Welcome => "email:welcome",
            TaskType::Verification => "email:verification",
            TaskType::Reset => "email:reset",
        }
    }

    /// Short variant name used in counters and provider tags.
    pub fn name(&self) -> &'static str {
        match self {
            TaskType::Welcome => "welcome",
            TaskType::Verification => "verification",
            TaskType::Reset => "reset",
        }
    }

    pub fn template(&self) -> TemplateKind {
        match self {
            TaskType::Welcome => TemplateKind::Welcome,
            TaskType::Verification => TemplateKind::Verification,
            TaskType::Reset => TemplateKind::Reset,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminator that names no known task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task type: {0:?}")]
pub struct UnknownTaskType(pub String);

impl FromStr for TaskType {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTaskType(s.to_string()))
    }
}

/// A task field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid from parameter")]
    InvalidSender,
    #[error("invalid to parameter")]
    InvalidRecipient,
    #[error("invalid subject parameter")]
    InvalidSubject,
    #[error("invalid name parameter")]
    InvalidName,
    #[error("invalid URL parameter")]
    InvalidUrl,
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidSender => "from",
            ValidationError::InvalidRecipient => "to",
            ValidationError::InvalidSubject => "subject",
            ValidationError::InvalidName => "params.name",
            ValidationError::InvalidUrl => "params.url",
        }
    }
}

/// A decoded email task.
#[derive(Debug, Clone, PartialEq)]
pub enum EmailTask {
    Welcome(WelcomeEmailBody),
    Verification(VerificationEmailBody),
    Reset(ResetEmailBody),
}

impl EmailTask {
    /// Decode a JSON payload as the body for `task_type`.
    pub fn decode(task_type: TaskType, payload: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match task_type {
            TaskType::Welcome => EmailTask::Welcome(serde_json::from_slice(payload)?),
            TaskType::Verification => EmailTask::Verification(serde_json::from_slice(payload)?),
            TaskType::Reset => EmailTask::Reset(serde_json::from_slice(payload)?),
        })
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            EmailTask::Welcome(_) => TaskType::Welcome,
            EmailTask::Verification(_) => TaskType::Verification,
            EmailTask::Reset(_) => TaskType::Reset,
        }
    }

    /// Check every field, filling an empty sender with `default_sender`
    /// where the variant allows it.
    pub fn validate(&mut self, default_sender: &str) -> Result<(), ValidationError> {
        match self {
            EmailTask::Welcome(body) => body.validate(),
            EmailTask::Verification(body) => body.validate(default_sender),
            EmailTask::Reset(body) => body.validate(default_sender),
        }
    }

    /// Values for the template placeholders, in template order.
    pub fn render_args(&self) -> Vec<&str> {
        match self {
            EmailTask::Welcome(body) => body.render_args(),
            EmailTask::Verification(body) => body.render_args(),
            EmailTask::Reset(body) => body.render_args(),
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            EmailTask::Welcome(body) => &body.from,
            EmailTask::Verification(body) => &body.from,
            EmailTask::Reset(body) => &body.from,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            EmailTask::Welcome(body) => &body.to,
            EmailTask::Verification(body) => &body.to,
            EmailTask::Reset(body) => &body.to,
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            EmailTask::Welcome(body) => &body.subject,
            EmailTask::Verification(body) => &body.subject,
            EmailTask::Reset(body) => &body.subject,
        }
    }
}

/// Checks shared by every variant once the sender is settled.
fn validate_envelope(from: &str, to: &str, subject: &str) -> Result<(), ValidationError> {
    if from.is_empty() {
        return Err(ValidationError::InvalidSender);
    }
    if to.is_empty() {
        return Err(ValidationError::InvalidRecipient);
    }
    if subject.is_empty() {
        return Err(ValidationError::InvalidSubject);
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::InvalidName);
    }
    Ok(())
}

fn validate_url(raw: &str) -> Result<(), ValidationError> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_round_trips_wire_form() {
        for task_type in TaskType::ALL {
            assert_eq!(task_type.as_str().parse::<TaskType>(), Ok(task_type));
        }
        assert_eq!(
            "email:reminder".parse::<TaskType>(),
            Err(UnknownTaskType("email:reminder".into()))
        );
    }

    #[test]
    fn test_decode_missing_fields_as_empty() {
        let task = EmailTask::decode(TaskType::Reset, br#"{"to":"a@example.com"}"#).unwrap();
        assert_eq!(task.recipient(), "a@example.com");
        assert_eq!(task.sender(), "");
        assert_eq!(task.subject(), "");
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(EmailTask::decode(TaskType::Welcome, b"{not json").is_err());
    }

    #[test]
    fn test_name_length_is_counted_in_characters() {
        assert!(validate_name(&"é".repeat(MAX_NAME_LEN)).is_ok());
        assert_eq!(
            validate_name(&"a".repeat(MAX_NAME_LEN + 1)),
            Err(ValidationError::InvalidName)
        );
        assert_eq!(validate_name(""), Err(ValidationError::InvalidName));
    }

    #[test]
    fn test_url_must_be_absolute() {
        assert!(validate_url("https://example.com/verify?token=abc").is_ok());
        assert_eq!(validate_url("not a url"), Err(ValidationError::InvalidUrl));
        assert_eq!(validate_url("/relative/path"), Err(ValidationError::InvalidUrl));
        assert_eq!(validate_url(""), Err(ValidationError::InvalidUrl));
    }
}
