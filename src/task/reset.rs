use serde::{Deserialize, Serialize};

use super::{validate_envelope, validate_url, ValidationError};

/// Body of an `email:reset` task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetEmailBody {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub params: ResetEmailParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetEmailParams {
    pub url: String,
}

impl ResetEmailBody {
    pub fn validate(&mut self, default_sender: &str) -> Result<(), ValidationError> {
        if self.from.is_empty() {
            self.from = default_sender.to_string();
        }
        validate_envelope(&self.from, &self.to, &self.subject)?;
        validate_url(&self.params.url)
    }

    /// `(url, url)`
    pub fn render_args(&self) -> Vec<&str> {
        vec![self.params.url.as_str(), self.params.url.as_str()]
    }
}
