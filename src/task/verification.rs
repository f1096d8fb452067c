use serde::{Deserialize, Serialize};

use super::{validate_envelope, validate_name, validate_url, ValidationError};

/// Body of an `email:verification` task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationEmailBody {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub params: VerificationEmailParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationEmailParams {
    pub name: String,
    pub url: String,
}

impl VerificationEmailBody {
    pub fn validate(&mut self, default_sender: &str) -> Result<(), ValidationError> {
        if self.from.is_empty() {
            self.from = default_sender.to_string();
        }
        validate_envelope(&self.from, &self.to, &self.subject)?;
        validate_name(&self.params.name)?;
        validate_url(&self.params.url)
    }

    /// `(name, url, url)`: the link is shown both as a button and as text.
    pub fn render_args(&self) -> Vec<&str> {
        vec![
            self.params.name.as_str(),
            self.params.url.as_str(),
            self.params.url.as_str(),
        ]
    }
}
