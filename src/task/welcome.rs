use serde::{Deserialize, Serialize};

use super::{validate_envelope, validate_name, validate_url, ValidationError};

/// Body of an `email:welcome` task.
///
/// Unlike the other variants, a welcome email must name its sender.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WelcomeEmailBody {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub params: WelcomeEmailParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WelcomeEmailParams {
    pub name: String,
    pub url: String,
}

impl WelcomeEmailBody {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_envelope(&self.from, &self.to, &self.subject)?;
        validate_name(&self.params.name)?;
        validate_url(&self.params.url)
    }

    /// `(name, url)`
    pub fn render_args(&self) -> Vec<&str> {
        vec![self.params.name.as_str(), self.params.url.as_str()]
    }
}
