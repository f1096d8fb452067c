//! Email provider implementations.
//!
//! Each provider implements the [`Mailer`](crate::Mailer) trait.
//!
//! | Provider | Feature Flag | Description |
//! |----------|-------------|-------------|
//! | [`PostmarkMailer`] | `postmark` | Postmark API |
//! | [`SendGridMailer`] | `sendgrid` | SendGrid API |
//! | [`MailgunMailer`] | `mailgun` | Mailgun API |
//! | [`LocalMailer`] | `local` | In-memory storage for dev/testing |
//! | [`LoggerMailer`] | (none) | Logs emails without storing |

use std::sync::Arc;

use crate::config::{Provider, ProviderSettings};
use crate::error::MailError;
use crate::mailer::Mailer;

#[cfg(feature = "postmark")]
mod postmark;
#[cfg(feature = "postmark")]
pub use postmark::PostmarkMailer;

#[cfg(feature = "sendgrid")]
mod sendgrid;
#[cfg(feature = "sendgrid")]
pub use sendgrid::SendGridMailer;

#[cfg(feature = "mailgun")]
mod mailgun;
#[cfg(feature = "mailgun")]
pub use mailgun::{MailgunMailer, MAILGUN_EU_BASE_URL};

#[cfg(feature = "local")]
mod local;
#[cfg(feature = "local")]
pub use local::LocalMailer;

mod logger;
pub use logger::LoggerMailer;

/// Build the mailer selected at startup.
///
/// Fails when the provider's feature is not compiled in or its credentials
/// are missing.
pub fn from_settings(
    provider: Provider,
    settings: &ProviderSettings,
) -> Result<Arc<dyn Mailer>, MailError> {
    let mailer: Arc<dyn Mailer> = match provider {
        #[cfg(feature = "postmark")]
        Provider::Postmark => {
            let mailer = PostmarkMailer::new(&settings.postmark_server);
            match &settings.postmark_message_stream {
                Some(stream) => Arc::new(mailer.message_stream(stream)),
                None => Arc::new(mailer),
            }
        }

        #[cfg(feature = "sendgrid")]
        Provider::Sendgrid => Arc::new(SendGridMailer::new(&settings.sendgrid_api_key)),

        #[cfg(feature = "mailgun")]
        Provider::Mailgun => {
            let mailer = MailgunMailer::new(&settings.mailgun_api_key, &settings.mailgun_domain);
            if settings.mailgun_eu {
                Arc::new(mailer.base_url(MAILGUN_EU_BASE_URL))
            } else {
                Arc::new(mailer)
            }
        }

        #[cfg(feature = "local")]
        Provider::Local => Arc::new(LocalMailer::new()),

        Provider::Logger => Arc::new(LoggerMailer::full()),

        #[allow(unreachable_patterns)]
        other => {
            let feature = format!("{:?}", other).to_lowercase();
            return Err(MailError::Configuration(format!(
                "provider `{}` is not compiled in; enable the `{}` feature",
                feature, feature
            )));
        }
    };

    mailer.validate_config()?;
    tracing::debug!(provider = mailer.provider_name(), "Email provider configured");
    Ok(mailer)
}
