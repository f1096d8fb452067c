//! Service configuration.
//!
//! Every option is a command-line flag with an environment fallback
//! (`COURIER_*`, plus the vendor variables for API keys). `main` loads a
//! `.env` file first, so both styles work in development.

use clap::{ArgAction, Args, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Highest Redis logical database index accepted.
const MAX_REDIS_DB: i64 = 15;

/// Invalid combination of settings detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

/// Transactional email vendor the dispatcher sends through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Postmark,
    Sendgrid,
    Mailgun,
    /// In-memory mailbox, for development.
    Local,
    /// Log every email instead of sending it.
    Logger,
}

/// Primary transport the process consumes tasks from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Redis-backed work queue.
    #[value(alias = "asynq")]
    Queue,
    /// Partitioned log (Kafka).
    Kafka,
    /// Publish/subscribe subject (NATS).
    Nats,
    /// HTTP endpoint only.
    None,
}

impl Backend {
    /// Name used in logs and spans.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Queue => "queue",
            Backend::Kafka => "kafka",
            Backend::Nats => "nats",
            Backend::None => "http",
        }
    }

    /// Prefix for the delivery counters of this backend.
    pub fn counter_prefix(&self) -> &'static str {
        match self {
            Backend::Queue => "asynq",
            Backend::Kafka => "kafka",
            Backend::Nats => "NATS",
            Backend::None => "http",
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "courier", version, about = "Email notification dispatcher")]
pub struct Settings {
    /// Deployment environment name.
    #[arg(short, long, env = "COURIER_ENV", default_value = "development")]
    pub env: String,

    /// Serve the HTTP API next to the primary backend.
    #[arg(long, env = "COURIER_REST", default_value_t = true, action = ArgAction::Set)]
    pub rest: bool,

    /// Lower the default log level to debug.
    #[arg(short, long, env = "COURIER_DEBUG")]
    pub debug: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "COURIER_LOG_JSON")]
    pub log_json: bool,

    /// Service name reported by the status endpoint.
    #[arg(short = 'n', long = "name", env = "COURIER_NAME", default_value = "Mailer")]
    pub service_name: String,

    /// Directory holding the HTML templates.
    #[arg(long, env = "COURIER_TEMPLATE_DIR", default_value = "templates/")]
    pub template_dir: PathBuf,

    /// Sender used when a task leaves `from` empty.
    #[arg(long, env = "COURIER_SENDER", default_value = "info@test.com")]
    pub sender: String,

    /// Tasks processed in parallel by the queue worker.
    #[arg(long, env = "COURIER_CONCURRENCY", default_value_t = 10)]
    pub concurrency: usize,

    /// Work queue name.
    #[arg(long, env = "COURIER_QUEUE", default_value = "emails")]
    pub queue: String,

    /// Bind the HTTP server to this host.
    #[arg(short = 's', long, env = "COURIER_HOST", default_value = "localhost")]
    pub host: String,

    /// Bind the HTTP server to this port.
    #[arg(short, long, env = "COURIER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Seconds in-flight HTTP requests get to finish on shutdown.
    #[arg(long, env = "COURIER_SHUTDOWN_GRACE", default_value_t = 10)]
    pub shutdown_grace_secs: u64,

    #[arg(long, env = "COURIER_PROVIDER", value_enum, default_value_t = Provider::Postmark)]
    pub provider: Provider,

    #[arg(long, env = "COURIER_BACKEND", value_enum, default_value_t = Backend::Nats)]
    pub backend: Backend,

    #[command(flatten)]
    pub providers: ProviderSettings,

    #[command(flatten)]
    pub redis: RedisSettings,

    #[command(flatten)]
    pub kafka: KafkaSettings,

    #[command(flatten)]
    pub nats: NatsSettings,

    /// Expose counters on a Prometheus scrape endpoint.
    #[arg(long, env = "COURIER_PROMETHEUS_ENABLE")]
    pub prometheus_enable: bool,

    #[arg(long, env = "COURIER_PROMETHEUS_PORT", default_value_t = 9464)]
    pub prometheus_port: u16,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ProviderSettings {
    /// Postmark server token.
    #[arg(long, env = "POSTMARK_SERVER", default_value = "", hide_env_values = true)]
    pub postmark_server: String,

    /// Postmark message stream.
    #[arg(long, env = "POSTMARK_MESSAGE_STREAM")]
    pub postmark_message_stream: Option<String>,

    #[arg(long, env = "SENDGRID_API_KEY", default_value = "", hide_env_values = true)]
    pub sendgrid_api_key: String,

    #[arg(long, env = "MAILGUN_DOMAIN", default_value = "")]
    pub mailgun_domain: String,

    #[arg(long, env = "MAILGUN_API_KEY", default_value = "", hide_env_values = true)]
    pub mailgun_api_key: String,

    /// Send through Mailgun's EU region.
    #[arg(long, env = "MAILGUN_EU")]
    pub mailgun_eu: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RedisSettings {
    #[arg(long, env = "COURIER_REDIS_HOST", default_value = "localhost")]
    pub redis_host: String,

    #[arg(long, env = "COURIER_REDIS_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    #[arg(long, env = "COURIER_REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    #[arg(long, env = "COURIER_REDIS_DB", default_value_t = 0)]
    pub redis_db: i64,

    /// Attempts before a failing task is archived.
    #[arg(long, env = "COURIER_MAX_RETRY", default_value_t = 25)]
    pub max_retry: u32,
}

impl RedisSettings {
    /// Connection URL in the form accepted by `redis::Client::open`. The
    /// password is percent-encoded.
    pub fn url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&format!(
            "redis://{}:{}/{}",
            self.redis_host, self.redis_port, self.redis_db
        ))
        .map_err(|e| ConfigError(format!("invalid redis address: {e}")))?;

        if let Some(password) = self.redis_password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|()| ConfigError("redis password cannot be set on this address".into()))?;
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, Args)]
pub struct KafkaSettings {
    /// Comma separated broker addresses.
    #[arg(
        long,
        env = "COURIER_KAFKA_ADDRESSES",
        value_delimiter = ',',
        default_value = "localhost:6789"
    )]
    pub kafka_addresses: Vec<String>,

    #[arg(long, env = "COURIER_KAFKA_TOPIC", default_value = "emails")]
    pub kafka_topic: String,

    #[arg(long, env = "COURIER_KAFKA_GROUP", default_value = "my-group")]
    pub kafka_group: String,

    /// Milliseconds to wait before retrying a failed offset commit.
    #[arg(long, env = "COURIER_KAFKA_COMMIT_RETRY_MS", default_value_t = 2000)]
    pub kafka_commit_retry_ms: u64,
}

#[derive(Debug, Clone, Args)]
pub struct NatsSettings {
    #[arg(long, env = "COURIER_NATS_HOST", default_value = "localhost")]
    pub nats_host: String,

    #[arg(long, env = "COURIER_NATS_PORT", default_value_t = 4222)]
    pub nats_port: u16,

    #[arg(long, env = "COURIER_NATS_SUBJECT", default_value = "emails")]
    pub nats_subject: String,
}

impl NatsSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.nats_host, self.nats_port)
    }
}

impl Settings {
    /// Reject setting combinations that cannot start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rest && self.port == 0 {
            return Err(ConfigError(
                "a port is required when the REST API is enabled".into(),
            ));
        }
        if self.concurrency < 1 {
            return Err(ConfigError("concurrency must be at least 1".into()));
        }
        if self.sender.is_empty() {
            return Err(ConfigError("a default sender is required".into()));
        }

        match self.backend {
            Backend::Queue => {
                if self.redis.redis_host.is_empty() || self.redis.redis_port == 0 {
                    return Err(ConfigError("redis host and port are required".into()));
                }
                if !(0..=MAX_REDIS_DB).contains(&self.redis.redis_db) {
                    return Err(ConfigError(format!(
                        "redis db must be between 0 and {}",
                        MAX_REDIS_DB
                    )));
                }
                if self.queue.is_empty() {
                    return Err(ConfigError("a queue name is required".into()));
                }
                self.redis.url()?;
            }
            Backend::Kafka => {
                if self.kafka.kafka_addresses.iter().all(|a| a.is_empty()) {
                    return Err(ConfigError("at least one kafka broker is required".into()));
                }
                if self.kafka.kafka_topic.is_empty() || self.kafka.kafka_group.is_empty() {
                    return Err(ConfigError("kafka topic and group are required".into()));
                }
            }
            Backend::Nats => {
                if self.nats.nats_host.is_empty() || self.nats.nats_port == 0 {
                    return Err(ConfigError("nats host and port are required".into()));
                }
                if self.nats.nats_subject.is_empty() {
                    return Err(ConfigError("a nats subject is required".into()));
                }
            }
            Backend::None => {
                if !self.rest {
                    return Err(ConfigError(
                        "no backend selected and the REST API is disabled".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
