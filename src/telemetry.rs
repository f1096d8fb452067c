//! Logging and counters.
//!
//! Counters always keep an in-process tally so tests and the status endpoint
//! can read them. With the `metrics` feature they are also forwarded to the
//! `metrics` facade; when no recorder is installed that forwarding is a no-op.

use parking_lot::Mutex;
use tracing_subscriber::util::TryInitError;

use crate::task::TaskType;

/// A monotonically increasing counter guarded by its own lock.
#[derive(Debug)]
pub struct Counter {
    name: String,
    count: Mutex<u64>,
}

impl Counter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: Mutex::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn increment(&self) {
        *self.count.lock() += 1;

        #[cfg(feature = "metrics")]
        metrics::counter!(self.name.clone()).increment(1);
    }

    pub fn value(&self) -> u64 {
        *self.count.lock()
    }
}

/// Sent-email counters: one generic, one per task variant.
///
/// Named `<prefix>.emails` and `<prefix>.emails.<variant>`, where the
/// prefix identifies the backend (`asynq`, `kafka`, `NATS`, `http`).
#[derive(Debug)]
pub struct EmailCounters {
    total: Counter,
    welcome: Counter,
    verification: Counter,
    reset: Counter,
}

impl EmailCounters {
    pub fn new(prefix: &str) -> Self {
        let variant = |t: TaskType| Counter::new(format!("{prefix}.emails.{}", t.name()));
        Self {
            total: Counter::new(format!("{prefix}.emails")),
            welcome: variant(TaskType::Welcome),
            verification: variant(TaskType::Verification),
            reset: variant(TaskType::Reset),
        }
    }

    /// Count one sent email of the given variant.
    pub fn record(&self, task_type: TaskType) {
        self.total.increment();
        self.for_type(task_type).increment();
    }

    pub fn total(&self) -> &Counter {
        &self.total
    }

    pub fn for_type(&self, task_type: TaskType) -> &Counter {
        match task_type {
            TaskType::Welcome => &self.welcome,
            TaskType::Verification => &self.verification,
            TaskType::Reset => &self.reset,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug` for
/// this crate when `debug` is on. `json` switches to flattened JSON lines.
pub fn init_tracing(debug: bool, json: bool) -> Result<(), TryInitError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer as _};

    let default_filter = if debug { "info,courier=debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}

/// Start the Prometheus scrape endpoint on `0.0.0.0:<port>`.
///
/// Must be called from within a tokio runtime.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(port: u16) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}
