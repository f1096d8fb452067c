use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use courier::backend::{self, http};
use courier::config::Settings;
use courier::telemetry::{self, EmailCounters};
use courier::template::TemplateCache;
use courier::{providers, TaskProcessor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let settings = Settings::parse();
    telemetry::init_tracing(settings.debug, settings.log_json)
        .context("failed to install tracing subscriber")?;
    settings.validate()?;

    tracing::info!(
        env = %settings.env,
        backend = settings.backend.as_str(),
        provider = ?settings.provider,
        rest = settings.rest,
        "Starting courier {}",
        courier::VERSION
    );

    if settings.prometheus_enable {
        #[cfg(feature = "prometheus")]
        telemetry::install_prometheus(settings.prometheus_port)
            .context("failed to start Prometheus exporter")?;

        #[cfg(not(feature = "prometheus"))]
        tracing::warn!("Prometheus requested but the `prometheus` feature is not compiled in");
    }

    let templates = TemplateCache::init(&settings.template_dir).with_context(|| {
        format!(
            "failed to load templates from {}",
            settings.template_dir.display()
        )
    })?;
    let mailer = providers::from_settings(settings.provider, &settings.providers)?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let token = shutdown.clone();
        async move {
            backend::shutdown_signal().await;
            token.cancel();
        }
    });

    let processor = |prefix: &str| {
        Arc::new(
            TaskProcessor::new(mailer.clone(), templates.clone(), settings.sender.as_str())
                .with_counters(Arc::new(EmailCounters::new(prefix))),
        )
    };

    let rest = async {
        if !settings.rest {
            return Ok(());
        }
        let listener = TcpListener::bind((settings.host.as_str(), settings.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", settings.host, settings.port))?;
        let router = http::create_router(processor("http"), &settings.service_name);
        http::serve(listener, router, shutdown.clone(), settings.shutdown_grace())
            .await
            .context("HTTP server failed")
    };

    let primary = async {
        backend::run(
            &settings,
            processor(settings.backend.counter_prefix()),
            shutdown.clone(),
        )
        .await
        .with_context(|| format!("{} backend failed", settings.backend.as_str()))
    };

    // One side failing takes the other down with it.
    let stop_on_error = |result: anyhow::Result<()>| {
        if result.is_err() {
            shutdown.cancel();
        }
        result
    };
    let (rest, primary) = tokio::join!(
        async { stop_on_error(rest.await) },
        async { stop_on_error(primary.await) }
    );

    rest?;
    primary?;
    tracing::info!("Shutdown complete");
    Ok(())
}
