//! Swarm exporter - Prometheus metrics for Docker Swarm services
//!
//! This binary runs next to a swarm manager and serves the state of every
//! service and its tasks on each scrape of `/metrics`.

use anyhow::{Context, Result};
use exporter_lib::{
    api::{self, AppState},
    health::{components, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
    DockerClient, Scraper, SWARM_SCHEMA,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting swarm-exporter");

    let config = config::ExporterConfig::load()?;
    let listen_addr = config.listen_addr()?;
    info!(
        docker_host = %config.docker_host,
        listen_addr = %listen_addr,
        "Exporter configured"
    );

    let health_registry = HealthRegistry::with_failure_threshold(config.unready_after_failures);
    health_registry.register(components::DOCKER).await;
    health_registry.register(components::SCRAPER).await;

    let metrics = ExporterMetrics::new().context("Failed to register exporter metrics")?;
    metrics.set_build_info(EXPORTER_VERSION);

    let logger = StructuredLogger::new(listen_addr.to_string());

    let docker = DockerClient::new(config.docker_client_config())
        .context("Failed to create docker client")?;
    logger.log_startup(EXPORTER_VERSION, &docker.endpoint().to_string());

    let scraper = Scraper::new(
        Arc::new(docker),
        &SWARM_SCHEMA,
        metrics.clone(),
        logger.clone(),
    );
    let app_state = Arc::new(AppState::new(scraper, health_registry.clone(), metrics));

    health_registry.set_ready(true).await;

    let shutdown_logger = logger.clone();
    api::serve_with_shutdown(listen_addr, app_state, async move {
        let reason = shutdown_signal().await;
        shutdown_logger.log_shutdown(reason);
    })
    .await?;

    info!("Shutting down");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, returning which one arrived
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}
