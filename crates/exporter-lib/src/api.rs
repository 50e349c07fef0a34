//! HTTP API for scrapes, health checks and readiness

use crate::health::{components, HealthRegistry};
use crate::observability::ExporterMetrics;
use crate::scrape::{render, ScrapeError, Scraper};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Content type of the Prometheus text exposition format
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scraper: Scraper,
    pub health_registry: HealthRegistry,
    pub metrics: ExporterMetrics,
}

impl AppState {
    pub fn new(
        scraper: Scraper,
        health_registry: HealthRegistry,
        metrics: ExporterMetrics,
    ) -> Self {
        Self {
            scraper,
            health_registry,
            metrics,
        }
    }
}

/// Health check response - always 200 while the process serves; the body carries the status
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    (StatusCode::OK, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
/// or after repeated scrape failures
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint; every request runs one full scrape
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let mut families = match state.scraper.scrape().await {
        Ok(families) => families,
        Err(e) => {
            let component = match e {
                ScrapeError::Fetch(_) => components::DOCKER,
                ScrapeError::Emit(_) => components::SCRAPER,
            };
            state
                .health_registry
                .record_failure(component, e.to_string())
                .await;
            return scrape_error(&e.to_string());
        }
    };

    state.health_registry.set_healthy(components::DOCKER).await;
    families.extend(state.metrics.gather());

    match render(&families) {
        Ok(body) => {
            state.health_registry.set_healthy(components::SCRAPER).await;
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
                body,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            state.metrics.inc_scrape_errors("encode");
            state
                .health_registry
                .record_failure(components::SCRAPER, e.to_string())
                .await;
            scrape_error(&e.to_string())
        }
    }
}

fn scrape_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("scrape failed: {}\n", message),
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    serve_with_shutdown(addr, state, std::future::pending()).await
}

/// Start the API server, stopping gracefully once `shutdown` completes
pub async fn serve_with_shutdown<F>(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
