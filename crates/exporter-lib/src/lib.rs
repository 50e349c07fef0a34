//! Library for the Docker Swarm Prometheus exporter
//!
//! This crate provides the core functionality for:
//! - Fetching services and tasks from the Docker Engine API
//! - Aggregating tasks per service into snapshots
//! - Emitting snapshots as labeled Prometheus gauges
//! - The HTTP API serving scrapes, health and readiness
//! - Health checks and observability

pub mod aggregation;
pub mod api;
pub mod emission;
pub mod fetcher;
pub mod health;
pub mod models;
pub mod observability;
pub mod scrape;

pub use aggregation::{aggregate, aggregate_with_stats, Aggregation};
pub use emission::{
    emit_snapshots, EmitError, GaugeSink, MetricDesc, MetricSchema, SampleSink, SWARM_SCHEMA,
};
pub use fetcher::{
    ClusterStateFetcher, DockerClient, DockerClientConfig, DockerEndpoint, FetchError,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use scrape::{render, ScrapeError, Scraper};
