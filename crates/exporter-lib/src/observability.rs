//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Prometheus metrics about the exporter itself (scrape latency, errors, cluster size)
//! - Structured JSON logging with tracing

use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::{info, warn};

/// Histogram buckets for scrape latency (in seconds)
const SCRAPE_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

struct ExporterMetricsInner {
    registry: Registry,
    scrape_duration_seconds: Histogram,
    scrape_errors: IntCounterVec,
    services: IntGauge,
    tasks: IntGauge,
    orphaned_tasks: IntGauge,
    build_info: GaugeVec,
}

/// Exporter self-metrics
///
/// Owns a private registry; clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    inner: Arc<ExporterMetricsInner>,
}

impl ExporterMetrics {
    /// Create and register the exporter's own metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let scrape_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "swarm_exporter_scrape_duration_seconds",
                "Time spent fetching, aggregating and emitting swarm state",
            )
            .buckets(SCRAPE_LATENCY_BUCKETS.to_vec()),
        )?;
        let scrape_errors = IntCounterVec::new(
            Opts::new(
                "swarm_exporter_scrape_errors_total",
                "Total number of failed scrapes",
            ),
            &["stage"],
        )?;
        let services = IntGauge::new(
            "swarm_exporter_services",
            "Number of services seen in the last successful scrape",
        )?;
        let tasks = IntGauge::new(
            "swarm_exporter_tasks",
            "Number of tasks seen in the last successful scrape",
        )?;
        let orphaned_tasks = IntGauge::new(
            "swarm_exporter_orphaned_tasks",
            "Tasks in the last successful scrape whose service was not listed",
        )?;
        let build_info = GaugeVec::new(
            Opts::new("swarm_exporter_build_info", "Exporter build information"),
            &["version"],
        )?;

        registry.register(Box::new(scrape_duration_seconds.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;
        registry.register(Box::new(services.clone()))?;
        registry.register(Box::new(tasks.clone()))?;
        registry.register(Box::new(orphaned_tasks.clone()))?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            inner: Arc::new(ExporterMetricsInner {
                registry,
                scrape_duration_seconds,
                scrape_errors,
                services,
                tasks,
                orphaned_tasks,
                build_info,
            }),
        })
    }

    /// Record a scrape latency observation
    pub fn observe_scrape_duration(&self, duration_secs: f64) {
        self.inner.scrape_duration_seconds.observe(duration_secs);
    }

    /// Increment the error counter for the stage that failed
    pub fn inc_scrape_errors(&self, stage: &str) {
        self.inner.scrape_errors.with_label_values(&[stage]).inc();
    }

    /// Update cluster size gauges from a successful scrape
    pub fn set_cluster_size(&self, services: usize, tasks: usize, orphaned_tasks: usize) {
        self.inner.services.set(services as i64);
        self.inner.tasks.set(tasks as i64);
        self.inner.orphaned_tasks.set(orphaned_tasks as i64);
    }

    /// Publish the running version
    pub fn set_build_info(&self, version: &str) {
        self.inner.build_info.reset();
        self.inner
            .build_info
            .with_label_values(&[version])
            .set(1.0);
    }

    /// Gather the exporter's own metric families
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner.registry.gather()
    }
}

/// Structured logger for exporter events
///
/// Provides consistent JSON-formatted logging for scrapes and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, docker_endpoint: &str) {
        info!(
            event = "exporter_started",
            instance = %self.instance,
            exporter_version = %version,
            docker_endpoint = %docker_endpoint,
            "Swarm exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Swarm exporter shutting down"
        );
    }

    /// Log a completed scrape
    pub fn log_scrape_completed(
        &self,
        services: usize,
        tasks: usize,
        orphaned_tasks: usize,
        samples: usize,
        duration_ms: u128,
    ) {
        info!(
            event = "scrape_completed",
            instance = %self.instance,
            services = services,
            tasks = tasks,
            orphaned_tasks = orphaned_tasks,
            samples = samples,
            duration_ms = duration_ms as u64,
            "Scrape completed"
        );
    }

    /// Log a failed scrape
    pub fn log_scrape_failed(&self, stage: &str, error: &str, duration_ms: u128) {
        warn!(
            event = "scrape_failed",
            instance = %self.instance,
            stage = %stage,
            error = %error,
            duration_ms = duration_ms as u64,
            "Scrape failed, no swarm metrics returned"
        );
    }
}
