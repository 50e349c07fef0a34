//! One scrape: fetch, aggregate, emit
//!
//! Every call starts from the orchestrator's current state and keeps
//! nothing afterwards. A fetch failure fails the scrape with no samples;
//! the next call starts over.

use crate::aggregation::aggregate_with_stats;
use crate::emission::{emit_snapshots, EmitError, GaugeSink, MetricSchema};
use crate::fetcher::{ClusterStateFetcher, FetchError};
use crate::observability::{ExporterMetrics, StructuredLogger};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors that fail a scrape
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to fetch cluster state: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to emit metrics: {0}")]
    Emit(#[from] EmitError),
}

impl ScrapeError {
    /// Pipeline stage that failed, used as a metric label
    pub fn stage(&self) -> &'static str {
        match self {
            ScrapeError::Fetch(_) => "fetch",
            ScrapeError::Emit(_) => "emit",
        }
    }
}

#[derive(Debug)]
struct ScrapeOutcome {
    families: Vec<MetricFamily>,
    services: usize,
    tasks: usize,
    orphaned_tasks: usize,
    samples: usize,
}

/// Runs the fetch → aggregate → emit pipeline on demand
#[derive(Clone)]
pub struct Scraper {
    fetcher: Arc<dyn ClusterStateFetcher>,
    schema: &'static MetricSchema,
    metrics: ExporterMetrics,
    logger: StructuredLogger,
}

impl Scraper {
    pub fn new(
        fetcher: Arc<dyn ClusterStateFetcher>,
        schema: &'static MetricSchema,
        metrics: ExporterMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            fetcher,
            schema,
            metrics,
            logger,
        }
    }

    /// Perform one full scrape and return the swarm metric families
    ///
    /// All or nothing: if emission fails partway, the samples already written
    /// to the per-scrape sink are discarded along with it and the caller gets
    /// only the error.
    pub async fn scrape(&self) -> Result<Vec<MetricFamily>, ScrapeError> {
        let started = Instant::now();
        let result = self.run().await;
        let elapsed = started.elapsed();

        self.metrics.observe_scrape_duration(elapsed.as_secs_f64());

        match result {
            Ok(outcome) => {
                self.metrics
                    .set_cluster_size(outcome.services, outcome.tasks, outcome.orphaned_tasks);
                self.logger.log_scrape_completed(
                    outcome.services,
                    outcome.tasks,
                    outcome.orphaned_tasks,
                    outcome.samples,
                    elapsed.as_millis(),
                );
                Ok(outcome.families)
            }
            Err(e) => {
                self.metrics.inc_scrape_errors(e.stage());
                self.logger
                    .log_scrape_failed(e.stage(), &e.to_string(), elapsed.as_millis());
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<ScrapeOutcome, ScrapeError> {
        let (services, tasks) =
            tokio::try_join!(self.fetcher.list_services(), self.fetcher.list_tasks())?;

        let aggregation = aggregate_with_stats(&services, &tasks);

        let mut sink = GaugeSink::new(self.schema)?;
        let samples = emit_snapshots(self.schema, &aggregation.snapshots, &mut sink)?;

        Ok(ScrapeOutcome {
            families: sink.finish(),
            services: services.len(),
            tasks: tasks.len(),
            orphaned_tasks: aggregation.orphaned_tasks,
            samples,
        })
    }
}

/// Encode metric families in the Prometheus text exposition format
pub fn render(families: &[MetricFamily]) -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(families, &mut buffer)?;
    Ok(buffer)
}
