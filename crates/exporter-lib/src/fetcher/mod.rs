//! Cluster state fetching
//!
//! This module defines the interface the scrape pipeline uses to read
//! services and tasks, and the Docker Engine API client implementing it
//! over either the local unix socket or TCP.

mod api_types;
mod docker;


pub use docker::{DockerClient, DockerClientConfig, DockerEndpoint, DEFAULT_DOCKER_HOST};

use crate::models::{Service, Task};
use thiserror::Error;

pub use async_trait::async_trait;

/// Errors returned by a cluster state fetcher
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid docker endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("docker API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Source of the cluster's current services and tasks
///
/// Both calls are independent point-in-time reads. Implementations must be
/// safe to call from concurrent scrapes; retries, if any, belong here.
#[async_trait]
pub trait ClusterStateFetcher: Send + Sync {
    /// List every service known to the cluster
    async fn list_services(&self) -> Result<Vec<Service>, FetchError>;

    /// List every task known to the cluster
    async fn list_tasks(&self) -> Result<Vec<Task>, FetchError>;
}
