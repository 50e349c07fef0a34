//! Core data models for the swarm exporter

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Task state that is always reported, even with a zero count
pub const RUNNING_STATE: &str = "running";

/// Scheduling mode of a swarm service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMode {
    /// A fixed number of replicas spread over the cluster
    Replicated { desired_replicas: u64 },
    /// One task per eligible node
    Global,
    ReplicatedJob,
    GlobalJob,
    /// A mode this exporter does not understand
    Unknown,
}

impl ServiceMode {
    /// Desired replica count, only known for replicated services
    pub fn desired_replicas(&self) -> Option<u64> {
        match self {
            ServiceMode::Replicated { desired_replicas } => Some(*desired_replicas),
            _ => None,
        }
    }
}

/// A declared service as reported by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub mode: ServiceMode,
    pub image: String,
}

/// One scheduled instance of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub service_id: String,
    pub state: String,
    pub state_timestamp: Option<DateTime<Utc>>,
}

/// Per-scrape summary of a service and the tasks it currently owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub name: String,
    pub desired_replicas: Option<u64>,
    pub task_state_counts: BTreeMap<String, u64>,
    pub image: String,
    pub last_change_time: Option<DateTime<Utc>>,
}

impl ServiceSnapshot {
    /// Latest task state change as Unix seconds, 0 when the service owns no tasks
    pub fn last_change_unix_secs(&self) -> i64 {
        self.last_change_time.map(|t| t.timestamp()).unwrap_or(0)
    }

    /// Total number of tasks counted for this service
    pub fn total_tasks(&self) -> u64 {
        self.task_state_counts.values().sum()
    }
}
