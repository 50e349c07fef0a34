//! Aggregation of tasks into per-service snapshots
//!
//! Joins the independently fetched service and task lists by service ID,
//! drops orphan tasks and derives the summary facts published on every
//! scrape. Everything here is pure and synchronous.

use crate::models::{Service, ServiceSnapshot, Task, RUNNING_STATE};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Result of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    /// One snapshot per input service, in input order
    pub snapshots: Vec<ServiceSnapshot>,
    /// Tasks whose service ID matched no known service
    pub orphaned_tasks: usize,
}

/// Build one snapshot per service from the tasks it owns
pub fn aggregate(services: &[Service], tasks: &[Task]) -> Vec<ServiceSnapshot> {
    aggregate_with_stats(services, tasks).snapshots
}

/// Same as [`aggregate`], also reporting how many orphan tasks were dropped
pub fn aggregate_with_stats(services: &[Service], tasks: &[Task]) -> Aggregation {
    let known_ids: HashSet<&str> = services.iter().map(|s| s.id.as_str()).collect();

    let mut tasks_by_service: HashMap<&str, Vec<&Task>> =
        HashMap::with_capacity(known_ids.len());
    let mut orphaned_tasks = 0;

    for task in tasks {
        if !known_ids.contains(task.service_id.as_str()) {
            debug!(task_id = %task.id, service_id = %task.service_id, "Dropping orphan task");
            orphaned_tasks += 1;
            continue;
        }
        tasks_by_service
            .entry(task.service_id.as_str())
            .or_default()
            .push(task);
    }

    let snapshots = services
        .iter()
        .map(|service| {
            let owned = tasks_by_service
                .get(service.id.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            snapshot_service(service, owned)
        })
        .collect();

    Aggregation {
        snapshots,
        orphaned_tasks,
    }
}

fn snapshot_service(service: &Service, tasks: &[&Task]) -> ServiceSnapshot {
    let mut task_state_counts = BTreeMap::from([(RUNNING_STATE.to_string(), 0u64)]);
    let mut last_change_time = None;

    for task in tasks {
        *task_state_counts.entry(task.state.clone()).or_insert(0) += 1;

        // Strictly later only: ties keep the first seen value
        if let Some(ts) = task.state_timestamp {
            if last_change_time.map_or(true, |current| ts > current) {
                last_change_time = Some(ts);
            }
        }
    }

    ServiceSnapshot {
        name: service.name.clone(),
        desired_replicas: service.mode.desired_replicas(),
        task_state_counts,
        image: service.image.clone(),
        last_change_time,
    }
}
