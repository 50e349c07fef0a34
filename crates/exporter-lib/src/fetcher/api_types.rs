//! Docker Engine API response types
//!
//! Only the fields the exporter reads are modelled; everything else in the
//! payload is ignored, and missing fields fall back to defaults. Records
//! are decoded one at a time so a malformed entry never hides the rest.

use crate::models::{Service, ServiceMode, Task};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ServiceResource {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub spec: ServiceSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ServiceSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mode: Option<ServiceModeSpec>,
    #[serde(default)]
    pub task_template: Option<TaskTemplate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ServiceModeSpec {
    #[serde(default)]
    pub replicated: Option<ReplicatedSpec>,
    #[serde(default)]
    pub global: Option<serde_json::Value>,
    #[serde(default)]
    pub replicated_job: Option<serde_json::Value>,
    #[serde(default)]
    pub global_job: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ReplicatedSpec {
    #[serde(default)]
    pub replicas: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TaskTemplate {
    #[serde(default)]
    pub container_spec: Option<ContainerSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ContainerSpec {
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TaskResource {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TaskStatus {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub state: String,
}

impl ServiceModeSpec {
    fn to_mode(&self, service_id: &str) -> ServiceMode {
        if let Some(replicated) = &self.replicated {
            return match replicated.replicas {
                Some(desired_replicas) => ServiceMode::Replicated { desired_replicas },
                None => {
                    debug!(service_id = %service_id, "Replicated service without replica count");
                    ServiceMode::Unknown
                }
            };
        }
        if self.global.is_some() {
            ServiceMode::Global
        } else if self.replicated_job.is_some() {
            ServiceMode::ReplicatedJob
        } else if self.global_job.is_some() {
            ServiceMode::GlobalJob
        } else {
            ServiceMode::Unknown
        }
    }
}

impl From<ServiceResource> for Service {
    fn from(resource: ServiceResource) -> Self {
        let mode = resource
            .spec
            .mode
            .as_ref()
            .map(|m| m.to_mode(&resource.id))
            .unwrap_or(ServiceMode::Unknown);

        let image = resource
            .spec
            .task_template
            .and_then(|t| t.container_spec)
            .map(|c| c.image)
            .unwrap_or_default();

        Service {
            id: resource.id,
            name: resource.spec.name,
            mode,
            image,
        }
    }
}

impl From<TaskResource> for Task {
    fn from(resource: TaskResource) -> Self {
        let status = resource.status.unwrap_or_default();
        let state_timestamp = status
            .timestamp
            .as_deref()
            .and_then(|raw| parse_timestamp(&resource.id, raw));

        Task {
            id: resource.id,
            service_id: resource.service_id,
            state: status.state,
            state_timestamp,
        }
    }
}

/// Parse a status timestamp; unparsable values and docker's unset time
/// (0001-01-01T00:00:00Z) both mean "no timestamp"
fn parse_timestamp(task_id: &str, raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)).filter(|ts| ts.timestamp() > 0),
        Err(e) => {
            debug!(
                task_id = %task_id,
                timestamp = %raw,
                error = %e,
                "Ignoring unparsable task timestamp"
            );
            None
        }
    }
}
