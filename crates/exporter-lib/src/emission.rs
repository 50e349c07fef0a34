//! Metric emission for service snapshots
//!
//! Flattens snapshots into labeled gauge samples. The metric schema is a
//! static, immutable table; every scrape writes into a fresh [`GaugeSink`]
//! built from it, so nothing is registered globally and nothing outlives
//! the scrape.

use crate::models::ServiceSnapshot;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts, Registry};
use std::collections::HashMap;
use thiserror::Error;

/// Name, help text and label names of one gauge family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

/// The gauge families published for every service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSchema {
    pub desired_replicas: MetricDesc,
    pub tasks: MetricDesc,
    pub info: MetricDesc,
    pub change_time: MetricDesc,
}

impl MetricSchema {
    /// All descriptors, in emission order
    pub fn descriptors(&self) -> [&MetricDesc; 4] {
        [
            &self.desired_replicas,
            &self.tasks,
            &self.info,
            &self.change_time,
        ]
    }
}

pub static SWARM_SCHEMA: MetricSchema = MetricSchema {
    desired_replicas: MetricDesc {
        name: "swarm_service_desired_replicas",
        help: "Number of replicas requested for this service",
        labels: &["service_name"],
    },
    tasks: MetricDesc {
        name: "swarm_service_tasks",
        help: "Number of docker tasks",
        labels: &["service_name", "state"],
    },
    info: MetricDesc {
        name: "swarm_service_info",
        help: "Information about each service",
        labels: &["service_name", "image"],
    },
    change_time: MetricDesc {
        name: "swarm_service_change_time",
        help: "Time when a task state last changed",
        labels: &["service_name"],
    },
};

/// Errors raised while writing samples
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("metric {0} is not part of the schema")]
    UnknownMetric(String),

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Destination for labeled gauge samples
pub trait SampleSink {
    /// Record one sample; label values follow the order of `desc.labels`
    fn gauge(
        &mut self,
        desc: &MetricDesc,
        label_values: &[&str],
        value: f64,
    ) -> Result<(), EmitError>;
}

/// Write every snapshot into `sink`, returning the number of samples emitted
///
/// Samples are written one at a time in snapshot order; if an error occurs,
/// samples written before it stay in the sink.
pub fn emit_snapshots<S: SampleSink + ?Sized>(
    schema: &MetricSchema,
    snapshots: &[ServiceSnapshot],
    sink: &mut S,
) -> Result<usize, EmitError> {
    let mut emitted = 0;

    for snapshot in snapshots {
        let name = snapshot.name.as_str();

        if let Some(desired) = snapshot.desired_replicas {
            sink.gauge(&schema.desired_replicas, &[name], desired as f64)?;
            emitted += 1;
        }

        for (state, count) in &snapshot.task_state_counts {
            sink.gauge(&schema.tasks, &[name, state.as_str()], *count as f64)?;
            emitted += 1;
        }

        // Info pattern: the series carries the data, the value is always 1
        sink.gauge(&schema.info, &[name, snapshot.image.as_str()], 1.0)?;
        emitted += 1;

        sink.gauge(
            &schema.change_time,
            &[name],
            snapshot.last_change_unix_secs() as f64,
        )?;
        emitted += 1;
    }

    Ok(emitted)
}

/// Per-scrape sink backed by a private Prometheus registry
///
/// Writing the same label set twice overwrites the earlier value.
pub struct GaugeSink {
    registry: Registry,
    gauges: HashMap<&'static str, GaugeVec>,
}

impl GaugeSink {
    /// Create a sink with one gauge family per schema entry
    pub fn new(schema: &MetricSchema) -> Result<Self, EmitError> {
        let registry = Registry::new();
        let mut gauges = HashMap::new();

        for desc in schema.descriptors() {
            let gauge = GaugeVec::new(Opts::new(desc.name, desc.help), desc.labels)?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(desc.name, gauge);
        }

        Ok(Self { registry, gauges })
    }

    /// Gather the families written so far; families without samples are left out
    pub fn finish(self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

impl SampleSink for GaugeSink {
    fn gauge(
        &mut self,
        desc: &MetricDesc,
        label_values: &[&str],
        value: f64,
    ) -> Result<(), EmitError> {
        let family = self
            .gauges
            .get(desc.name)
            .ok_or_else(|| EmitError::UnknownMetric(desc.name.to_string()))?;
        family
            .get_metric_with_label_values(label_values)?
            .set(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RUNNING_STATE;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        name: &'static str,
        labels: Vec<String>,
        value: f64,
    }

    #[derive(Default)]
    struct RecordingSink {
        samples: Vec<Sample>,
        fail_on: Option<&'static str>,
    }

    impl SampleSink for RecordingSink {
        fn gauge(
            &mut self,
            desc: &MetricDesc,
            label_values: &[&str],
            value: f64,
        ) -> Result<(), EmitError> {
            if self.fail_on == Some(desc.name) {
                return Err(EmitError::UnknownMetric(desc.name.to_string()));
            }
            self.samples.push(Sample {
                name: desc.name,
                labels: label_values.iter().map(|l| l.to_string()).collect(),
                value,
            });
            Ok(())
        }
    }

    fn snapshot(
        name: &str,
        desired: Option<u64>,
        counts: &[(&str, u64)],
        secs: Option<i64>,
    ) -> ServiceSnapshot {
        let mut task_state_counts = BTreeMap::from([(RUNNING_STATE.to_string(), 0)]);
        for (state, count) in counts {
            task_state_counts.insert(state.to_string(), *count);
        }
        ServiceSnapshot {
            name: name.to_string(),
            desired_replicas: desired,
            task_state_counts,
            image: format!("{}:latest", name),
            last_change_time: secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    #[test]
    fn test_replicated_snapshot_samples() {
        let mut sink = RecordingSink::default();
        let snapshots = vec![snapshot("web", Some(3), &[("running", 2)], Some(150))];

        let emitted = emit_snapshots(&SWARM_SCHEMA, &snapshots, &mut sink).unwrap();

        assert_eq!(emitted, 4);
        assert_eq!(
            sink.samples,
            vec![
                Sample {
                    name: "swarm_service_desired_replicas",
                    labels: vec!["web".into()],
                    value: 3.0,
                },
                Sample {
                    name: "swarm_service_tasks",
                    labels: vec!["web".into(), "running".into()],
                    value: 2.0,
                },
                Sample {
                    name: "swarm_service_info",
                    labels: vec!["web".into(), "web:latest".into()],
                    value: 1.0,
                },
                Sample {
                    name: "swarm_service_change_time",
                    labels: vec!["web".into()],
                    value: 150.0,
                },
            ]
        );
    }

    #[test]
    fn test_global_snapshot_has_no_desired_replicas_sample() {
        let mut sink = RecordingSink::default();
        let snapshots = vec![snapshot("agent", None, &[("running", 5)], Some(1))];

        emit_snapshots(&SWARM_SCHEMA, &snapshots, &mut sink).unwrap();

        assert!(sink
            .samples
            .iter()
            .all(|s| s.name != "swarm_service_desired_replicas"));
    }

    #[test]
    fn test_empty_service_emits_zero_samples() {
        let mut sink = RecordingSink::default();
        let snapshots = vec![snapshot("idle", Some(1), &[], None)];

        emit_snapshots(&SWARM_SCHEMA, &snapshots, &mut sink).unwrap();

        let running = sink
            .samples
            .iter()
            .find(|s| s.name == "swarm_service_tasks")
            .unwrap();
        assert_eq!(running.labels, vec!["idle", "running"]);
        assert_eq!(running.value, 0.0);

        let change = sink
            .samples
            .iter()
            .find(|s| s.name == "swarm_service_change_time")
            .unwrap();
        assert_eq!(change.value, 0.0);
    }

    #[test]
    fn test_one_task_sample_per_state() {
        let mut sink = RecordingSink::default();
        let snapshots = vec![snapshot(
            "api",
            None,
            &[("running", 1), ("failed", 2), ("shutdown", 3)],
            Some(9),
        )];

        emit_snapshots(&SWARM_SCHEMA, &snapshots, &mut sink).unwrap();

        let states: Vec<_> = sink
            .samples
            .iter()
            .filter(|s| s.name == "swarm_service_tasks")
            .map(|s| (s.labels[1].clone(), s.value))
            .collect();
        assert_eq!(
            states,
            vec![
                ("failed".to_string(), 2.0),
                ("running".to_string(), 1.0),
                ("shutdown".to_string(), 3.0),
            ]
        );
    }

    #[test]
    fn test_partial_emission_keeps_earlier_samples() {
        let mut sink = RecordingSink {
            fail_on: Some("swarm_service_change_time"),
            ..Default::default()
        };
        let snapshots = vec![snapshot("web", Some(2), &[], Some(5))];

        let result = emit_snapshots(&SWARM_SCHEMA, &snapshots, &mut sink);

        assert!(result.is_err());
        assert_eq!(sink.samples.len(), 3);
    }

    #[test]
    fn test_gauge_sink_gathers_families() {
        let mut sink = GaugeSink::new(&SWARM_SCHEMA).unwrap();
        let snapshots = vec![snapshot("web", Some(3), &[("running", 2)], Some(150))];

        emit_snapshots(&SWARM_SCHEMA, &snapshots, &mut sink).unwrap();
        let families = sink.finish();

        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert_eq!(names.len(), 4);
        for desc in SWARM_SCHEMA.descriptors() {
            assert!(names.contains(&desc.name.to_string()), "missing {}", desc.name);
        }
    }

    #[test]
    fn test_gauge_sink_omits_unused_families() {
        let mut sink = GaugeSink::new(&SWARM_SCHEMA).unwrap();
        let snapshots = vec![snapshot("agent", None, &[], None)];

        emit_snapshots(&SWARM_SCHEMA, &snapshots, &mut sink).unwrap();
        let families = sink.finish();

        assert!(families
            .iter()
            .all(|f| f.get_name() != "swarm_service_desired_replicas"));
    }

    #[test]
    fn test_gauge_sink_rejects_wrong_label_count() {
        let mut sink = GaugeSink::new(&SWARM_SCHEMA).unwrap();

        let result = sink.gauge(&SWARM_SCHEMA.tasks, &["only-one"], 1.0);

        assert!(matches!(result, Err(EmitError::Prometheus(_))));
    }

    // Colliding service names are undefined upstream; this pins the current
    // behaviour: the later service overwrites the shared label sets.
    #[test]
    fn test_gauge_sink_name_collision_last_writer_wins() {
        let mut sink = GaugeSink::new(&SWARM_SCHEMA).unwrap();
        let snapshots = vec![
            snapshot("dup", Some(1), &[], Some(10)),
            snapshot("dup", Some(4), &[], Some(20)),
        ];

        let emitted = emit_snapshots(&SWARM_SCHEMA, &snapshots, &mut sink).unwrap();
        assert_eq!(emitted, 8);

        let families = sink.finish();
        let desired = families
            .iter()
            .find(|f| f.get_name() == "swarm_service_desired_replicas")
            .unwrap();
        assert_eq!(desired.get_metric().len(), 1);
        assert_eq!(desired.get_metric()[0].get_gauge().get_value(), 4.0);
    }
}
