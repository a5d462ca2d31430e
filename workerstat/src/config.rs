use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use tracing::debug;
use workerstat_core::{LogSink, SharedSink, Tag, TagSet};
use workerstat_exporter_influx::InfluxBuilder;

use crate::BuildError;

/// Configuration for a [`Stat`](crate::Stat).
///
/// Deserializes from the camelCase shape used by worker configuration files:
///
/// ```json
/// {
///   "influx": { "connectionString": "udp://influx.example.com:8089", "maxDelay": 60 },
///   "workerId": "i-0abc",
///   "workerType": "ci",
///   "workerGroup": "us-east-1",
///   "workerNodeType": "m5.large",
///   "provisionerId": "aws",
///   "capacity": 4
/// }
/// ```
///
/// The identity fields are optional here so that a configuration with one missing deserializes
/// fine and is then rejected, by name, when the `Stat` is built.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// InfluxDB backend parameters.
    #[serde(default)]
    pub influx: InfluxConfig,

    /// Unique identifier of this worker.
    pub worker_id: Option<String>,

    /// Worker type this worker belongs to.
    pub worker_type: Option<String>,

    /// Worker group, usually the region or datacenter.
    pub worker_group: Option<String>,

    /// Instance or node type the worker runs on.
    pub worker_node_type: Option<String>,

    /// Provisioner that created this worker.
    pub provisioner_id: Option<String>,

    /// Number of tasks this worker runs concurrently.
    pub capacity: Option<u64>,
}

/// InfluxDB backend parameters.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InfluxConfig {
    /// Where to send points. Points are only logged when this is absent.
    ///
    /// See [`InfluxBuilder::with_connection_string`] for the accepted formats.
    pub connection_string: Option<String>,

    /// Maximum delay between flushes, in seconds.
    pub max_delay: Option<u64>,

    /// Number of pending points that triggers an early flush.
    pub max_pending_points: Option<usize>,
}

impl Config {
    /// Builds the tag set attached to every point.
    ///
    /// # Errors
    ///
    /// If a required identity field is missing or empty, an error naming it is returned. Fields are
    /// checked in the order `workerId`, `workerType`, `workerGroup`, `workerNodeType`,
    /// `provisionerId`.
    pub fn tags(&self) -> Result<TagSet, BuildError> {
        let worker_id = required(self.worker_id.as_deref(), "workerId")?;
        let worker_type = required(self.worker_type.as_deref(), "workerType")?;
        let worker_group = required(self.worker_group.as_deref(), "workerGroup")?;
        let worker_node_type = required(self.worker_node_type.as_deref(), "workerNodeType")?;
        let provisioner_id = required(self.provisioner_id.as_deref(), "provisionerId")?;

        let mut tags = vec![
            Tag::new("workerId", worker_id),
            Tag::new("workerGroup", worker_group),
            Tag::new("workerType", worker_type),
            Tag::new("instanceType", worker_node_type),
            Tag::new("provisionerId", provisioner_id),
        ];
        if let Some(capacity) = self.capacity {
            tags.push(Tag::new("capacity", capacity.to_string()));
        }

        Ok(TagSet::new(tags))
    }

    /// Builds the sink points are sent to.
    ///
    /// With a connection string, this is an InfluxDB sink. Without one, points are only logged.
    pub(crate) fn sink(&self) -> Result<SharedSink, BuildError> {
        let Some(connection_string) =
            self.influx.connection_string.as_deref().filter(|s| !s.is_empty())
        else {
            debug!("No InfluxDB connection string configured, stats will only be logged.");
            return Ok(Arc::new(LogSink));
        };

        let mut builder = InfluxBuilder::from_connection_string(connection_string)?;
        if let Some(max_delay) = self.influx.max_delay {
            builder = builder.with_max_delay(Duration::from_secs(max_delay));
        }
        if let Some(max_pending_points) = self.influx.max_pending_points {
            builder = builder.with_max_pending_points(max_pending_points);
        }

        Ok(Arc::new(builder.build()?))
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, BuildError> {
    value.filter(|v| !v.is_empty()).ok_or(BuildError::MissingField { field })
}
