//! A metrics facade for workers.
//!
//! `workerstat` gives application code one small surface for reporting what a worker does (counts,
//! durations, structured data points) while keeping the backend out of the picture. Every point is
//! tagged with the identity of the worker that emitted it: worker ID, worker group and type, instance
//! type, provisioner, and capacity.
//!
//! # Series
//!
//! Points are reported against named series, declared up front in a [`Catalog`] of
//! [`SeriesDefinition`]s. When a [`Stat`] is built, every series is bound to a [`Reporter`] that
//! closes over the sink and the tags, so reporting is a single lookup. Reporting against a series
//! that is not in the catalog is not an error: the point is ignored.
//!
//! # Usage
//!
//! ```no_run
//! # use workerstat::{Config, Stat};
//! # async fn download() -> Result<u64, std::io::Error> { Ok(0) }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config: Config = serde_json::from_str(r#"{
//!     "influx": { "connectionString": "udp://127.0.0.1:8089" },
//!     "workerId": "i-0abc",
//!     "workerType": "ci",
//!     "workerGroup": "us-east-1",
//!     "workerNodeType": "m5.large",
//!     "provisionerId": "aws"
//! }"#)?;
//! let stat = Stat::new(&config)?;
//!
//! // Scalars are recorded as `{value: scalar}`.
//! stat.increment("taskClaim");
//! stat.record("runningTasks", 3);
//!
//! // Structured measurements are recorded as given.
//! stat.record("taskResolved", [("value", 1)]);
//!
//! // Elapsed milliseconds, recorded as a scalar.
//! let start = stat.now();
//! stat.time("workerStart", start);
//!
//! // Time an operation, recording `{duration, image}` only if it succeeds.
//! let _bytes = stat.time_future("imageDownload", download(), [("image", "ubuntu:24.04")]).await?;
//!
//! stat.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Backends
//!
//! With `influx.connectionString` configured, points are sent to InfluxDB by
//! [`workerstat_exporter_influx`]. Without it, each point is logged at the debug level under the
//! `workerstat::stats` target, and the worker runs normally. Any other [`Sink`] can be plugged in
//! with [`Stat::with_sink`].

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod config;
pub use self::config::{Config, InfluxConfig};

mod error;
pub use self::error::BuildError;

pub mod series;
pub use self::series::{Catalog, Column, Reporter, SeriesDefinition};

mod stat;
pub use self::stat::Stat;

pub use workerstat_core::{FieldKind, FieldValue, LogSink, Measurement, SharedSink, Sink, Tag, TagSet};
