//! Core types shared by the `workerstat` facade and its sinks.
//!
//! A worker reports three things for every data point:
//!
//! - the name of the series the point belongs to, such as `taskRun`;
//! - a [`Measurement`], an ordered set of fields (`duration=1520i,exitCode=0i`);
//! - a [`TagSet`] identifying the process that emitted it (worker ID, worker type, and so on).
//!
//! Points are handed to a [`Sink`], which is responsible for getting them to a time-series backend.
//! Sinks are fire-and-forget: they never report failures back to the caller, since instrumentation
//! must not be able to break the code paths it observes.
//!
//! When no backend is configured, [`LogSink`] is used instead: it satisfies the same contract while
//! only emitting each point to the diagnostic log.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod measurement;
pub use self::measurement::*;

mod sink;
pub use self::sink::*;

mod tags;
pub use self::tags::*;
