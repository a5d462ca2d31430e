use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
};

use indexmap::IndexMap;
use quanta::{Clock, Instant};
use tracing::{debug, trace, warn};
use workerstat_core::{Measurement, SharedSink, TagSet, DURATION_FIELD};

use crate::{
    series::{Catalog, Reporter, DEFAULT_SERIES},
    BuildError, Config,
};

/// Reports measurements for a worker.
///
/// A `Stat` binds every series of its catalog, once, to a sink and to the tags derived from its
/// configuration. Reporting is then a lookup by series name: unknown names are ignored, so a typo at
/// a call site can never take down the code it instruments.
///
/// `Stat` is `Send` and `Sync`, and is meant to be shared, typically behind an `Arc`.
pub struct Stat {
    sink: SharedSink,
    tags: TagSet,
    reporters: IndexMap<&'static str, Reporter>,
    clock: Clock,
    closed: AtomicBool,
}

impl Stat {
    /// Creates a `Stat` for the default worker series.
    ///
    /// Points are sent to InfluxDB when `config.influx.connection_string` is set, and logged at the
    /// debug level otherwise.
    ///
    /// # Errors
    ///
    /// If a required identity field is missing, or the InfluxDB sink cannot be built, an error is
    /// returned.
    pub fn new(config: &Config) -> Result<Self, BuildError> {
        Self::with_catalog(config, Catalog::new(DEFAULT_SERIES)?)
    }

    /// Creates a `Stat` for the series in `catalog`.
    ///
    /// # Errors
    ///
    /// If a required identity field is missing, or the InfluxDB sink cannot be built, an error is
    /// returned.
    pub fn with_catalog(config: &Config, catalog: Catalog) -> Result<Self, BuildError> {
        let tags = config.tags()?;
        let sink = config.sink()?;
        Ok(Self::bind(sink, tags, catalog))
    }

    /// Creates a `Stat` for the series in `catalog` that reports to `sink`.
    ///
    /// The backend parameters in `config` are ignored.
    ///
    /// # Errors
    ///
    /// If a required identity field is missing, an error is returned.
    pub fn with_sink(config: &Config, catalog: Catalog, sink: SharedSink) -> Result<Self, BuildError> {
        let tags = config.tags()?;
        Ok(Self::bind(sink, tags, catalog))
    }

    fn bind(sink: SharedSink, tags: TagSet, catalog: Catalog) -> Self {
        let reporters = catalog
            .iter()
            .map(|definition| (definition.name(), definition.bind(sink.clone(), tags.clone())))
            .collect();

        debug!(series = catalog.len(), %tags, "Bound stats reporters.");

        Stat { sink, tags, reporters, clock: Clock::new(), closed: AtomicBool::new(false) }
    }

    /// Replaces the clock used for timing.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Gets the tags attached to every point.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Iterates over the names of the bound series, in catalog order.
    pub fn series_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.reporters.keys().copied()
    }

    /// Gets the current time, for use as the start of [`time`](Stat::time).
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Records a value for the given series.
    ///
    /// Scalars are recorded as `{value: scalar}`, structured measurements as given. Nothing happens if
    /// the series is unknown.
    pub fn record<V>(&self, series: &str, value: V)
    where
        V: Into<Measurement>,
    {
        if self.closed.load(Ordering::Acquire) {
            warn!(series, "Stats already closed, dropping point.");
            return;
        }

        match self.reporters.get(series) {
            Some(reporter) => reporter.report(value.into()),
            None => trace!(series, "Unknown series, ignoring point."),
        }
    }

    /// Records a count of one for the given series.
    pub fn increment(&self, series: &str) {
        self.record(series, 1);
    }

    /// Records the milliseconds elapsed since `start` for the given series.
    ///
    /// `start` should come from [`now`](Stat::now).
    pub fn time(&self, series: &str, start: Instant) {
        self.record(series, self.elapsed_ms(start));
    }

    /// Times a fallible operation.
    ///
    /// Awaits `future`, and if it succeeds, records its duration in milliseconds as the `duration`
    /// field merged with `extra`, then returns its value. A `duration` field in `extra` replaces the
    /// measured one. If it fails, the error is returned as is and nothing is recorded.
    ///
    /// # Errors
    ///
    /// Returns the error of `future`, if any.
    pub async fn time_future<F, T, E, X>(&self, series: &str, future: F, extra: X) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        X: Into<Measurement>,
    {
        let extra = extra.into();
        let start = self.clock.now();

        let value = future.await?;

        let point = Measurement::new().with_field(DURATION_FIELD, self.elapsed_ms(start)).merge(extra);
        self.record(series, point);

        Ok(value)
    }

    /// Closes the sink.
    ///
    /// Anything reported afterwards is dropped with a warning. Closing more than once does nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Stats already closed.");
            return;
        }

        self.sink.close();
    }

    /// Returns `true` if [`close`](Stat::close) has been called.
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn elapsed_ms(&self, start: Instant) -> i64 {
        let elapsed = self.clock.now().saturating_duration_since(start);
        i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
    }
}
