use thiserror::Error;

/// Errors that could occur while building a [`Stat`](crate::Stat).
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required identity field was missing or empty.
    ///
    /// `field` is the configuration key, such as `workerId`.
    #[error("missing required configuration field '{field}'")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// Two entries in a series catalog share a name.
    #[error("series '{name}' is defined more than once")]
    DuplicateSeries {
        /// Name of the duplicated series.
        name: &'static str,
    },

    /// The metrics backend could not be built from its configuration.
    #[error("failed to build metrics backend: {0}")]
    Backend(#[from] workerstat_exporter_influx::BuildError),
}
