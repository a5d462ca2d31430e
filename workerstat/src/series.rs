//! Series definitions and the catalog they are bound from.

use std::{collections::HashSet, fmt};

use tracing::warn;
use workerstat_core::{FieldKind, Measurement, SharedSink, TagSet, DURATION_FIELD, VALUE_FIELD};

use crate::BuildError;

/// A column a series declares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    name: &'static str,
    kind: FieldKind,
}

impl Column {
    /// Creates a new `Column`.
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Column { name, kind }
    }

    /// Gets the name of this column.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Gets the kind of value this column holds.
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }
}

/// Binds a series to a sink and a tag set.
pub type ReporterFactory = fn(&'static SeriesDefinition, SharedSink, TagSet) -> Reporter;

/// Forwards measurements for one series.
///
/// Created once per series when a [`Stat`](crate::Stat) is built, closing over its sink and tag set.
/// Every call to [`report`](Reporter::report) emits exactly one point.
pub struct Reporter {
    report: Box<dyn Fn(Measurement) + Send + Sync>,
}

impl Reporter {
    /// Creates a `Reporter` from a closure.
    pub fn new<F>(report: F) -> Self
    where
        F: Fn(Measurement) + Send + Sync + 'static,
    {
        Reporter { report: Box::new(report) }
    }

    /// Reports a measurement.
    pub fn report(&self, point: Measurement) {
        (self.report)(point);
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

/// A named series.
///
/// Definitions are declared statically:
///
/// ```
/// # use workerstat::series::{Column, SeriesDefinition};
/// # use workerstat::FieldKind;
/// static CACHE_HIT: SeriesDefinition =
///     SeriesDefinition::new("cacheHit", &[Column::new("value", FieldKind::Integer)]);
///
/// static CACHE_FILL: SeriesDefinition =
///     SeriesDefinition::new("cacheFill", &[Column::new("duration", FieldKind::Integer)])
///         .with_additional_columns();
/// ```
#[derive(Clone, Copy)]
pub struct SeriesDefinition {
    name: &'static str,
    columns: &'static [Column],
    additional_columns: bool,
    factory: ReporterFactory,
}

impl SeriesDefinition {
    /// Creates a new `SeriesDefinition` using the stock reporter.
    ///
    /// The stock reporter sends every measurement to the sink unchanged. Measurements with fields
    /// that are not declared, or that hold the wrong kind of value, are logged as a warning first.
    pub const fn new(name: &'static str, columns: &'static [Column]) -> Self {
        SeriesDefinition { name, columns, additional_columns: false, factory: stock_reporter }
    }

    /// Allows fields beyond the declared columns.
    #[must_use]
    pub const fn with_additional_columns(self) -> Self {
        SeriesDefinition { additional_columns: true, ..self }
    }

    /// Replaces the stock reporter with a custom factory.
    #[must_use]
    pub const fn with_factory(self, factory: ReporterFactory) -> Self {
        SeriesDefinition { factory, ..self }
    }

    /// Gets the name of this series.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Gets the declared columns.
    pub const fn columns(&self) -> &'static [Column] {
        self.columns
    }

    /// Whether or not fields beyond the declared columns are expected.
    pub const fn allows_additional_columns(&self) -> bool {
        self.additional_columns
    }

    /// Binds a reporter for this series.
    pub fn bind(&'static self, sink: SharedSink, tags: TagSet) -> Reporter {
        (self.factory)(self, sink, tags)
    }

    /// Logs a warning for every field of `point` that does not match the declared columns.
    ///
    /// Returns `true` if every field matched.
    pub fn check(&self, point: &Measurement) -> bool {
        let mut matched = true;
        for (field, value) in point.iter() {
            match self.columns.iter().find(|column| column.name == field) {
                Some(column) if !value.is_compatible_with(column.kind) => {
                    warn!(
                        series = self.name,
                        field,
                        expected = column.kind.as_str(),
                        actual = value.kind().as_str(),
                        "Field has the wrong type for its column."
                    );
                    matched = false;
                }
                Some(_) => {}
                None if self.additional_columns => {}
                None => {
                    warn!(series = self.name, field, "Field is not a declared column.");
                    matched = false;
                }
            }
        }
        matched
    }
}

impl fmt::Debug for SeriesDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesDefinition")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("additional_columns", &self.additional_columns)
            .finish_non_exhaustive()
    }
}

fn stock_reporter(definition: &'static SeriesDefinition, sink: SharedSink, tags: TagSet) -> Reporter {
    Reporter::new(move |point| {
        definition.check(&point);
        sink.add_point(definition.name, point, &tags);
    })
}

/// A validated set of series definitions.
#[derive(Clone, Copy, Debug)]
pub struct Catalog {
    definitions: &'static [SeriesDefinition],
}

impl Catalog {
    /// Creates a `Catalog` from the given definitions.
    ///
    /// # Errors
    ///
    /// If two definitions share a name, an error naming the series is returned.
    pub fn new(definitions: &'static [SeriesDefinition]) -> Result<Self, BuildError> {
        let mut seen = HashSet::with_capacity(definitions.len());
        for definition in definitions {
            if !seen.insert(definition.name) {
                return Err(BuildError::DuplicateSeries { name: definition.name });
            }
        }

        Ok(Catalog { definitions })
    }

    /// Iterates over the definitions in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'static, SeriesDefinition> {
        let definitions: &'static [SeriesDefinition] = self.definitions;
        definitions.iter()
    }

    /// Gets the number of series.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if there are no series.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

const VALUE: &[Column] = &[Column::new(VALUE_FIELD, FieldKind::Integer)];
const DURATION: &[Column] = &[Column::new(DURATION_FIELD, FieldKind::Integer)];

/// The series a worker reports.
pub static DEFAULT_SERIES: &[SeriesDefinition] = &[
    SeriesDefinition::new("workerStart", VALUE),
    SeriesDefinition::new(
        "workerShutdown",
        &[Column::new(VALUE_FIELD, FieldKind::Integer), Column::new("reason", FieldKind::String)],
    ),
    SeriesDefinition::new("taskClaim", VALUE),
    SeriesDefinition::new("taskStart", VALUE),
    SeriesDefinition::new(
        "taskResolved",
        &[Column::new(VALUE_FIELD, FieldKind::Integer), Column::new("state", FieldKind::String)],
    ),
    SeriesDefinition::new("taskRun", DURATION).with_additional_columns(),
    SeriesDefinition::new("imageDownload", DURATION).with_additional_columns(),
    SeriesDefinition::new("imageLoad", DURATION).with_additional_columns(),
    SeriesDefinition::new(
        "artifactUpload",
        &[Column::new(DURATION_FIELD, FieldKind::Integer), Column::new("size", FieldKind::Integer)],
    )
    .with_additional_columns(),
    SeriesDefinition::new("capacityAvailable", VALUE),
    SeriesDefinition::new("runningTasks", VALUE),
];

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use workerstat_core::{FieldKind, Measurement, SharedSink, TagSet};
    use workerstat_util::DebuggingSink;

    use super::{Catalog, Column, Reporter, SeriesDefinition, DEFAULT_SERIES};
    use crate::BuildError;

    static DUPLICATED: &[SeriesDefinition] = &[
        SeriesDefinition::new("taskStart", &[]),
        SeriesDefinition::new("taskRun", &[]),
        SeriesDefinition::new("taskStart", &[]),
    ];

    static STRICT: SeriesDefinition = SeriesDefinition::new(
        "strict",
        &[Column::new("value", FieldKind::Integer), Column::new("ratio", FieldKind::Float)],
    );

    static RENAMED: SeriesDefinition =
        SeriesDefinition::new("renamed", &[]).with_factory(renamed_reporter);

    fn renamed_reporter(_: &'static SeriesDefinition, sink: SharedSink, tags: TagSet) -> Reporter {
        Reporter::new(move |point| sink.add_point("renamed.v2", point, &tags))
    }

    #[test]
    fn default_catalog_is_valid() {
        let catalog = Catalog::new(DEFAULT_SERIES).unwrap();
        assert_eq!(catalog.len(), 11);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        match Catalog::new(DUPLICATED) {
            Err(BuildError::DuplicateSeries { name }) => assert_eq!(name, "taskStart"),
            other => panic!("expected duplicate series error, got {other:?}"),
        }
    }

    #[test]
    fn column_checks() {
        assert!(STRICT.check(&Measurement::scalar(1)));
        assert!(STRICT.check(&Measurement::from([("ratio", 1)])));
        assert!(STRICT.check(&Measurement::from([("ratio", 0.5)])));
        assert!(!STRICT.check(&Measurement::scalar("one")));
        assert!(!STRICT.check(&Measurement::from([("other", 1)])));

        let open = SeriesDefinition::new("open", &[]).with_additional_columns();
        assert!(open.check(&Measurement::from([("anything", "goes")])));
    }

    #[test]
    fn stock_reporter_always_emits() {
        let sink = DebuggingSink::new();
        let snapshotter = sink.snapshotter();
        let tags = TagSet::from([("workerType", "ci")]);

        let reporter = STRICT.bind(Arc::new(sink), tags.clone());
        reporter.report(Measurement::scalar(1));
        reporter.report(Measurement::scalar("mistyped"));

        let points = snapshotter.snapshot();
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.series == "strict" && p.tags == tags));
        assert_eq!(points[1].point, Measurement::scalar("mistyped"));
    }

    #[test]
    fn custom_factory() {
        let sink = DebuggingSink::new();
        let snapshotter = sink.snapshotter();

        let reporter = RENAMED.bind(Arc::new(sink), TagSet::default());
        reporter.report(Measurement::scalar(1));

        assert_eq!(snapshotter.snapshot()[0].series, "renamed.v2");
    }
}
