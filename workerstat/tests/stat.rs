use std::{io, sync::Arc, time::Duration};

use mockall::mock;
use quanta::Clock;
use workerstat::{
    BuildError, Catalog, Config, FieldValue, Measurement, SeriesDefinition, Sink, Stat, TagSet,
};
use workerstat_util::DebuggingSink;

mock! {
    pub Backend {}
    impl Sink for Backend {
        fn add_point(&self, series: &str, point: Measurement, tags: &TagSet);
        fn close(&self);
    }
}

static TEST_SERIES: &[SeriesDefinition] = &[
    SeriesDefinition::new("operation", &[]).with_additional_columns(),
    SeriesDefinition::new("gauge", &[]).with_additional_columns(),
];

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config() -> Config {
    Config {
        worker_id: Some("i-0abc".into()),
        worker_type: Some("ci".into()),
        worker_group: Some("us-east-1".into()),
        worker_node_type: Some("m5.large".into()),
        provisioner_id: Some("aws".into()),
        capacity: Some(4),
        ..Config::default()
    }
}

fn catalog() -> Catalog {
    Catalog::new(TEST_SERIES).unwrap()
}

fn debugging_stat() -> (Stat, workerstat_util::Snapshotter) {
    let sink = DebuggingSink::new();
    let snapshotter = sink.snapshotter();
    let stat = Stat::with_sink(&config(), catalog(), Arc::new(sink)).unwrap();
    (stat, snapshotter)
}

#[test]
fn scalars_are_wrapped_as_value() {
    init_tracing();

    let scalars: Vec<FieldValue> = vec![
        FieldValue::from(42),
        FieldValue::from(-7i64),
        FieldValue::from(0.25),
        FieldValue::from("idle"),
        FieldValue::from(true),
    ];

    for scalar in scalars {
        let mut backend = MockBackend::new();
        let expected = Measurement::new().with_field("value", scalar.clone());
        backend
            .expect_add_point()
            .withf(move |series, point, _| series == "gauge" && *point == expected)
            .times(1)
            .return_const(());

        let stat = Stat::with_sink(&config(), catalog(), Arc::new(backend)).unwrap();
        stat.record("gauge", Measurement::scalar(scalar));
    }
}

#[test]
fn scalar_conversions() {
    let (stat, snapshotter) = debugging_stat();

    stat.record("gauge", 42);
    stat.record("gauge", 0.5);
    stat.record("gauge", "busy");
    stat.record("gauge", String::from("idle"));

    let values: Vec<_> =
        snapshotter.snapshot().into_iter().map(|p| p.point.get("value").cloned()).collect();
    assert_eq!(
        values,
        vec![
            Some(FieldValue::Integer(42)),
            Some(FieldValue::Float(0.5)),
            Some(FieldValue::Str("busy".into())),
            Some(FieldValue::Str("idle".into())),
        ]
    );
}

#[test]
fn structured_measurements_pass_through() {
    let point = Measurement::from([("duration", 1520)])
        .with_field("exitCode", 1)
        .with_field("state", "failed");

    let expected = point.clone();
    let mut backend = MockBackend::new();
    backend
        .expect_add_point()
        .withf(move |series, point, tags| {
            series == "operation" && *point == expected && tags.get("workerId") == Some("i-0abc")
        })
        .times(1)
        .return_const(());

    let stat = Stat::with_sink(&config(), catalog(), Arc::new(backend)).unwrap();
    stat.record("operation", point);
}

#[test]
fn points_carry_identity_tags() {
    let (stat, snapshotter) = debugging_stat();
    stat.increment("gauge");

    let tags = &snapshotter.snapshot()[0].tags;
    assert_eq!(
        tags.to_string(),
        "workerId=i-0abc,workerGroup=us-east-1,workerType=ci,instanceType=m5.large,provisionerId=aws,capacity=4"
    );
}

#[test]
fn unknown_series_is_ignored() {
    let mut backend = MockBackend::new();
    backend.expect_add_point().times(0);

    let stat = Stat::with_sink(&config(), catalog(), Arc::new(backend)).unwrap();
    stat.record("no-such-series", 1);
    stat.increment("no-such-series");
    stat.time("no-such-series", stat.now());
}

#[test]
fn time_records_elapsed_milliseconds() {
    let (clock, mock) = Clock::mock();
    let (stat, snapshotter) = debugging_stat();
    let stat = stat.with_clock(clock);

    let start = stat.now();
    mock.increment(Duration::from_millis(250));
    stat.time("operation", start);

    let points = snapshotter.snapshot();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].point, Measurement::scalar(250));
}

#[tokio::test]
async fn time_future_records_duration_and_extra() {
    let (clock, mock) = Clock::mock();
    let (stat, snapshotter) = debugging_stat();
    let stat = stat.with_clock(clock);

    let operation = async move {
        mock.increment(Duration::from_millis(40));
        Ok::<_, io::Error>(42)
    };
    let value = stat.time_future("operation", operation, [("tag", "x")]).await.unwrap();
    assert_eq!(value, 42);

    let points = snapshotter.snapshot();
    assert_eq!(points.len(), 1);
    assert_eq!(
        points[0].point,
        Measurement::from([("duration", FieldValue::Integer(40)), ("tag", FieldValue::from("x"))])
    );
}

#[tokio::test]
async fn time_future_extra_duration_wins() {
    let (stat, snapshotter) = debugging_stat();

    let value = stat
        .time_future("operation", async { Ok::<_, io::Error>("done") }, [("duration", 5)])
        .await
        .unwrap();
    assert_eq!(value, "done");

    let point = &snapshotter.snapshot()[0].point;
    assert_eq!(point.len(), 1);
    assert_eq!(point.get("duration"), Some(&FieldValue::Integer(5)));
}

#[tokio::test]
async fn time_future_failure_records_nothing() {
    let mut backend = MockBackend::new();
    backend.expect_add_point().times(0);
    let stat = Stat::with_sink(&config(), catalog(), Arc::new(backend)).unwrap();

    let operation = async { Err::<u32, _>(io::Error::new(io::ErrorKind::NotFound, "no such image")) };
    let err = stat.time_future("operation", operation, Measurement::new()).await.unwrap_err();

    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    assert_eq!(err.to_string(), "no such image");
}

#[test]
fn missing_connection_string_falls_back_to_logging() {
    init_tracing();

    let stat = Stat::new(&config()).unwrap();
    for name in stat.series_names().collect::<Vec<_>>() {
        stat.increment(name);
    }
    stat.record("taskRun", [("duration", 1520)]);
    stat.time("taskStart", stat.now());
    stat.close();
}

#[test]
fn missing_identity_field_fails() {
    let cases: [(&str, fn(&mut Config)); 5] = [
        ("workerId", |c| c.worker_id = None),
        ("workerType", |c| c.worker_type = None),
        ("workerGroup", |c| c.worker_group = None),
        ("workerNodeType", |c| c.worker_node_type = Some(String::new())),
        ("provisionerId", |c| c.provisioner_id = None),
    ];

    for (expected, clear) in cases {
        let mut config = config();
        clear(&mut config);

        let err = Stat::new(&config).err().expect("construction should fail");
        assert!(matches!(err, BuildError::MissingField { field } if field == expected));
        assert!(err.to_string().contains(expected));
    }
}

#[test]
fn invalid_connection_string_fails() {
    let mut config = config();
    config.influx.connection_string = Some("influx.example.com:8089".into());

    assert!(matches!(Stat::new(&config), Err(BuildError::Backend(_))));
}

#[test]
fn close_releases_the_sink_once() {
    let mut backend = MockBackend::new();
    backend.expect_close().times(1).return_const(());
    backend.expect_add_point().times(0);

    let stat = Stat::with_sink(&config(), catalog(), Arc::new(backend)).unwrap();
    stat.close();
    stat.close();
    stat.increment("gauge");
    assert!(stat.closed());
}

#[test]
fn stat_is_shareable_across_threads() {
    let (stat, snapshotter) = debugging_stat();
    let stat = Arc::new(stat);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let stat = Arc::clone(&stat);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    stat.increment("gauge");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(snapshotter.snapshot().len(), 100);
}
