#![cfg(feature = "http")]

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::TcpListener,
    thread::JoinHandle,
    time::Duration,
};

use workerstat_core::{Measurement, Sink, TagSet};
use workerstat_exporter_influx::InfluxBuilder;

struct Request {
    head: Vec<String>,
    body: String,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.iter().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then_some(value.trim())
        })
    }
}

// Serves a single request with the given status line, returning what was received.
fn server(status: &'static str) -> (JoinHandle<Request>, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind test listener");
    let port = listener.local_addr().expect("listener has no local address").port();

    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().expect("no connection received");
        stream.set_read_timeout(Some(Duration::from_secs(5))).expect("failed to set read timeout");
        let mut reader = BufReader::new(stream);

        let mut head = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("failed to read request head");
            let line = line.trim_end().to_string();
            if line.is_empty() {
                break;
            }
            head.push(line);
        }

        let mut request = Request { head, body: String::new() };
        let len = request
            .header("content-length")
            .and_then(|len| len.parse::<usize>().ok())
            .unwrap_or_default();
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).expect("failed to read request body");
        request.body = String::from_utf8(body).expect("body is not UTF-8");

        let response = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        reader.get_mut().write_all(response.as_bytes()).expect("failed to write response");

        request
    });

    (handle, port)
}

#[test]
fn posts_points_to_write_endpoint() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let (handle, port) = server("204 No Content");

    let sink = InfluxBuilder::from_connection_string(format!("http://u:p@127.0.0.1:{port}/db1"))
        .unwrap()
        .with_max_delay(Duration::from_secs(3600))
        .build()
        .unwrap();

    sink.add_point("taskStart", Measurement::scalar(1), &TagSet::from([("workerId", "w")]));
    sink.close();

    let request = handle.join().unwrap();
    assert_eq!(request.head[0], "POST /write?db=db1 HTTP/1.1");
    assert_eq!(request.header("authorization"), Some("Basic dTpw"));
    assert!(request.body.starts_with("taskStart,workerId=w value=1i "));
    assert!(request.body.ends_with('\n'));

    let telemetry = sink.telemetry();
    assert_eq!(telemetry.payloads_sent, 1);
    assert_eq!(telemetry.points_written, 1);
    assert_eq!(telemetry.payloads_failed, 0);
}

#[test]
fn error_status_fails_the_payload() {
    let (handle, port) = server("500 Internal Server Error");

    let sink = InfluxBuilder::from_connection_string(format!("http://127.0.0.1:{port}/db1"))
        .unwrap()
        .with_max_delay(Duration::from_secs(3600))
        .build()
        .unwrap();

    sink.add_point("taskClaim", Measurement::scalar(1), &TagSet::default());
    sink.close();

    let request = handle.join().unwrap();
    assert_eq!(request.header("authorization"), None);
    assert!(request.body.starts_with("taskClaim value=1i "));

    let telemetry = sink.telemetry();
    assert_eq!(telemetry.payloads_sent, 0);
    assert_eq!(telemetry.payloads_failed, 1);
    assert_eq!(telemetry.points_dropped, 1);
}
