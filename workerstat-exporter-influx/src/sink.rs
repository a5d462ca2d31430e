use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};
use workerstat_core::{Measurement, Sink, TagSet};

use crate::{
    forwarder::{Command, PendingPoint},
    telemetry::{Telemetry, TelemetrySnapshot},
};

/// A sink that forwards points to InfluxDB.
///
/// Points are handed to a background forwarder over a bounded queue, so adding a point never blocks
/// on the network. When the queue is full, the point is dropped and counted in the exporter's
/// telemetry.
///
/// Created with [`InfluxBuilder`](crate::InfluxBuilder).
pub struct InfluxSink {
    tx: Sender<Command>,
    telemetry: Arc<Telemetry>,
    transport: &'static str,
    close_timeout: Duration,
    closed: AtomicBool,
}

impl InfluxSink {
    pub(crate) fn new(
        tx: Sender<Command>,
        telemetry: Arc<Telemetry>,
        transport: &'static str,
        close_timeout: Duration,
    ) -> Self {
        InfluxSink { tx, telemetry, transport, close_timeout, closed: AtomicBool::new(false) }
    }

    /// Returns a snapshot of the exporter's internal telemetry.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    fn add_point_at(&self, series: &str, point: Measurement, tags: &TagSet, timestamp: u64) {
        if self.closed.load(Ordering::Acquire) {
            debug!(transport = self.transport, series, "Sink closed, dropping point.");
            self.telemetry.track_point_dropped();
            return;
        }

        let pending =
            PendingPoint { series: series.to_string(), point, tags: tags.clone(), timestamp };

        match self.tx.try_send(Command::Point(pending)) {
            Ok(()) => self.telemetry.track_point_queued(),
            Err(TrySendError::Full(_)) => {
                warn!(transport = self.transport, series, "Submission queue full, dropping point.");
                self.telemetry.track_point_dropped();
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(transport = self.transport, series, "Forwarder stopped, dropping point.");
                self.telemetry.track_point_dropped();
            }
        }
    }
}

impl Sink for InfluxSink {
    fn add_point(&self, series: &str, point: Measurement, tags: &TagSet) {
        self.add_point_at(series, point, tags, now_nanos());
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send_timeout(Command::Close(ack_tx), self.close_timeout).is_err() {
            warn!(transport = self.transport, "Could not reach forwarder to close it.");
            return;
        }

        match ack_rx.recv_timeout(self.close_timeout) {
            Ok(()) => debug!(transport = self.transport, "Sink closed."),
            Err(RecvTimeoutError::Timeout) => warn!(
                transport = self.transport,
                timeout_ms = self.close_timeout.as_millis() as u64,
                "Timed out waiting for pending points to be flushed."
            ),
            Err(RecvTimeoutError::Disconnected) => {
                warn!(transport = self.transport, "Forwarder stopped before acknowledging close.")
            }
        }
    }
}

fn now_nanos() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use crossbeam_channel::bounded;
    use workerstat_core::{Measurement, Sink, TagSet};

    use super::InfluxSink;
    use crate::{forwarder::Command, telemetry::Telemetry};

    #[test]
    fn full_queue_drops_points() {
        let (tx, rx) = bounded(1);
        let sink = InfluxSink::new(tx, Arc::new(Telemetry::default()), "udp", Duration::from_millis(10));
        let tags = TagSet::from([("workerType", "ci")]);

        sink.add_point_at("taskStart", Measurement::scalar(1), &tags, 1);
        sink.add_point_at("taskStart", Measurement::scalar(2), &tags, 2);

        let telemetry = sink.telemetry();
        assert_eq!(telemetry.points_queued, 1);
        assert_eq!(telemetry.points_dropped, 1);

        match rx.try_recv() {
            Ok(Command::Point(pending)) => {
                assert_eq!(pending.series, "taskStart");
                assert_eq!(pending.point, Measurement::scalar(1));
                assert_eq!(pending.timestamp, 1);
            }
            _ => panic!("expected the first point to be queued"),
        }
    }

    #[test]
    fn close_is_idempotent() {
        let (tx, rx) = bounded(4);
        let sink = InfluxSink::new(tx, Arc::new(Telemetry::default()), "udp", Duration::from_millis(10));

        let handle = std::thread::spawn(move || {
            let mut closes = 0;
            while let Ok(command) = rx.recv() {
                if let Command::Close(ack) = command {
                    closes += 1;
                    let _ = ack.send(());
                }
            }
            closes
        });

        sink.close();
        sink.close();
        drop(sink);

        assert_eq!(handle.join().unwrap(), 1);
    }

    #[test]
    fn points_after_forwarder_stops_are_dropped() {
        let (tx, rx) = bounded(4);
        drop(rx);
        let sink = InfluxSink::new(tx, Arc::new(Telemetry::default()), "udp", Duration::from_millis(10));

        sink.add_point("workerStart", Measurement::scalar(1), &TagSet::default());
        sink.close();

        assert_eq!(sink.telemetry().points_dropped, 1);
        assert_eq!(sink.telemetry().points_queued, 0);
    }
}
