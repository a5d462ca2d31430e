use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time copy of the exporter's internal telemetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Points accepted into the submission queue.
    pub points_queued: u64,

    /// Points dropped: because the queue was full or closed, because they could not be expressed in
    /// the line protocol, or because the payload carrying them failed to send.
    pub points_dropped: u64,

    /// Points in payloads that were sent successfully.
    pub points_written: u64,

    /// Payloads sent successfully.
    pub payloads_sent: u64,

    /// Payloads that failed to send.
    pub payloads_failed: u64,

    /// Bytes sent successfully.
    pub bytes_sent: u64,
}

/// Exporter telemetry.
///
/// Shared between the sink, which counts points as they are queued, and the forwarder, which applies
/// a [`TelemetryUpdate`] after every flush.
#[derive(Default)]
pub(crate) struct Telemetry {
    points_queued: AtomicU64,
    points_dropped: AtomicU64,
    points_written: AtomicU64,
    payloads_sent: AtomicU64,
    payloads_failed: AtomicU64,
    bytes_sent: AtomicU64,
}

impl Telemetry {
    pub fn track_point_queued(&self) {
        self.points_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_point_dropped(&self) {
        self.points_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Applies the given telemetry update.
    pub fn apply_update(&self, update: &TelemetryUpdate) {
        self.points_dropped.fetch_add(update.points_dropped, Ordering::Relaxed);
        self.points_written.fetch_add(update.points_written, Ordering::Relaxed);
        self.payloads_sent.fetch_add(update.payloads_sent, Ordering::Relaxed);
        self.payloads_failed.fetch_add(update.payloads_failed, Ordering::Relaxed);
        self.bytes_sent.fetch_add(update.bytes_sent, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            points_queued: self.points_queued.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            payloads_sent: self.payloads_sent.load(Ordering::Relaxed),
            payloads_failed: self.payloads_failed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// A buffer for collecting telemetry updates during a flush.
#[derive(Default)]
pub(crate) struct TelemetryUpdate {
    points_dropped: u64,
    points_written: u64,
    payloads_sent: u64,
    payloads_failed: u64,
    bytes_sent: u64,
}

impl TelemetryUpdate {
    /// Clears the update buffer, resetting it back to an empty state.
    pub fn clear(&mut self) {
        *self = TelemetryUpdate::default();
    }

    /// Tracks a point that was dropped before it made it into a payload.
    pub fn track_point_dropped(&mut self) {
        self.points_dropped += 1;
    }

    /// Tracks a successful payload send.
    pub fn track_payload_send_succeeded(&mut self, points: u64, bytes_len: usize) {
        self.payloads_sent += 1;
        self.points_written += points;
        self.bytes_sent += bytes_len as u64;
    }

    /// Tracks a failed payload send.
    pub fn track_payload_send_failed(&mut self, points: u64) {
        self.payloads_failed += 1;
        self.points_dropped += points;
    }
}

#[cfg(test)]
mod tests {
    use super::{Telemetry, TelemetrySnapshot, TelemetryUpdate};

    #[test]
    fn updates_accumulate() {
        let telemetry = Telemetry::default();
        telemetry.track_point_queued();
        telemetry.track_point_queued();
        telemetry.track_point_queued();
        telemetry.track_point_dropped();

        let mut update = TelemetryUpdate::default();
        update.track_payload_send_succeeded(1, 40);
        update.track_payload_send_failed(1);
        telemetry.apply_update(&update);

        update.clear();
        telemetry.apply_update(&update);

        assert_eq!(
            telemetry.snapshot(),
            TelemetrySnapshot {
                points_queued: 3,
                points_dropped: 2,
                points_written: 1,
                payloads_sent: 1,
                payloads_failed: 1,
                bytes_sent: 40,
            }
        );
    }
}
