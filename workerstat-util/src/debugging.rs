use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use workerstat_core::{Measurement, Sink, TagSet};

/// A point captured by [`DebuggingSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedPoint {
    /// Series the point was reported for.
    pub series: String,

    /// The point itself.
    pub point: Measurement,

    /// Tags the point was reported with.
    pub tags: TagSet,
}

#[derive(Default)]
struct Inner {
    points: Mutex<Vec<CapturedPoint>>,
    closes: AtomicUsize,
}

/// Captures point-in-time snapshots of a `DebuggingSink`.
#[derive(Clone)]
pub struct Snapshotter {
    inner: Arc<Inner>,
}

impl Snapshotter {
    /// Takes a snapshot of every point captured so far, in the order they were added.
    pub fn snapshot(&self) -> Vec<CapturedPoint> {
        self.inner.points.lock().clone()
    }

    /// Takes every point captured so far, leaving the sink empty.
    pub fn drain(&self) -> Vec<CapturedPoint> {
        std::mem::take(&mut *self.inner.points.lock())
    }

    /// Gets the number of times the sink has been closed.
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::Acquire)
    }
}

/// A simplistic sink that keeps every point in memory, for debugging or testing.
///
/// Callers can take snapshots of the captured points at any time through a [`Snapshotter`].
#[derive(Clone, Default)]
pub struct DebuggingSink {
    inner: Arc<Inner>,
}

impl DebuggingSink {
    /// Creates a new `DebuggingSink`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a `Snapshotter` attached to this sink.
    pub fn snapshotter(&self) -> Snapshotter {
        Snapshotter { inner: Arc::clone(&self.inner) }
    }
}

impl Sink for DebuggingSink {
    fn add_point(&self, series: &str, point: Measurement, tags: &TagSet) {
        let captured = CapturedPoint { series: series.to_owned(), point, tags: tags.clone() };
        self.inner.points.lock().push(captured);
    }

    fn close(&self) {
        self.inner.closes.fetch_add(1, Ordering::AcqRel);
    }
}
