use std::sync::Arc;

use tracing::debug;

use crate::{Measurement, TagSet};

/// Log target used by [`LogSink`].
pub const STATS_TARGET: &str = "workerstat::stats";

/// A destination for data points.
///
/// This is the capability that the facade forwards every point to. Implementations must be safe to
/// call from many threads at once, and must never fail loudly: transmission problems are the sink's
/// own concern, and should at most be logged.
pub trait Sink {
    /// Accepts one point for the given series.
    ///
    /// This is fire-and-forget. Implementations may buffer, batch, or drop the point.
    fn add_point(&self, series: &str, point: Measurement, tags: &TagSet);

    /// Releases any resources held by the sink, flushing buffered points where possible.
    ///
    /// Whether calling this more than once is safe is up to the implementation.
    fn close(&self);
}

/// A sink that can be shared across threads.
pub type SharedSink = Arc<dyn Sink + Send + Sync>;

macro_rules! impl_sink {
    ($inner_ty:ident, $ptr_ty:ty) => {
        impl<$inner_ty> $crate::Sink for $ptr_ty
        where
            $inner_ty: $crate::Sink + ?Sized,
        {
            fn add_point(&self, series: &str, point: $crate::Measurement, tags: &$crate::TagSet) {
                std::ops::Deref::deref(self).add_point(series, point, tags)
            }

            fn close(&self) {
                std::ops::Deref::deref(self).close()
            }
        }
    };
}

impl_sink!(T, &T);
impl_sink!(T, std::boxed::Box<T>);
impl_sink!(T, std::sync::Arc<T>);

/// A sink that only logs.
///
/// Used when no backend is configured, so that a worker without a metrics backend still starts and
/// runs normally. Every point is logged at the debug level under the [`STATS_TARGET`] target, and
/// closing does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn add_point(&self, series: &str, point: Measurement, tags: &TagSet) {
        debug!(target: STATS_TARGET, series, %point, %tags, "stats");
    }

    fn close(&self) {}
}
