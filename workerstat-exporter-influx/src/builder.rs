use std::{net::SocketAddr, sync::Arc, time::Duration};

use crossbeam_channel::bounded;
use thiserror::Error;

use crate::{
    forwarder::{self, ForwarderConfiguration, RemoteAddr},
    sink::InfluxSink,
    telemetry::Telemetry,
    writer::SMALLEST_VALID_POINT,
};

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MAX_PENDING_POINTS: usize = 250;
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_PAYLOAD_LEN: usize = 8192;
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Errors that could occur while building an InfluxDB sink.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the connection string.
    #[error("invalid connection string: {reason}")]
    InvalidConnectionString {
        /// Details about the parsing failure.
        reason: String,
    },

    /// An option was set to a value the exporter cannot work with.
    #[error("invalid exporter option: {reason}")]
    InvalidOption {
        /// Details about the invalid option.
        reason: String,
    },

    /// Failed to spawn the background forwarder thread.
    #[error("failed to spawn background thread for exporter")]
    Backend,
}

/// Builder for an InfluxDB sink.
pub struct InfluxBuilder {
    remote_addr: RemoteAddr,
    max_delay: Duration,
    max_pending_points: usize,
    write_timeout: Duration,
    close_timeout: Duration,
    max_payload_len: usize,
    buffer_size: usize,
}

impl InfluxBuilder {
    /// Creates a builder that forwards to the given connection string.
    ///
    /// See [`InfluxBuilder::with_connection_string`] for the accepted formats.
    ///
    /// # Errors
    ///
    /// If the connection string cannot be parsed, an error will be returned indicating the reason.
    pub fn from_connection_string<A>(connection_string: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        Self::default().with_connection_string(connection_string)
    }

    /// Set the connection string to forward points to.
    ///
    /// Two forms are accepted:
    ///
    /// - `udp://<host>:<port>`, which sends newline-delimited points in datagrams to an InfluxDB UDP
    ///   listener;
    /// - `http://[user[:password]@]<host>[:port]/<database>` (or `https://`), which posts batches of
    ///   points to the `/write` endpoint of the given database, using basic authentication when
    ///   credentials are present. This form requires the `http` feature.
    ///
    /// Defaults to `udp://127.0.0.1:8089`.
    ///
    /// # Errors
    ///
    /// If the connection string cannot be parsed, an error will be returned indicating the reason.
    pub fn with_connection_string<A>(mut self, connection_string: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(connection_string.as_ref())
            .map_err(|reason| BuildError::InvalidConnectionString { reason })?;
        Ok(self)
    }

    /// Set the maximum delay between flushes.
    ///
    /// Pending points are sent at least this often, even if the pending point limit has not been
    /// reached.
    ///
    /// A delay too large to represent as a deadline disables timed flushes entirely. The delay must not
    /// be zero.
    ///
    /// Defaults to 5 minutes.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the number of pending points that triggers an early flush.
    ///
    /// Defaults to 250.
    #[must_use]
    pub fn with_max_pending_points(mut self, max_pending_points: usize) -> Self {
        self.max_pending_points = max_pending_points;
        self
    }

    /// Set the write timeout for forwarding points.
    ///
    /// When the write timeout is reached, the write is aborted and the payload being sent at the time
    /// is dropped without retrying.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set how long closing the sink waits for pending points to be flushed.
    ///
    /// Defaults to 10 seconds.
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the maximum payload length for UDP datagrams.
    ///
    /// Points are packed into payloads no larger than this. A point that cannot fit in a payload on
    /// its own is dropped. This should be no larger than the read buffer of the InfluxDB UDP
    /// listener.
    ///
    /// Defaults to 8192 bytes.
    #[must_use]
    pub fn with_maximum_payload_length(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    /// Set the number of points that can be queued for the forwarder.
    ///
    /// When the queue is full, newly added points are dropped rather than blocking the caller.
    ///
    /// Defaults to 1024.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Builds the sink.
    ///
    /// A background OS thread is spawned to batch points and forward them to the remote server.
    ///
    /// # Errors
    ///
    /// If any option is out of range, or the background thread cannot be spawned, an error will be
    /// returned.
    pub fn build(self) -> Result<InfluxSink, BuildError> {
        if self.max_delay.is_zero() {
            return Err(BuildError::InvalidOption {
                reason: "maximum delay must be greater than zero".to_string(),
            });
        }
        if self.max_pending_points == 0 {
            return Err(BuildError::InvalidOption {
                reason: "maximum pending points must be at least 1".to_string(),
            });
        }
        if self.buffer_size == 0 {
            return Err(BuildError::InvalidOption {
                reason: "buffer size must be at least 1".to_string(),
            });
        }
        if self.max_payload_len < SMALLEST_VALID_POINT.len() {
            return Err(BuildError::InvalidOption {
                reason: format!(
                    "maximum payload length must be {} or greater",
                    SMALLEST_VALID_POINT.len()
                ),
            });
        }

        let (tx, rx) = bounded(self.buffer_size);
        let telemetry = Arc::new(Telemetry::default());
        let transport = self.remote_addr.transport_id();

        let forwarder_config = ForwarderConfiguration {
            remote_addr: self.remote_addr,
            max_payload_len: self.max_payload_len,
            max_delay: self.max_delay,
            max_pending_points: self.max_pending_points,
            write_timeout: self.write_timeout,
        };
        let forwarder = forwarder::sync::Forwarder::new(forwarder_config, rx, Arc::clone(&telemetry));

        std::thread::Builder::new()
            .name("workerstat-exporter-influx-forwarder".to_string())
            .spawn(move || forwarder.run())
            .map_err(|_| BuildError::Backend)?;

        Ok(InfluxSink::new(tx, telemetry, transport, self.close_timeout))
    }
}

impl Default for InfluxBuilder {
    fn default() -> Self {
        InfluxBuilder {
            remote_addr: RemoteAddr::Udp(vec![SocketAddr::from(([127, 0, 0, 1], 8089))]),
            max_delay: DEFAULT_MAX_DELAY,
            max_pending_points: DEFAULT_MAX_PENDING_POINTS,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}
