use std::{
    io,
    net::{Ipv4Addr, UdpSocket},
    sync::Arc,
    time::Instant,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, trace};

use crate::{
    telemetry::{Telemetry, TelemetryUpdate},
    writer::{PayloadWriter, WriteResult},
};

#[cfg(feature = "http")]
use super::http::HttpClient;
use super::{Command, ForwarderConfiguration, PendingPoint, RemoteAddr};

enum Client {
    Udp(UdpSocket),

    #[cfg(feature = "http")]
    Http(HttpClient),
}

impl Client {
    fn from_forwarder_config(config: &ForwarderConfiguration) -> io::Result<Self> {
        match &config.remote_addr {
            RemoteAddr::Udp(addrs) => {
                UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).and_then(|socket| {
                    socket.connect(&addrs[..])?;
                    socket.set_write_timeout(Some(config.write_timeout))?;
                    Ok(Client::Udp(socket))
                })
            }

            #[cfg(feature = "http")]
            RemoteAddr::Http(endpoint) => {
                HttpClient::new(endpoint, config.write_timeout).map(Client::Http)
            }
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Client::Udp(socket) => socket.send(buf),

            #[cfg(feature = "http")]
            Client::Http(client) => client.send(buf),
        }
    }
}

enum ClientState {
    // Intermediate state during send attempts.
    Inconsistent,

    // Forwarder is currently disconnected.
    Disconnected(ForwarderConfiguration),

    // Forwarder is connected and ready to send points.
    Ready(ForwarderConfiguration, Client),
}

impl ClientState {
    fn try_send(&mut self, payload: &[u8]) -> io::Result<usize> {
        loop {
            let old_state = std::mem::replace(self, ClientState::Inconsistent);
            match old_state {
                ClientState::Inconsistent => unreachable!("transitioned _from_ inconsistent state"),
                ClientState::Disconnected(config) => match Client::from_forwarder_config(&config) {
                    Ok(client) => *self = ClientState::Ready(config, client),
                    Err(e) => {
                        *self = ClientState::Disconnected(config);
                        return Err(e);
                    }
                },
                ClientState::Ready(config, mut client) => {
                    let result = client.send(payload);
                    if result.is_ok() {
                        *self = ClientState::Ready(config, client);
                    } else {
                        *self = ClientState::Disconnected(config);
                    }

                    return result;
                }
            };
        }
    }
}

pub(crate) struct Forwarder {
    client_state: ClientState,
    config: ForwarderConfiguration,
    rx: Receiver<Command>,
    telemetry: Arc<Telemetry>,
}

impl Forwarder {
    /// Create a new synchronous `Forwarder`.
    pub fn new(
        config: ForwarderConfiguration,
        rx: Receiver<Command>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Forwarder { client_state: ClientState::Disconnected(config.clone()), config, rx, telemetry }
    }

    /// Run the forwarder until the sink is closed or dropped.
    ///
    /// Points are buffered until the maximum delay has elapsed since the last flush, or until the
    /// maximum number of pending points is reached, whichever comes first.
    pub fn run(mut self) {
        let mut writer = PayloadWriter::new(self.config.payload_limit());
        let mut update = TelemetryUpdate::default();
        let transport = self.config.remote_addr.transport_id();

        let mut next_flush = self.next_flush();
        loop {
            let command = match next_flush {
                Some(deadline) => self.rx.recv_deadline(deadline),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match command {
                Ok(Command::Point(pending)) => {
                    self.write(&mut writer, &pending, &mut update);

                    if writer.pending_points() >= self.config.max_pending_points as u64 {
                        trace!(transport, "Pending point limit reached, flushing early.");
                        self.flush(&mut writer, &mut update);
                        next_flush = self.next_flush();
                    }
                }
                Ok(Command::Close(ack)) => {
                    // Points queued alongside the close request still go out in the final flush.
                    for command in self.rx.try_iter() {
                        match command {
                            Command::Point(pending) => self.write(&mut writer, &pending, &mut update),
                            Command::Close(other) => {
                                let _ = other.send(());
                            }
                        }
                    }

                    self.flush(&mut writer, &mut update);
                    let _ = ack.send(());

                    let late = self.discard_queued();
                    debug!(transport, late_points = late, "Forwarder closed.");
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.flush(&mut writer, &mut update);
                    next_flush = self.next_flush();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.flush(&mut writer, &mut update);
                    debug!(transport, "Sink dropped, forwarder stopping.");
                    return;
                }
            }
        }
    }

    // `None` when the delay is too large to represent as a deadline, in which case only the pending
    // point limit and closing the sink trigger a flush.
    fn next_flush(&self) -> Option<Instant> {
        Instant::now().checked_add(self.config.max_delay)
    }

    // Drops points that raced past the sink's closed check after the final flush.
    fn discard_queued(&self) -> u64 {
        let mut dropped = 0;
        for command in self.rx.try_iter() {
            match command {
                Command::Point(_) => {
                    self.telemetry.track_point_dropped();
                    dropped += 1;
                }
                Command::Close(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        dropped
    }

    fn write(&self, writer: &mut PayloadWriter, pending: &PendingPoint, update: &mut TelemetryUpdate) {
        match writer.write_point(&pending.series, &pending.point, &pending.tags, pending.timestamp) {
            WriteResult::Written => {}
            WriteResult::Invalid => {
                error!(series = %pending.series, "Point has no representable fields, dropping.");
                update.track_point_dropped();
            }
            WriteResult::TooLarge => {
                error!(
                    series = %pending.series,
                    max_payload_len = self.config.payload_limit(),
                    "Point exceeds maximum payload length, dropping."
                );
                update.track_point_dropped();
            }
        }
    }

    fn flush(&mut self, writer: &mut PayloadWriter, update: &mut TelemetryUpdate) {
        let mut payloads = writer.payloads();
        let num_payloads = payloads.len();

        let mut payloads_sent = 0;
        let mut payloads_dropped = 0;

        while let Some(payload) = payloads.next_payload() {
            if let Err(e) = self.client_state.try_send(payload.data) {
                error!(error = %e, points = payload.points, "Failed to send payload.");
                update.track_payload_send_failed(payload.points);
                payloads_dropped += 1;
            } else {
                update.track_payload_send_succeeded(payload.points, payload.data.len());
                payloads_sent += 1;
            }
        }

        if num_payloads > 0 {
            debug!(payloads_sent, payloads_dropped, "Finished sending payloads.");
        }

        self.telemetry.apply_update(update);
        update.clear();
    }
}
