use std::{
    net::{SocketAddr, ToSocketAddrs as _},
    time::Duration,
};

use crossbeam_channel::Sender;
use workerstat_core::{Measurement, TagSet};

#[cfg(feature = "http")]
pub mod http;
pub mod sync;

// Payload bound for HTTP writes. Much larger than a datagram, but still small enough that a backlog
// of points does not turn into a single huge request.
#[cfg(feature = "http")]
const HTTP_MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Where, and how, points are sent.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RemoteAddr {
    Udp(Vec<SocketAddr>),

    #[cfg(feature = "http")]
    Http(http::HttpEndpoint),
}

impl RemoteAddr {
    /// Returns the transport ID for the remote address.
    pub const fn transport_id(&self) -> &'static str {
        match self {
            RemoteAddr::Udp(_) => "udp",
            #[cfg(feature = "http")]
            RemoteAddr::Http(_) => "http",
        }
    }
}

impl<'a> TryFrom<&'a str> for RemoteAddr {
    type Error = String;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        let (scheme, rest) = addr
            .split_once("://")
            .ok_or_else(|| format!("missing scheme in '{addr}' (expected 'udp', 'http' or 'https')"))?;

        match scheme {
            "udp" => {
                let rest = rest.trim_end_matches('/');
                match rest.to_socket_addrs() {
                    Ok(addrs) => {
                        let addrs: Vec<_> = addrs.collect();
                        if addrs.is_empty() {
                            Err(format!("'{rest}' did not resolve to any address"))
                        } else {
                            Ok(RemoteAddr::Udp(addrs))
                        }
                    }
                    Err(e) => Err(e.to_string()),
                }
            }

            #[cfg(feature = "http")]
            "http" | "https" => http::HttpEndpoint::parse(scheme, rest).map(RemoteAddr::Http),

            #[cfg(not(feature = "http"))]
            "http" | "https" => Err(format!("scheme '{scheme}' requires the 'http' feature")),

            _ => Err(format!("invalid scheme '{scheme}' (expected 'udp', 'http' or 'https')")),
        }
    }
}

/// A point waiting to be written.
pub(crate) struct PendingPoint {
    pub series: String,
    pub point: Measurement,
    pub tags: TagSet,
    pub timestamp: u64,
}

/// Messages from the sink to the forwarder.
pub(crate) enum Command {
    Point(PendingPoint),

    // Flush everything pending, acknowledge, and stop.
    Close(Sender<()>),
}

/// Forwarder configuration.
#[derive(Clone)]
pub(crate) struct ForwarderConfiguration {
    pub remote_addr: RemoteAddr,
    pub max_payload_len: usize,
    pub max_delay: Duration,
    pub max_pending_points: usize,
    pub write_timeout: Duration,
}

impl ForwarderConfiguration {
    /// Returns the maximum length of a single payload for the configured transport.
    pub fn payload_limit(&self) -> usize {
        match self.remote_addr {
            RemoteAddr::Udp(_) => self.max_payload_len,
            #[cfg(feature = "http")]
            RemoteAddr::Http(_) => HTTP_MAX_PAYLOAD_LEN.max(self.max_payload_len),
        }
    }
}
