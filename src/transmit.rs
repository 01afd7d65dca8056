#[cfg(test)] use mockall::automock;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// This is the abstraction for handing a serialized frame to the network, introduced to keep
///  the protocol independent of socket mechanics and to facilitate mocking the I/O part away
///  for testing.
///
/// The owner decides which path the bytes take (direct datagram, or relayed through a server)
///  - the reliable transport only needs to know whether that path is reliable in itself, see
///  [DeliveryPath].
///
/// NB: A returned error is treated as a transient failure - frames are retained and re-sent
///      like lost frames
#[cfg_attr(test, automock)]
pub trait TransmitSink: Send + Sync + 'static {
    fn transmit(&self, frame_bytes: &[u8]) -> anyhow::Result<()>;
}

/// source of monotonic time, in seconds since some arbitrary but fixed point in time
#[cfg_attr(test, automock)]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> f64;
}

pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// The path frames currently take to the peer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum DeliveryPath {
    /// unreliable, unordered datagrams: frames are acknowledged and re-sent until they are
    #[default]
    Direct,
    /// relayed over a stream that guarantees delivery and order: frames are sent exactly once,
    ///  and there are no acks
    Relayed,
}

impl DeliveryPath {
    pub fn is_reliable(&self) -> bool {
        *self == DeliveryPath::Relayed
    }
}

/// Transmits frames as UDP datagrams to a fixed peer address
pub struct UdpTransmitSink {
    socket: Arc<UdpSocket>,
    peer_addr: SocketAddr,
}

impl UdpTransmitSink {
    pub fn new(socket: Arc<UdpSocket>, peer_addr: SocketAddr) -> UdpTransmitSink {
        UdpTransmitSink { socket, peer_addr }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl TransmitSink for UdpTransmitSink {
    fn transmit(&self, frame_bytes: &[u8]) -> anyhow::Result<()> {
        trace!("UDP socket: sending {} bytes to {:?}", frame_bytes.len(), self.peer_addr);
        self.socket.send_to(frame_bytes, self.peer_addr)?;
        Ok(())
    }
}
