use crate::config::RudpConfig;
use crate::frame::Frame;
use crate::message_framing::{self, FramingError};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::sequence_number::SequenceNumber;
use crate::stats::ReliableTransportStats;
use crate::stream_queue::ByteStreamQueue;
use crate::transmit::{Clock, DeliveryPath, TransmitSink};
use anyhow::bail;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The reliable channel to a single peer: it owns the sending and the receiving side and
///  mediates between them, forwarding acks that arrive at the receiving side to the sender.
///
/// Both peers must start at the same sequence number - there is no handshake, the host is
///  usable right away. All calls are expected to come from a single owner (typically the
///  connection), driven by a periodic [ReliableTransportHost::tick].
pub struct ReliableTransportHost {
    config: Arc<RudpConfig>,
    sender: Sender,
    receiver: Receiver,
    sink: Arc<dyn TransmitSink>,
    clock: Arc<dyn Clock>,
    path: DeliveryPath,
}

impl ReliableTransportHost {
    pub fn new(
        config: Arc<RudpConfig>,
        start_sequence: SequenceNumber,
        sink: Arc<dyn TransmitSink>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<ReliableTransportHost> {
        config.validate()?;

        debug!("initializing reliable transport at sequence number {}", start_sequence);
        Ok(ReliableTransportHost {
            sender: Sender::new(config.clone(), start_sequence),
            receiver: Receiver::new(config.clone(), start_sequence),
            config,
            sink,
            clock,
            path: DeliveryPath::Direct,
        })
    }

    pub fn config(&self) -> &RudpConfig {
        &self.config
    }

    /// Appends bytes to the outgoing stream, to be transmitted by a later tick
    pub fn send(&mut self, data: &[u8]) {
        self.sender.send(data);
    }

    /// Sends an application message in the framing layer's format, to be extracted on the peer's
    ///  side by [ReliableTransportHost::extract_messages].
    pub fn send_message(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        if payload.len() > self.config.max_message_len {
            bail!("message length {} exceeds the maximum of {}", payload.len(), self.config.max_message_len);
        }

        let mut buf = BytesMut::with_capacity(payload.len() + 7);
        message_framing::write_message(&mut buf, payload);
        self.sender.send(&buf);
        Ok(())
    }

    pub fn take_received_frame(&mut self, frame: Frame) {
        let now = self.clock.now();
        if let Some(ack_report) = self.receiver.process_received_frame(frame, self.path, now) {
            self.sender.on_ack_report(&ack_report, now);
        }
    }

    /// Decodes and handles a datagram from the peer. A malformed datagram is a protocol
    ///  violation, and the owner should terminate the connection.
    pub fn take_received_datagram(&mut self, datagram: &[u8]) -> anyhow::Result<()> {
        let frame = match Frame::decode(datagram, &self.config) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("received malformed frame: {}", e);
                return Err(e);
            }
        };
        trace!("received {:?}", frame);
        self.take_received_frame(frame);
        Ok(())
    }

    /// The receiving side goes first so that acks produced in this tick are sent right away
    pub fn tick(&mut self, elapsed: f64) {
        let now = self.clock.now();
        let acks = self.receiver.tick(elapsed, now);
        self.sender.enqueue_acks(acks);
        self.sender.tick(elapsed, now, self.path, self.sink.as_ref());
    }

    /// Cuts all pending bytes into frames without waiting for the coalescing interval. They are
    ///  transmitted by the next tick.
    pub fn flush(&mut self) {
        self.sender.conditional_cut_stream_into_frames(true);
    }

    pub fn reassembled_stream(&mut self) -> &mut ByteStreamQueue {
        self.receiver.reassembled_stream()
    }

    /// Extracts all complete messages from the reassembled stream and removes them from it,
    ///  returning the number of extracted messages. After an error, the stream is corrupted and
    ///  the connection should be terminated.
    pub fn extract_messages(&mut self, out: &mut Vec<Bytes>) -> Result<usize, FramingError> {
        let num_before = out.len();
        let stream = self.receiver.reassembled_stream();

        match message_framing::extract_messages(stream.as_slice(), self.config.max_message_len, out) {
            Ok(consumed) => {
                stream.pop_front(consumed);
                Ok(out.len() - num_before)
            }
            Err(e) => {
                warn!("corrupted message stream: {}", e);
                stream.pop_front(e.consumed());
                Err(e)
            }
        }
    }

    pub fn delivery_path(&self) -> DeliveryPath {
        self.path
    }

    pub fn set_delivery_path(&mut self, path: DeliveryPath) {
        if path != self.path {
            debug!("switching delivery path from {:?} to {:?}", self.path, path);
            self.path = path;
        }
    }

    /// Seconds since the oldest unacknowledged frame was first sent. This grows as long as the
    ///  peer does not acknowledge, and it is up to the owner to decide when that is a timeout.
    pub fn longest_pending_resend_age(&self) -> f64 {
        self.sender.longest_pending_resend_age(self.clock.now())
    }

    pub fn stats(&self) -> ReliableTransportStats {
        ReliableTransportStats {
            sender: self.sender.stats(),
            receiver: self.receiver.stats(),
            longest_pending_resend_age: self.longest_pending_resend_age(),
        }
    }

    /// Releases the host. Unacknowledged frames and unread bytes are discarded.
    pub fn dispose(self) {
        debug!("disposing reliable transport with {} unacknowledged frames and {} unread bytes",
            self.sender.num_pending_frames(), self.receiver.stats().reassembled_bytes);
    }
}
