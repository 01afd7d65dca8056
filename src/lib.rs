//! A reliable, ordered byte stream between two peers on top of an unreliable, unordered datagram
//!  channel, plus a message framing layer that slices the byte stream into application messages.
//!
//! ## Design goals
//!
//! * Designed for small peer groups with latency sensitive traffic (games, interactive
//!    applications), not for bulk throughput
//! * Application bytes are delivered exactly once and in order, regardless of datagram loss,
//!    reordering or duplication
//! * Small writes are coalesced into shared frames for a short, configurable interval
//! * Lost frames are re-sent with bounded exponential backoff, and the number of resends per
//!    second is limited based on the peer's reported receive speed
//! * Acknowledgements are collected for a short interval and sent as compact ranges, with
//!    priority over data
//! * There is no handshake: both peers start at an agreed sequence number, and the channel is
//!    usable right away
//! * Frames can go directly (UDP) or through a relay that guarantees delivery and order. On a
//!    relay path, there are no acks and no resends
//! * The protocol is driven by a periodic tick from the owner. There are no internal threads or
//!    timers, and no call blocks
//! * The protocol does not declare a peer dead - it exposes the age of the oldest
//!    unacknowledged frame, and the owner decides about timeouts
//!
//! Socket handling, encryption, peer discovery and session management are out of scope: the
//!  owner provides a [transmit::TransmitSink] for outgoing frames and passes incoming datagrams
//!  to [host::ReliableTransportHost::take_received_datagram].
//!
//! ## Sequence numbers
//!
//! Every Data frame has a 32 bit sequence number, incremented for each frame. Sequence numbers
//!  wrap around, so they are compared with 'half range' semantics: `a` comes after `b` if
//!  `a - b` (wrapping) is in the lower half of the number range. The peers' sequence numbers
//!  are independent of each other.
//!
//! ## Frames
//!
//! Each datagram contains a single frame, see [frame::Frame] for the wire format:
//!
//! * **Data** frames carry a sequence number and a chunk of the sender's byte stream
//! * **Ack** frames carry a set of received sequence numbers (compressed into ranges), the
//!    receiver's next expected sequence number and the receiver's recent receive speed
//!
//! ## Sending
//!
//! The sender collects application bytes in a stream queue. Full frames are cut right away,
//!  a remainder after the stream coalescing interval. New frames are transmitted once and then
//!  kept until they are acknowledged, either by an explicit ack entry or by the peer's expected
//!  sequence number passing them. The latter compensates for lost acks.
//!
//! A frame is re-sent after its resend cooldown, which starts at `first_resend_cooldown` and is
//!  doubled with every resend up to `max_resend_cooldown`. Resends draw from a budget that is
//!  refilled at the peer's reported receive speed, limited to `min_resend_rate` and
//!  `max_resend_rate`.
//!
//! ## Receiving
//!
//! The receiver appends frames to the reassembled stream strictly in sequence. Frames arriving
//!  ahead of a gap are buffered until the gap is filled, duplicates are discarded. Every
//!  received sequence number is acknowledged, including stale duplicates: their arrival means
//!  that the sender did not get the ack.
//!
//! ## Messages
//!
//! The framing layer ([message_framing]) writes each message as a marker, the payload length
//!  and the payload. A wrong marker or an oversized length means that the stream is corrupted,
//!  and there is no way to recover from that.
//!
//! ```ascii
//! 0: marker (u16) = 0x5713
//! 2: payload length (varint)
//! *: payload
//! ```

pub mod sequence_number;
pub mod ack_set;
pub mod stream_queue;
pub mod frame;
pub mod config;
pub mod transmit;
pub mod sender;
pub mod receiver;
pub mod host;
pub mod message_framing;
pub mod peer_table;
pub mod stats;
pub mod safe_converter;
pub mod test_util;
