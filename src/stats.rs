use crate::sequence_number::SequenceNumber;

/// Counters and gauges of a [crate::host::ReliableTransportHost]'s sender side, intended for
///  monitoring and for the owner's timeout / backpressure policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SenderStats {
    pub next_sequence: SequenceNumber,
    /// application bytes that were not cut into frames yet
    pub unsent_stream_bytes: usize,
    pub first_send_window_len: usize,
    pub resend_window_len: usize,
    pub frames_sent: u64,
    pub frames_resent: u64,
    pub ack_frames_sent: u64,
    pub transmit_failures: u64,
    /// resends that were deferred because the resend budget was exhausted
    pub resends_rate_limited: u64,
    pub remote_receive_speed_estimate: f64,
    pub last_received_ack_sequence: Option<SequenceNumber>,
    pub last_received_ack_time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverStats {
    pub expected_sequence: SequenceNumber,
    /// out-of-order frames waiting for their predecessors
    pub receiver_window_len: usize,
    pub reassembled_bytes: usize,
    pub pending_acks: usize,
    pub data_frames_received: u64,
    pub duplicate_frames: u64,
    pub ack_frames_received: u64,
    pub recent_receive_speed: i32,
}

/// A snapshot of a host's state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReliableTransportStats {
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    /// seconds since the oldest unacknowledged frame was first sent, 0 if there is none
    pub longest_pending_resend_age: f64,
}
