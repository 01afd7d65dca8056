use crate::ack_set::CompressedAckSet;
use crate::config::RudpConfig;
use crate::frame::Frame;
use crate::sender::AckReport;
use crate::sequence_number::SequenceNumber;
use crate::stats::ReceiverStats;
use crate::stream_queue::ByteStreamQueue;
use crate::transmit::DeliveryPath;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

/// A received Data frame waiting for its predecessors
#[derive(Debug)]
pub struct ReceiverFrame {
    pub sequence: SequenceNumber,
    pub payload: Bytes,
}

pub struct Receiver {
    config: Arc<RudpConfig>,

    /// the sequence number of the next frame to be appended to the reassembled stream
    expected_sequence: SequenceNumber,
    /// out-of-order frames, strictly increasing and all after `expected_sequence`
    receiver_window: VecDeque<ReceiverFrame>,
    reassembled_stream: ByteStreamQueue,
    /// received sequence numbers that were not acknowledged yet, unsorted and possibly duplicate
    pending_ack_sequences: Vec<SequenceNumber>,
    ack_coalesce_timer: f64,

    speed_window_start: Option<f64>,
    frames_in_speed_window: u32,
    recent_receive_speed: i32,

    data_frames_received: u64,
    duplicate_frames: u64,
    ack_frames_received: u64,
}

impl Receiver {
    pub fn new(config: Arc<RudpConfig>, start_sequence: SequenceNumber) -> Receiver {
        Receiver {
            config,
            expected_sequence: start_sequence,
            receiver_window: VecDeque::new(),
            reassembled_stream: ByteStreamQueue::new(),
            pending_ack_sequences: Vec::new(),
            ack_coalesce_timer: 0.0,
            speed_window_start: None,
            frames_in_speed_window: 0,
            recent_receive_speed: 0,
            data_frames_received: 0,
            duplicate_frames: 0,
            ack_frames_received: 0,
        }
    }

    pub fn expected_sequence(&self) -> SequenceNumber {
        self.expected_sequence
    }

    pub fn reassembled_stream(&mut self) -> &mut ByteStreamQueue {
        &mut self.reassembled_stream
    }

    /// Handles a frame from the peer. Data frames end up in the reassembled stream (eventually),
    ///  Ack frames are returned for the sender to process.
    pub fn process_received_frame(&mut self, frame: Frame, path: DeliveryPath, now: f64) -> Option<AckReport> {
        match frame {
            Frame::Data { sequence, payload } => {
                self.on_data_frame(sequence, payload, path, now);
                None
            }
            Frame::Ack { acked, expected_sequence, recent_receive_speed } => {
                self.ack_frames_received += 1;
                Some(AckReport {
                    acked,
                    expected_sequence,
                    recent_receive_speed,
                })
            }
        }
    }

    fn on_data_frame(&mut self, sequence: SequenceNumber, payload: Bytes, path: DeliveryPath, now: f64) {
        self.data_frames_received += 1;
        self.frames_in_speed_window = self.frames_in_speed_window.saturating_add(1);
        self.speed_window_start.get_or_insert(now);

        // stale duplicates are acknowledged again: the peer keeps re-sending until it gets an ack
        if !path.is_reliable() {
            self.pending_ack_sequences.push(sequence);
        }

        if sequence.is_before(&self.expected_sequence) {
            debug!("discarding stale frame #{}, expecting #{}", sequence, self.expected_sequence);
            self.duplicate_frames += 1;
            return;
        }

        let idx = self.receiver_window.partition_point(|f| f.sequence.is_before(&sequence));
        if self.receiver_window.get(idx).is_some_and(|f| f.sequence == sequence) {
            debug!("discarding duplicate frame #{}", sequence);
            self.duplicate_frames += 1;
            return;
        }

        trace!("buffering frame #{} with {} bytes", sequence, payload.len());
        self.receiver_window.insert(idx, ReceiverFrame { sequence, payload });
        self.flush_contiguous_frames();
    }

    fn flush_contiguous_frames(&mut self) {
        while self.receiver_window.front().is_some_and(|f| f.sequence == self.expected_sequence) {
            if let Some(frame) = self.receiver_window.pop_front() {
                trace!("appending frame #{} to the reassembled stream", frame.sequence);
                self.reassembled_stream.push_slice(&frame.payload);
                self.expected_sequence = self.expected_sequence.successor();
            }
        }
    }

    fn update_receive_speed(&mut self, now: f64) {
        let Some(start) = self.speed_window_start else {
            return;
        };

        let span = now - start;
        if span >= self.config.receive_speed_interval {
            // `as` saturates for out-of-range floats
            self.recent_receive_speed = (f64::from(self.frames_in_speed_window) / span).round() as i32;
            trace!("measured receive speed: {} frames/s", self.recent_receive_speed);
            self.frames_in_speed_window = 0;
            self.speed_window_start = Some(now);
        }
    }

    /// Returns the Ack frames that are due, if any
    pub fn tick(&mut self, elapsed: f64, now: f64) -> Vec<Frame> {
        self.update_receive_speed(now);

        if self.pending_ack_sequences.is_empty() {
            self.ack_coalesce_timer = 0.0;
            return Vec::new();
        }

        self.ack_coalesce_timer += elapsed;
        if self.ack_coalesce_timer < self.config.ack_coalesce_interval {
            return Vec::new();
        }
        self.ack_coalesce_timer = 0.0;

        let mut pending = std::mem::take(&mut self.pending_ack_sequences);

        // Ordering relative to a fixed origin is total (unlike pairwise wrap-around comparison),
        //  and it agrees with wrap-around order for everything within half the range of the
        //  expected sequence number
        let origin = self.expected_sequence.to_raw().wrapping_sub(u32::MAX / 2);
        pending.sort_by_key(|n| n.to_raw().wrapping_sub(origin));
        pending.dedup();

        CompressedAckSet::build_batches(&pending, self.config.max_acks_per_frame())
            .into_iter()
            .map(|acked| Frame::Ack {
                acked,
                expected_sequence: self.expected_sequence,
                recent_receive_speed: self.recent_receive_speed,
            })
            .collect()
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            expected_sequence: self.expected_sequence,
            receiver_window_len: self.receiver_window.len(),
            reassembled_bytes: self.reassembled_stream.len(),
            pending_acks: self.pending_ack_sequences.len(),
            data_frames_received: self.data_frames_received,
            duplicate_frames: self.duplicate_frames,
            ack_frames_received: self.ack_frames_received,
            recent_receive_speed: self.recent_receive_speed,
        }
    }
}
