use crate::ack_set::{AckRange, CompressedAckSet};
use crate::config::RudpConfig;
use crate::frame::Frame;
use crate::sequence_number::SequenceNumber;
use crate::stats::SenderStats;
use crate::stream_queue::ByteStreamQueue;
use crate::transmit::{DeliveryPath, TransmitSink};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

/// A frame cut from the outgoing stream, together with its retransmission state
#[derive(Debug)]
pub struct SenderFrame {
    pub sequence: SequenceNumber,
    pub payload: Bytes,
    pub first_send_time: f64,
    pub last_send_time: f64,
    pub resend_cooldown: f64,
    pub resend_count: u32,
}

impl SenderFrame {
    fn to_bytes(&self) -> Bytes {
        Frame::Data {
            sequence: self.sequence,
            payload: self.payload.clone(),
        }.to_bytes()
    }
}

/// The content of an Ack frame as it is handed from the receiving side to the sender
#[derive(Debug, Clone, PartialEq)]
pub struct AckReport {
    pub acked: CompressedAckSet,
    pub expected_sequence: SequenceNumber,
    pub recent_receive_speed: i32,
}

pub struct Sender {
    config: Arc<RudpConfig>,

    stream_queue: ByteStreamQueue,
    /// frames that were cut from the stream but not transmitted yet
    first_send_window: VecDeque<SenderFrame>,
    /// frames that were transmitted at least once and wait for their ack, ordered by sequence
    resend_window: VecDeque<SenderFrame>,
    /// ack frames produced by the receiving side, sent with priority over data
    outgoing_acks: VecDeque<Frame>,

    next_sequence: SequenceNumber,
    remote_receive_speed_estimate: f64,
    last_received_ack_sequence: Option<SequenceNumber>,
    last_received_ack_time: Option<f64>,

    /// time that bytes have been waiting in the stream queue without filling a frame
    stream_coalesce_timer: f64,
    /// number of resends that may currently be performed
    resend_budget: f64,

    frames_sent: u64,
    frames_resent: u64,
    ack_frames_sent: u64,
    transmit_failures: u64,
    resends_rate_limited: u64,
}

impl Sender {
    pub fn new(config: Arc<RudpConfig>, start_sequence: SequenceNumber) -> Sender {
        let initial_speed = config.min_resend_rate;
        Sender {
            config,
            stream_queue: ByteStreamQueue::new(),
            first_send_window: VecDeque::new(),
            resend_window: VecDeque::new(),
            outgoing_acks: VecDeque::new(),
            next_sequence: start_sequence,
            remote_receive_speed_estimate: initial_speed,
            last_received_ack_sequence: None,
            last_received_ack_time: None,
            stream_coalesce_timer: 0.0,
            resend_budget: initial_speed,
            frames_sent: 0,
            frames_resent: 0,
            ack_frames_sent: 0,
            transmit_failures: 0,
            resends_rate_limited: 0,
        }
    }

    /// Appends bytes to the outgoing stream. Nothing is transmitted before the next tick.
    pub fn send(&mut self, data: &[u8]) {
        self.stream_queue.push_slice(data);
    }

    pub fn next_sequence(&self) -> SequenceNumber {
        self.next_sequence
    }

    /// Cuts full frames from the stream queue, and with `force` also a final partial frame.
    pub fn conditional_cut_stream_into_frames(&mut self, force: bool) {
        let max_payload_len = self.config.max_frame_payload_len();

        while self.stream_queue.len() >= max_payload_len || (force && !self.stream_queue.is_empty()) {
            let payload = self.stream_queue.take_front(max_payload_len);
            trace!("cutting frame #{} with {} bytes", self.next_sequence, payload.len());

            self.first_send_window.push_back(SenderFrame {
                sequence: self.next_sequence,
                payload,
                first_send_time: 0.0,
                last_send_time: 0.0,
                resend_cooldown: self.config.first_resend_cooldown,
                resend_count: 0,
            });
            self.next_sequence = self.next_sequence.successor();
        }
    }

    pub fn enqueue_acks(&mut self, acks: Vec<Frame>) {
        self.outgoing_acks.extend(acks);
    }

    /// NB: This function does not return Result - a failed transmission is treated like a lost
    ///      datagram, and the frame is re-sent by a later tick
    pub fn tick(&mut self, elapsed: f64, now: f64, path: DeliveryPath, sink: &dyn TransmitSink) {
        self.cut_with_coalescing(elapsed);
        self.transmit_acks(sink);
        self.transmit_first_sends(now, path, sink);
        self.refill_resend_budget(elapsed);
        match path {
            DeliveryPath::Direct => self.do_resends(now, sink),
            DeliveryPath::Relayed => self.hand_over_to_relay(now, sink),
        }
    }

    fn cut_with_coalescing(&mut self, elapsed: f64) {
        self.conditional_cut_stream_into_frames(false);

        if self.stream_queue.is_empty() {
            self.stream_coalesce_timer = 0.0;
            return;
        }

        self.stream_coalesce_timer += elapsed;
        if self.stream_coalesce_timer >= self.config.stream_coalesce_interval {
            self.conditional_cut_stream_into_frames(true);
            self.stream_coalesce_timer = 0.0;
        }
    }

    fn transmit(&mut self, frame_bytes: &[u8], sink: &dyn TransmitSink) -> bool {
        match sink.transmit(frame_bytes) {
            Ok(()) => true,
            Err(e) => {
                debug!("error transmitting frame, will be retried: {}", e);
                self.transmit_failures += 1;
                false
            }
        }
    }

    fn transmit_acks(&mut self, sink: &dyn TransmitSink) {
        while let Some(ack) = self.outgoing_acks.pop_front() {
            trace!("sending {:?}", ack);
            // a lost ack is compensated by the peer's resend and the re-ack of duplicates
            if self.transmit(&ack.to_bytes(), sink) {
                self.ack_frames_sent += 1;
            }
        }
    }

    fn transmit_first_sends(&mut self, now: f64, path: DeliveryPath, sink: &dyn TransmitSink) {
        while let Some(mut frame) = self.first_send_window.pop_front() {
            trace!("sending frame #{} ({} bytes) via {:?}", frame.sequence, frame.payload.len(), path);
            let success = self.transmit(&frame.to_bytes(), sink);
            if success {
                self.frames_sent += 1;
            }

            frame.first_send_time = now;
            frame.last_send_time = now;
            if !success || !path.is_reliable() {
                self.resend_window.push_back(frame);
            }
        }
    }

    fn refill_resend_budget(&mut self, elapsed: f64) {
        let rate = self.remote_receive_speed_estimate
            .clamp(self.config.min_resend_rate, self.config.max_resend_rate);
        self.resend_budget = (self.resend_budget + rate * elapsed)
            .min(rate.max(1.0));
    }

    fn do_resends(&mut self, now: f64, sink: &dyn TransmitSink) {
        for frame in self.resend_window.iter_mut() {
            if now - frame.last_send_time < frame.resend_cooldown {
                continue;
            }
            if self.resend_budget < 1.0 {
                self.resends_rate_limited += 1;
                continue;
            }
            self.resend_budget -= 1.0;

            trace!("re-sending frame #{} (resend #{})", frame.sequence, frame.resend_count + 1);
            match sink.transmit(&frame.to_bytes()) {
                Ok(()) => self.frames_resent += 1,
                Err(e) => {
                    debug!("error re-sending frame #{}: {}", frame.sequence, e);
                    self.transmit_failures += 1;
                }
            }

            frame.resend_count += 1;
            frame.last_send_time = now;
            frame.resend_cooldown = (2.0 * frame.resend_cooldown).min(self.config.max_resend_cooldown);
        }
    }

    /// Frames that are still waiting for an ack when the path becomes reliable are sent over it
    ///  once more and released: neither acks nor resends happen on a reliable path.
    fn hand_over_to_relay(&mut self, now: f64, sink: &dyn TransmitSink) {
        if self.resend_window.is_empty() {
            return;
        }
        debug!("handing {} unacknowledged frames over to the relay path", self.resend_window.len());

        let mut remaining = VecDeque::new();
        while let Some(mut frame) = self.resend_window.pop_front() {
            if self.transmit(&frame.to_bytes(), sink) {
                self.frames_resent += 1;
            }
            else {
                frame.last_send_time = now;
                remaining.push_back(frame);
            }
        }
        self.resend_window = remaining;
    }

    /// Removes the frame with the given sequence number from whichever window holds it. This is
    ///  a no-op if there is no such frame.
    pub fn remove_from_window(&mut self, sequence: SequenceNumber) {
        let idx = self.resend_window.partition_point(|f| f.sequence.is_before(&sequence));
        if self.resend_window.get(idx).is_some_and(|f| f.sequence == sequence) {
            trace!("frame #{} acknowledged", sequence);
            self.resend_window.remove(idx);
            return;
        }

        if let Some(idx) = self.first_send_window.iter().position(|f| f.sequence == sequence) {
            self.first_send_window.remove(idx);
        }
    }

    fn remove_range_from_window(&mut self, range: &AckRange) {
        self.resend_window.retain(|f| !range.contains(f.sequence));
        self.first_send_window.retain(|f| !range.contains(f.sequence));
    }

    /// Removes all frames before `expected_sequence`: the peer received them, even if their
    ///  individual acks were lost.
    pub fn remove_up_through_expected(&mut self, expected_sequence: SequenceNumber) {
        while let Some(front) = self.resend_window.front() {
            if !front.sequence.is_before(&expected_sequence) {
                break;
            }
            trace!("frame #{} pruned by peer's expected sequence {}", front.sequence, expected_sequence);
            self.resend_window.pop_front();
        }
        self.first_send_window.retain(|f| !f.sequence.is_before(&expected_sequence));
    }

    pub fn on_ack_report(&mut self, report: &AckReport, now: f64) {
        trace!("received ack report: {:?} < {}, speed {}", report.acked.ranges(), report.expected_sequence, report.recent_receive_speed);

        // ranges are not expanded: a peer can report up to half the sequence number range
        for range in report.acked.ranges() {
            if range.is_single() {
                self.remove_from_window(range.left);
            }
            else {
                self.remove_range_from_window(range);
            }
        }
        self.remove_up_through_expected(report.expected_sequence);

        let reported_speed = f64::from(report.recent_receive_speed.max(0));
        self.remote_receive_speed_estimate = 0.9 * self.remote_receive_speed_estimate + 0.1 * reported_speed;
        self.last_received_ack_sequence = Some(report.expected_sequence);
        self.last_received_ack_time = Some(now);
    }

    /// seconds since the oldest unacknowledged frame was first sent, 0 if there is none
    pub fn longest_pending_resend_age(&self, now: f64) -> f64 {
        self.resend_window.iter()
            .map(|f| now - f.first_send_time)
            .fold(0.0, f64::max)
    }

    pub fn num_pending_frames(&self) -> usize {
        self.first_send_window.len() + self.resend_window.len()
    }

    pub fn stats(&self) -> SenderStats {
        SenderStats {
            next_sequence: self.next_sequence,
            unsent_stream_bytes: self.stream_queue.len(),
            first_send_window_len: self.first_send_window.len(),
            resend_window_len: self.resend_window.len(),
            frames_sent: self.frames_sent,
            frames_resent: self.frames_resent,
            ack_frames_sent: self.ack_frames_sent,
            transmit_failures: self.transmit_failures,
            resends_rate_limited: self.resends_rate_limited,
            remote_receive_speed_estimate: self.remote_receive_speed_estimate,
            last_received_ack_sequence: self.last_received_ack_sequence,
            last_received_ack_time: self.last_received_ack_time,
        }
    }
}
