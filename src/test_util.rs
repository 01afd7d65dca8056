//! Deterministic stand-ins for the capabilities a host requires, for tests and simulations
//!  in downstream crates.

use crate::frame::Frame;
use crate::config::RudpConfig;
use crate::transmit::{Clock, TransmitSink};
use anyhow::bail;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(now: f64) -> ManualClock {
        let result = ManualClock::default();
        result.set(now);
        result
    }

    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, delta: f64) {
        self.set(self.now() + delta);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// A transmit sink that records everything it is asked to transmit. Clones share the same
///  recording, so a test can keep a handle while the host owns another.
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Bytes>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> RecordingSink {
        Default::default()
    }

    /// while failing, every transmission returns an error and is not recorded
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    fn locked(&self) -> MutexGuard<'_, Vec<Bytes>> {
        self.sent.lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn num_sent(&self) -> usize {
        self.locked().len()
    }

    /// returns and forgets everything recorded so far
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.locked())
    }

    /// like [RecordingSink::take_sent], decoding the recorded datagrams
    pub fn take_sent_frames(&self, config: &RudpConfig) -> anyhow::Result<Vec<Frame>> {
        self.take_sent().iter()
            .map(|datagram| Frame::decode(datagram, config))
            .collect()
    }
}

impl TransmitSink for RecordingSink {
    fn transmit(&self, frame_bytes: &[u8]) -> anyhow::Result<()> {
        if self.failing.load(Ordering::Acquire) {
            bail!("simulated transmit failure");
        }
        self.locked().push(Bytes::copy_from_slice(frame_bytes));
        Ok(())
    }
}
