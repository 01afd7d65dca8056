use crate::ack_set::AckRange;
use crate::frame::Frame;
use anyhow::bail;

/// Tuning knobs for the reliable transport. All durations and intervals are in seconds, all
///  rates in frames per second.
///
/// NB: Both peers of a reliable channel should use compatible values for `max_frame_len` -
///      a receiver rejects frames exceeding its own limits as protocol violations.
#[derive(Debug, Clone)]
pub struct RudpConfig {
    /// This is the maximum length of a serialized frame, i.e. of the datagram payload handed to
    ///  the transmit capability. It must be supported by all routes between the peers, including
    ///  any relay path and the overhead added by lower layers (encryption, headers).
    ///
    /// Choosing this value too big causes datagrams to be fragmented or dropped on the way.
    ///  Choosing it too small wastes bandwidth on per-frame overhead.
    pub max_frame_len: usize,

    /// The time a frame waits for its ack after its first transmission before it is re-sent.
    pub first_resend_cooldown: f64,
    /// Resend cooldown doubles with every re-send of a frame, up to this value.
    pub max_resend_cooldown: f64,

    /// Bytes that do not fill a complete frame are held back for up to this interval, waiting
    ///  for more bytes to share the frame.
    pub stream_coalesce_interval: f64,
    /// Received sequence numbers are collected for up to this interval and then acknowledged
    ///  together.
    pub ack_coalesce_interval: f64,

    /// Lower and upper bound for the number of re-sent frames per second. Between the two, the
    ///  peer's reported receive speed determines the budget.
    pub min_resend_rate: f64,
    pub max_resend_rate: f64,

    /// length of the window over which the receiver measures its receive speed
    pub receive_speed_interval: f64,

    /// upper limit for the length of an application message in the message framing layer
    pub max_message_len: usize,
}

impl Default for RudpConfig {
    fn default() -> Self {
        RudpConfig {
            max_frame_len: 1300,
            first_resend_cooldown: 2.0,
            max_resend_cooldown: 8.0,
            stream_coalesce_interval: 0.06,
            ack_coalesce_interval: 0.06,
            min_resend_rate: 10.0,
            max_resend_rate: 200.0,
            receive_speed_interval: 1.0,
            max_message_len: 1024 * 1024,
        }
    }
}

impl RudpConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_frame_len < 64 {
            bail!("max frame length {} is too small", self.max_frame_len);
        }
        if self.max_frame_len > u16::MAX as usize {
            bail!("max frame length {} does not fit into a datagram", self.max_frame_len);
        }
        if !(self.first_resend_cooldown > 0.0) {
            bail!("first resend cooldown must be positive, was {}", self.first_resend_cooldown);
        }
        if self.max_resend_cooldown < self.first_resend_cooldown {
            bail!("max resend cooldown {} is smaller than the first resend cooldown {}", self.max_resend_cooldown, self.first_resend_cooldown);
        }
        if !(self.stream_coalesce_interval >= 0.0) || !(self.ack_coalesce_interval >= 0.0) {
            bail!("coalesce intervals must not be negative");
        }
        if !(self.min_resend_rate > 0.0) {
            bail!("min resend rate must be positive, was {}", self.min_resend_rate);
        }
        if self.max_resend_rate < self.min_resend_rate {
            bail!("max resend rate {} is smaller than min resend rate {}", self.max_resend_rate, self.min_resend_rate);
        }
        if !(self.receive_speed_interval > 0.0) {
            bail!("receive speed interval must be positive, was {}", self.receive_speed_interval);
        }
        if self.max_message_len == 0 || self.max_message_len > u32::MAX as usize {
            bail!("max message length {} is out of range", self.max_message_len);
        }

        Ok(())
    }

    /// the number of stream bytes that fit into a single Data frame
    pub fn max_frame_payload_len(&self) -> usize {
        self.max_frame_len - Frame::DATA_HEADER_MAX_LEN
    }

    /// the maximum number of ack ranges in a single Ack frame
    pub fn max_acks_per_frame(&self) -> usize {
        (self.max_frame_len - Frame::ACK_OVERHEAD_MAX_LEN) / AckRange::MAX_SERIALIZED_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_valid() {
        let config = RudpConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_frame_payload_len(), 1290);
        assert_eq!(config.max_acks_per_frame(), 142);
    }

    #[rstest]
    #[case::frame_too_small(RudpConfig { max_frame_len: 63, ..RudpConfig::default() })]
    #[case::frame_too_big(RudpConfig { max_frame_len: 70_000, ..RudpConfig::default() })]
    #[case::no_cooldown(RudpConfig { first_resend_cooldown: 0.0, ..RudpConfig::default() })]
    #[case::nan_cooldown(RudpConfig { first_resend_cooldown: f64::NAN, ..RudpConfig::default() })]
    #[case::max_cooldown_below_first(RudpConfig { max_resend_cooldown: 1.0, ..RudpConfig::default() })]
    #[case::negative_coalesce(RudpConfig { ack_coalesce_interval: -0.1, ..RudpConfig::default() })]
    #[case::no_resend_rate(RudpConfig { min_resend_rate: 0.0, ..RudpConfig::default() })]
    #[case::resend_rates_swapped(RudpConfig { min_resend_rate: 50.0, max_resend_rate: 40.0, ..RudpConfig::default() })]
    #[case::no_speed_interval(RudpConfig { receive_speed_interval: 0.0, ..RudpConfig::default() })]
    #[case::no_messages(RudpConfig { max_message_len: 0, ..RudpConfig::default() })]
    fn test_validate_invalid(#[case] config: RudpConfig) {
        assert!(config.validate().is_err());
    }

    #[rstest]
    #[case::minimal(64, 54, 5)]
    #[case::default(1300, 1290, 142)]
    #[case::jumbo(9000, 8990, 998)]
    fn test_derived_limits(#[case] max_frame_len: usize, #[case] expected_payload: usize, #[case] expected_acks: usize) {
        let config = RudpConfig { max_frame_len, ..RudpConfig::default() };
        assert_eq!(config.max_frame_payload_len(), expected_payload);
        assert_eq!(config.max_acks_per_frame(), expected_acks);
    }
}
