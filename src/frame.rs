use crate::ack_set::CompressedAckSet;
use crate::config::RudpConfig;
use crate::sequence_number::SequenceNumber;
use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use bytes_varint::{VarIntSupport, VarIntSupportMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::{Debug, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
enum FrameKind {
    Ack = 0,
    Data = 1,
}

/// The unit of the reliable transport protocol on the wire - one frame per datagram. Numbers
///  are in network byte order (BE):
///
/// ```ascii
/// 0: frame kind (u8): 0 = Ack, 1 = Data
///
/// Data:
/// 1: sequence number (u32)
/// 5: payload length (varint)
/// *: payload
///
/// Ack:
/// 1: acknowledged sequence numbers (compressed ack set, see `ack_set`)
/// *: receiver's expected sequence number (u32) - everything before it was received
/// *: receiver's recent receive speed in frames per second (i32)
/// ```
#[derive(Clone, Eq, PartialEq)]
pub enum Frame {
    Data {
        sequence: SequenceNumber,
        payload: Bytes,
    },
    Ack {
        acked: CompressedAckSet,
        expected_sequence: SequenceNumber,
        recent_receive_speed: i32,
    },
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Data { sequence, payload } => write!(f, "DATA{{#{}:{}b}}", sequence, payload.len()),
            Frame::Ack { acked, expected_sequence, recent_receive_speed } => {
                write!(f, "ACK{{{:?}<{}@{}/s}}", acked.ranges(), expected_sequence, recent_receive_speed)
            }
        }
    }
}

impl Frame {
    /// kind + sequence number + worst-case payload length
    pub const DATA_HEADER_MAX_LEN: usize = size_of::<u8>() + SequenceNumber::SERIALIZED_LEN + 5;
    /// kind + worst-case range count + expected sequence number + receive speed
    pub const ACK_OVERHEAD_MAX_LEN: usize = size_of::<u8>() + 5 + SequenceNumber::SERIALIZED_LEN + size_of::<i32>();

    pub fn is_data(&self) -> bool {
        matches!(self, Frame::Data { .. })
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        match self {
            Frame::Data { sequence, payload } => {
                buf.put_u8(FrameKind::Data.into());
                buf.put_u32(sequence.to_raw());
                buf.put_usize_varint(payload.len());
                buf.put_slice(payload);
            }
            Frame::Ack { acked, expected_sequence, recent_receive_speed } => {
                buf.put_u8(FrameKind::Ack.into());
                acked.ser(buf);
                buf.put_u32(expected_sequence.to_raw());
                buf.put_i32(*recent_receive_speed);
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.ser(&mut buf);
        buf.freeze()
    }

    /// `max_payload_len` and `max_ack_ranges` are the receiver's limits: frames exceeding them
    ///  are rejected as protocol violations
    pub fn deser(buf: &mut impl Buf, max_payload_len: usize, max_ack_ranges: usize) -> anyhow::Result<Frame> {
        match FrameKind::try_from(buf.try_get_u8()?)? {
            FrameKind::Data => {
                let sequence = SequenceNumber::from_raw(buf.try_get_u32()?);
                let payload_len = buf.try_get_usize_varint()?;
                if payload_len > max_payload_len {
                    bail!("data frame #{} declares a payload length of {} which exceeds the maximum of {}", sequence, payload_len, max_payload_len);
                }
                if payload_len > buf.remaining() {
                    bail!("data frame #{} declares a payload length of {} but only {} bytes are left", sequence, payload_len, buf.remaining());
                }
                Ok(Frame::Data {
                    sequence,
                    payload: buf.copy_to_bytes(payload_len),
                })
            }
            FrameKind::Ack => {
                let acked = CompressedAckSet::deser(buf, max_ack_ranges)?;
                let expected_sequence = SequenceNumber::from_raw(buf.try_get_u32()?);
                let recent_receive_speed = buf.try_get_i32()?;
                Ok(Frame::Ack {
                    acked,
                    expected_sequence,
                    recent_receive_speed,
                })
            }
        }
    }

    /// parses a complete datagram, which must contain exactly one frame
    pub fn decode(datagram: &[u8], config: &RudpConfig) -> anyhow::Result<Frame> {
        let mut buf = datagram;
        let frame = Self::deser(&mut buf, config.max_frame_payload_len(), config.max_acks_per_frame())?;
        if buf.has_remaining() {
            bail!("{} trailing bytes after {:?}", buf.remaining(), frame);
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ack_set(raw: &[u32]) -> CompressedAckSet {
        let mut result = CompressedAckSet::new();
        for &n in raw {
            result.insert(SequenceNumber::from_raw(n));
        }
        result
    }

    #[rstest]
    #[case::data_empty(Frame::Data { sequence: SequenceNumber::from_raw(7), payload: Bytes::new() }, vec![1, 0,0,0,7, 0])]
    #[case::data(Frame::Data { sequence: SequenceNumber::from_raw(258), payload: Bytes::from_static(b"AB") }, vec![1, 0,0,1,2, 2, 65,66])]
    #[case::data_wrapped(Frame::Data { sequence: SequenceNumber::MAX, payload: Bytes::from_static(b"x") }, vec![1, 255,255,255,255, 1, 120])]
    #[case::ack_empty(Frame::Ack { acked: ack_set(&[]), expected_sequence: SequenceNumber::from_raw(3), recent_receive_speed: 0 }, vec![0, 0, 0,0,0,3, 0,0,0,0])]
    #[case::ack(Frame::Ack { acked: ack_set(&[5,6,7,10]), expected_sequence: SequenceNumber::from_raw(8), recent_receive_speed: 300 },
        vec![0, 2, 1, 0,0,0,5, 0,0,0,7, 0, 0,0,0,10, 0,0,0,8, 0,0,1,44])]
    #[case::ack_negative_speed(Frame::Ack { acked: ack_set(&[1]), expected_sequence: SequenceNumber::from_raw(2), recent_receive_speed: -1 },
        vec![0, 1, 0, 0,0,0,1, 0,0,0,2, 255,255,255,255])]
    fn test_ser(#[case] frame: Frame, #[case] expected: Vec<u8>) {
        let bytes = frame.to_bytes();
        assert_eq!(bytes.as_ref(), expected.as_slice());

        let decoded = Frame::decode(&bytes, &RudpConfig::default()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_data_payload_len_varint() {
        let payload = Bytes::from(vec![9u8; 200]);
        let frame = Frame::Data { sequence: SequenceNumber::ZERO, payload: payload.clone() };
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[..7], &[1, 0,0,0,0, 200,1]);
        assert_eq!(&bytes[7..], payload.as_ref());
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::unknown_kind(vec![2, 0,0,0,1, 0])]
    #[case::data_truncated_header(vec![1, 0,0,0])]
    #[case::data_truncated_payload(vec![1, 0,0,0,1, 5, 1,2,3])]
    #[case::data_trailing_bytes(vec![1, 0,0,0,1, 1, 1, 99])]
    #[case::ack_truncated(vec![0, 0, 0,0,0,3, 0,0])]
    #[case::ack_bad_flag(vec![0, 1, 7, 0,0,0,1, 0,0,0,2, 0,0,0,0])]
    fn test_decode_invalid(#[case] raw: Vec<u8>) {
        assert!(Frame::decode(&raw, &RudpConfig::default()).is_err());
    }

    #[test]
    fn test_decode_payload_too_long() {
        let config = RudpConfig {
            max_frame_len: 100,
            ..RudpConfig::default()
        };
        let frame = Frame::Data { sequence: SequenceNumber::ZERO, payload: Bytes::from(vec![0u8; 91]) };
        assert!(Frame::decode(&frame.to_bytes(), &config).is_err());

        let frame = Frame::Data { sequence: SequenceNumber::ZERO, payload: Bytes::from(vec![0u8; 90]) };
        assert!(Frame::decode(&frame.to_bytes(), &config).is_ok());
    }

    #[test]
    fn test_full_ack_frame_fits() {
        let config = RudpConfig::default();
        let singletons = (0..config.max_acks_per_frame() as u32)
            .map(|n| 2 * n)
            .collect::<Vec<_>>();
        let frame = Frame::Ack {
            acked: ack_set(&singletons),
            expected_sequence: SequenceNumber::ZERO,
            recent_receive_speed: i32::MAX,
        };
        assert!(frame.to_bytes().len() <= config.max_frame_len);
        assert!(Frame::decode(&frame.to_bytes(), &config).is_ok());
    }
}
