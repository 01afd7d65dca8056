//! Length-delimited application messages on top of an ordered byte stream - the reassembled
//!  stream of a reliable transport host, or any other reliable stream (e.g. TCP).
//!
//! ```ascii
//! 0: marker (u16) = 0x5713
//! 2: payload length (varint, LEB128, at most 5 bytes)
//! *: payload
//! ```

use crate::safe_converter::{PrecheckedCast, SafeCast};
use bytes::{Buf, BufMut, Bytes};
use bytes_varint::{VarIntSupport, VarIntSupportMut};
use thiserror::Error;

pub const MESSAGE_MARKER: u16 = 0x5713;

const MARKER_LEN: usize = size_of::<u16>();
const MAX_LENGTH_PREFIX_LEN: usize = 5;

/// Protocol violations in a message stream. There is no way to resynchronize after any of them,
///  so the stream must be treated as corrupted.
///
/// `consumed` is the offset up to which the input was read, including the offending bytes.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FramingError {
    #[error("invalid message marker {found:#06x} at offset {offset}")]
    InvalidMarker { offset: usize, found: u16, consumed: usize },
    #[error("message at offset {offset} has length {len}, exceeding the maximum of {max_len}")]
    MessageTooLong { offset: usize, len: usize, max_len: usize, consumed: usize },
    #[error("malformed length prefix at offset {offset}")]
    InvalidLength { offset: usize, consumed: usize },
}

impl FramingError {
    pub fn consumed(&self) -> usize {
        match self {
            FramingError::InvalidMarker { consumed, .. } => *consumed,
            FramingError::MessageTooLong { consumed, .. } => *consumed,
            FramingError::InvalidLength { consumed, .. } => *consumed,
        }
    }
}

/// Extracts all complete messages from `input`, appending them to `out`, and returns the offset
///  up to which `input` was consumed. An incomplete message at the end is left for a later call
///  when more bytes are available.
///
/// Messages extracted before an error remain in `out`.
pub fn extract_messages(input: &[u8], max_len: usize, out: &mut Vec<Bytes>) -> Result<usize, FramingError> {
    let mut offset = 0;

    loop {
        let mut buf = &input[offset..];
        if buf.len() < MARKER_LEN {
            return Ok(offset);
        }

        let marker = buf.get_u16();
        if marker != MESSAGE_MARKER {
            return Err(FramingError::InvalidMarker {
                offset,
                found: marker,
                consumed: offset + MARKER_LEN,
            });
        }

        let Some(prefix_len) = length_prefix_len(buf) else {
            if buf.len() < MAX_LENGTH_PREFIX_LEN {
                return Ok(offset);
            }
            return Err(FramingError::InvalidLength {
                offset,
                consumed: offset + MARKER_LEN + MAX_LENGTH_PREFIX_LEN,
            });
        };

        let header_len = MARKER_LEN + prefix_len;
        let mut prefix = &buf[..prefix_len];
        let len = prefix.try_get_u64_varint()
            .ok()
            .and_then(|len| u32::try_from(len).ok())
            .ok_or(FramingError::InvalidLength {
                offset,
                consumed: offset + header_len,
            })?;

        let len: usize = len.safe_cast();
        if len > max_len {
            return Err(FramingError::MessageTooLong {
                offset,
                len,
                max_len,
                consumed: offset + header_len,
            });
        }

        let payload = &buf[prefix_len..];
        if payload.len() < len {
            return Ok(offset);
        }

        out.push(Bytes::copy_from_slice(&payload[..len]));
        offset += header_len + len;
    }
}

/// the number of bytes of the varint at the start of `buf`, if it is complete
fn length_prefix_len(buf: &[u8]) -> Option<usize> {
    buf.iter()
        .take(MAX_LENGTH_PREFIX_LEN)
        .position(|b| b & 0x80 == 0)
        .map(|idx| idx + 1)
}

/// NB: panics for payloads of 4 GiB or more
pub fn write_message(buf: &mut impl BufMut, payload: &[u8]) {
    buf.put_u16(MESSAGE_MARKER);
    buf.put_u32_varint(payload.len().prechecked_cast());
    buf.put_slice(payload);
}
