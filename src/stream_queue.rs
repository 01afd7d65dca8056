//! A growable FIFO byte buffer. It is used on the send side to collect application bytes
//!  before they are cut into frames, and on the receive side to reassemble the payloads of
//!  in-order frames into a byte stream.
//!
//! Its salient points are:
//!
//! * backed by a single contiguous allocation, with a logical `(head, len)` window into it
//! * consuming from the front is O(1); the consumed prefix is reclaimed by moving the
//!    remaining content to offset 0 once it becomes small relative to the dead prefix
//! * surplus capacity is released after bursts to bound long-running memory usage
//! * implements `Buf` to fit into the `bytes` ecosystem

use bytes::{Buf, Bytes};
use std::cmp::min;
use std::fmt::{Debug, Formatter};
use tracing::trace;

#[derive(Default)]
pub struct ByteStreamQueue {
    /// the logical content is `buf[head..]`
    buf: Vec<u8>,
    head: usize,
}

impl ByteStreamQueue {
    /// below this, the allocation is not worth compacting or shrinking
    const MIN_CAPACITY: usize = 4096;

    pub fn new() -> ByteStreamQueue {
        Default::default()
    }

    pub fn with_capacity(capacity: usize) -> ByteStreamQueue {
        ByteStreamQueue {
            buf: Vec::with_capacity(capacity),
            head: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// the size of the underlying allocation, including the consumed prefix
    pub fn allocated_capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.head..]
    }

    pub fn push_slice(&mut self, data: &[u8]) {
        if self.is_empty() && self.head > 0 {
            // cheap reset: there is nothing to move
            self.buf.clear();
            self.head = 0;
        }
        self.buf.extend_from_slice(data);
    }

    /// discards `n` bytes from the front of the queue
    pub fn pop_front(&mut self, n: usize) {
        assert!(n <= self.len(), "this is a bug: popping {} bytes from a queue of length {}", n, self.len());
        self.head += n;
        self.compact_if_worthwhile();
    }

    /// removes up to `max_len` bytes from the front of the queue and returns them
    pub fn take_front(&mut self, max_len: usize) -> Bytes {
        let n = min(max_len, self.len());
        let result = Bytes::copy_from_slice(&self.buf[self.head..self.head + n]);
        self.pop_front(n);
        result
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
        self.shrink_if_oversized();
    }

    fn compact_if_worthwhile(&mut self) {
        if self.is_empty() {
            self.clear();
            return;
        }

        if self.head < Self::MIN_CAPACITY || self.head < self.len() {
            return;
        }

        trace!("compacting stream queue: moving {} bytes from offset {}", self.len(), self.head);
        let len = self.len();
        self.buf.copy_within(self.head.., 0);
        self.buf.truncate(len);
        self.head = 0;
        self.shrink_if_oversized();
    }

    fn shrink_if_oversized(&mut self) {
        let target = (2 * self.buf.len()).max(Self::MIN_CAPACITY);
        if self.buf.capacity() > 2 * target {
            trace!("shrinking stream queue allocation from {} to {} bytes", self.buf.capacity(), target);
            self.buf.shrink_to(target);
        }
    }
}

impl Debug for ByteStreamQueue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.as_slice().fmt(f)
    }
}

impl AsRef<[u8]> for ByteStreamQueue {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Buf for ByteStreamQueue {
    fn remaining(&self) -> usize {
        self.len()
    }

    fn chunk(&self) -> &[u8] {
        self.as_slice()
    }

    fn advance(&mut self, cnt: usize) {
        self.pop_front(cnt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_fifo() {
        let mut queue = ByteStreamQueue::new();
        assert!(queue.is_empty());

        queue.push_slice(b"abc");
        queue.push_slice(b"defg");
        assert_eq!(queue.len(), 7);
        assert_eq!(queue.as_slice(), b"abcdefg");

        assert_eq!(queue.take_front(2).as_ref(), b"ab");
        assert_eq!(queue.as_slice(), b"cdefg");

        queue.pop_front(1);
        assert_eq!(queue.as_slice(), b"defg");

        queue.push_slice(b"h");
        assert_eq!(queue.take_front(100).as_ref(), b"defgh");
        assert!(queue.is_empty());
        assert!(queue.take_front(5).is_empty());
    }

    #[rstest]
    #[case::nothing(0)]
    #[case::some(3)]
    #[case::all(10)]
    fn test_buf_advance(#[case] n: usize) {
        let mut queue = ByteStreamQueue::new();
        queue.push_slice(b"0123456789");
        queue.advance(n);
        assert_eq!(queue.remaining(), 10 - n);
        assert_eq!(queue.chunk(), &b"0123456789"[n..]);
    }

    #[test]
    fn test_buf_get() {
        let mut queue = ByteStreamQueue::new();
        queue.push_slice(&[0, 0, 1, 2, 9]);
        assert_eq!(queue.get_u32(), 258);
        assert_eq!(queue.get_u8(), 9);
        assert!(!queue.has_remaining());
    }

    #[test]
    #[should_panic]
    fn test_pop_too_much() {
        let mut queue = ByteStreamQueue::new();
        queue.push_slice(b"ab");
        queue.pop_front(3);
    }

    #[test]
    fn test_compaction() {
        let mut queue = ByteStreamQueue::new();
        let data = (0..20_000u32).map(|n| n as u8).collect::<Vec<_>>();
        queue.push_slice(&data);

        // consume most of the content: the remainder is moved to the start of the buffer
        queue.pop_front(15_000);
        assert_eq!(queue.head, 0);
        assert_eq!(queue.as_slice(), &data[15_000..]);

        queue.push_slice(b"xyz");
        assert_eq!(queue.len(), 5_003);
        assert_eq!(&queue.as_slice()[5_000..], b"xyz");
    }

    #[test]
    fn test_no_compaction_for_small_prefix() {
        let mut queue = ByteStreamQueue::new();
        queue.push_slice(&[7u8; 1000]);
        queue.pop_front(10);
        assert_eq!(queue.head, 10);
        assert_eq!(queue.len(), 990);
    }

    #[test]
    fn test_shrink_after_burst() {
        let mut queue = ByteStreamQueue::new();
        queue.push_slice(&vec![1u8; 1_000_000]);
        assert!(queue.allocated_capacity() >= 1_000_000);

        queue.pop_front(999_000);
        assert_eq!(queue.len(), 1000);
        assert!(queue.allocated_capacity() < 100_000);

        queue.pop_front(1000);
        assert!(queue.is_empty());
        assert!(queue.allocated_capacity() <= 2 * ByteStreamQueue::MIN_CAPACITY);
    }
}
