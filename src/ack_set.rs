//! Run-length compressed sets of acknowledged sequence numbers.
//!
//! A receiver acknowledges every sequence number it received individually, but received
//!  frames tend to come in long contiguous runs. The set is therefore stored (and transmitted)
//!  as a list of inclusive ranges:
//!
//! ```ascii
//!  inserted:  5 6 7 10 11 20
//!  ranges:    (5,7) (10,11) (20,20)
//! ```
//!
//! Wire format (inside an Ack frame), numbers in network byte order (BE):
//!
//! ```ascii
//! 0: number of ranges (varint)
//! *: (repeated) flag (u8): 0 = single sequence number, 1 = pair
//!               left (u32), and right (u32) for pairs only
//! ```

use crate::sequence_number::SequenceNumber;
use anyhow::bail;
use bytes::{Buf, BufMut};
use bytes_varint::{VarIntSupport, VarIntSupportMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
enum AckRangeKind {
    Single = 0,
    Paired = 1,
}

/// an inclusive range of sequence numbers
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AckRange {
    pub left: SequenceNumber,
    pub right: SequenceNumber,
}

impl AckRange {
    /// worst case: flag plus two sequence numbers
    pub const MAX_SERIALIZED_LEN: usize = size_of::<u8>() + 2 * SequenceNumber::SERIALIZED_LEN;

    pub fn single(n: SequenceNumber) -> AckRange {
        AckRange { left: n, right: n }
    }

    pub fn is_single(&self) -> bool {
        self.left == self.right
    }

    pub fn contains(&self, n: SequenceNumber) -> bool {
        !n.is_before(&self.left) && !self.right.is_before(&n)
    }

    pub fn iter(&self) -> impl Iterator<Item = SequenceNumber> {
        let right = self.right;
        std::iter::successors(Some(self.left), move |n| {
            if *n == right {
                None
            }
            else {
                Some(n.successor())
            }
        })
    }

    fn serialized_len(&self) -> usize {
        if self.is_single() {
            size_of::<u8>() + SequenceNumber::SERIALIZED_LEN
        }
        else {
            Self::MAX_SERIALIZED_LEN
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CompressedAckSet {
    /// non-overlapping, strictly increasing
    ranges: Vec<AckRange>,
}

impl CompressedAckSet {
    pub fn new() -> CompressedAckSet {
        Default::default()
    }

    /// Sequence numbers must be inserted in non-decreasing order: only the last range is
    ///  considered for merging.
    pub fn insert(&mut self, n: SequenceNumber) {
        match self.ranges.last_mut() {
            Some(last) if last.contains(n) => {}
            Some(last) if last.right.is_adjacent_to(n) => last.right = n,
            Some(last) if n.is_adjacent_to(last.left) => last.left = n,
            _ => self.ranges.push(AckRange::single(n)),
        }
    }

    /// true iff inserting `n` would not add a new range
    pub fn can_absorb(&self, n: SequenceNumber) -> bool {
        match self.ranges.last() {
            None => false,
            Some(last) => last.contains(n) || last.right.is_adjacent_to(n) || n.is_adjacent_to(last.left),
        }
    }

    pub fn ranges(&self) -> &[AckRange] {
        &self.ranges
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// decompresses the set into all of its members, in order
    pub fn iter(&self) -> impl Iterator<Item = SequenceNumber> + '_ {
        self.ranges.iter().flat_map(|r| r.iter())
    }

    /// Splits a sorted, de-duplicated list of sequence numbers into as many sets as are needed
    ///  so that none of them has more than `max_ranges` ranges.
    pub fn build_batches(sorted: &[SequenceNumber], max_ranges: usize) -> Vec<CompressedAckSet> {
        assert!(max_ranges > 0, "this is a bug: an ack frame must have room for at least one range");

        let mut result = Vec::new();
        let mut current = CompressedAckSet::new();
        for &n in sorted {
            if current.range_count() >= max_ranges && !current.can_absorb(n) {
                result.push(std::mem::take(&mut current));
            }
            current.insert(n);
        }
        if !current.is_empty() {
            result.push(current);
        }
        result
    }

    pub fn serialized_len(&self) -> usize {
        varint_len(self.ranges.len() as u64)
            + self.ranges.iter()
                .map(|r| r.serialized_len())
                .sum::<usize>()
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_usize_varint(self.ranges.len());
        for range in &self.ranges {
            if range.is_single() {
                buf.put_u8(AckRangeKind::Single.into());
                buf.put_u32(range.left.to_raw());
            }
            else {
                buf.put_u8(AckRangeKind::Paired.into());
                buf.put_u32(range.left.to_raw());
                buf.put_u32(range.right.to_raw());
            }
        }
    }

    pub fn deser(buf: &mut impl Buf, max_ranges: usize) -> anyhow::Result<CompressedAckSet> {
        let num_ranges = buf.try_get_usize_varint()?;
        if num_ranges > max_ranges {
            bail!("ack set with {} ranges exceeds the maximum of {}", num_ranges, max_ranges);
        }

        let mut ranges: Vec<AckRange> = Vec::with_capacity(num_ranges);
        for _ in 0..num_ranges {
            let range = match AckRangeKind::try_from(buf.try_get_u8()?)? {
                AckRangeKind::Single => AckRange::single(SequenceNumber::from_raw(buf.try_get_u32()?)),
                AckRangeKind::Paired => {
                    let left = SequenceNumber::from_raw(buf.try_get_u32()?);
                    let right = SequenceNumber::from_raw(buf.try_get_u32()?);
                    if !left.is_before(&right) {
                        bail!("ack range ({}, {}) is not increasing", left, right);
                    }
                    AckRange { left, right }
                }
            };

            if let Some(prev) = ranges.last() {
                if !prev.right.is_before(&range.left) {
                    bail!("ack range starting at {} overlaps or precedes the previous range ending at {}", range.left, prev.right);
                }
            }
            ranges.push(range);
        }

        Ok(CompressedAckSet { ranges })
    }
}

pub(crate) fn varint_len(value: u64) -> usize {
    let significant_bits = u64::BITS - value.leading_zeros();
    (significant_bits.max(1) as usize).div_ceil(7)
}
