use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// A frame's position in the sender's byte stream. Sequence numbers wrap around after
///  `u32::MAX`, so they are ordered relative to each other (half-range rule) rather than by
///  their raw value.
///
/// NB: This type intentionally does not implement `PartialOrd` / `Ord` - wrap-around order is
///      not transitive, and using it as a key in a `BTreeMap` would silently break after
///      wrapping. Use [SequenceNumber::wrapping_cmp] instead.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct SequenceNumber(u32);

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SequenceNumber {
    pub const ZERO: SequenceNumber = SequenceNumber(0);
    pub const MAX: SequenceNumber = SequenceNumber(u32::MAX);

    /// differences up to and including this value mean 'after', larger differences 'before'
    const HALF_RANGE: u32 = u32::MAX / 2;

    pub const SERIALIZED_LEN: usize = size_of::<u32>();

    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }

    pub fn successor(&self) -> SequenceNumber {
        SequenceNumber(self.0.wrapping_add(1))
    }

    pub fn predecessor(&self) -> SequenceNumber {
        SequenceNumber(self.0.wrapping_sub(1))
    }

    /// true iff `other` immediately follows `self`
    pub fn is_adjacent_to(&self, other: SequenceNumber) -> bool {
        self.successor() == other
    }

    /// `Greater` means `self` comes after `other` in the stream
    pub fn wrapping_cmp(&self, other: &SequenceNumber) -> Ordering {
        match self.0.wrapping_sub(other.0) {
            0 => Ordering::Equal,
            diff if diff <= Self::HALF_RANGE => Ordering::Greater,
            _ => Ordering::Less,
        }
    }

    pub fn is_before(&self, other: &SequenceNumber) -> bool {
        self.wrapping_cmp(other) == Ordering::Less
    }

    /// number of steps from `other` to `self`, assuming `self` does not come before `other`
    pub fn distance_from(&self, other: SequenceNumber) -> u32 {
        self.0.wrapping_sub(other.0)
    }
}
