//! Frame tickets.
//!
//! A [`Ticket`] locates one frame: the offset of its `HeadLen` field and its
//! total length. Both are multiples of 4, which lets a ticket pack into a
//! single `u64` (38 bits of offset/4, 26 bits of length/4).

use crate::error::{RbfError, RbfResult};
use std::fmt;

/// Location of a frame in an RBF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket {
    offset: u64,
    length: u32,
}

impl Ticket {
    /// Offset and length granularity.
    pub const ALIGNMENT: u64 = 4;
    /// Bits used for `offset / 4` in the packed form.
    pub const OFFSET_BITS: u32 = 38;
    /// Bits used for `length / 4` in the packed form.
    pub const LENGTH_BITS: u32 = 26;
    /// Largest representable offset.
    pub const MAX_OFFSET: u64 = ((1u64 << Self::OFFSET_BITS) - 1) << 2;
    /// Largest representable length (just under 256 MiB).
    pub const MAX_LENGTH: u32 = (((1u64 << Self::LENGTH_BITS) - 1) << 2) as u32;

    const LENGTH_MASK: u64 = (1u64 << Self::LENGTH_BITS) - 1;

    /// Creates a ticket, checking alignment and range.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidArgument`] if either value is not a
    /// multiple of 4 or exceeds its maximum.
    pub fn new(offset: u64, length: u32) -> RbfResult<Self> {
        if offset % Self::ALIGNMENT != 0 || u64::from(length) % Self::ALIGNMENT != 0 {
            return Err(RbfError::invalid_argument(format!(
                "ticket offset {offset} and length {length} must be 4-byte aligned"
            )));
        }
        if offset > Self::MAX_OFFSET {
            return Err(RbfError::invalid_argument(format!(
                "ticket offset {offset} exceeds maximum {}",
                Self::MAX_OFFSET
            )));
        }
        if length > Self::MAX_LENGTH {
            return Err(RbfError::invalid_argument(format!(
                "ticket length {length} exceeds maximum {}",
                Self::MAX_LENGTH
            )));
        }
        Ok(Self { offset, length })
    }

    /// Unpacks a ticket produced by [`Ticket::to_packed`].
    ///
    /// Every `u64` decodes to some aligned, in-range ticket; whether it
    /// points at a frame is checked when it is read.
    #[must_use]
    pub const fn from_packed(packed: u64) -> Self {
        let length = ((packed & Self::LENGTH_MASK) << 2) as u32;
        let offset = (packed >> Self::LENGTH_BITS) << 2;
        Self { offset, length }
    }

    /// Packs the ticket into a single `u64`.
    #[must_use]
    pub const fn to_packed(self) -> u64 {
        ((self.offset >> 2) << Self::LENGTH_BITS) | (self.length as u64 >> 2)
    }

    /// Offset of the frame's `HeadLen` field.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.offset
    }

    /// Total frame length in bytes.
    #[must_use]
    pub const fn length(self) -> u32 {
        self.length
    }

    /// Offset one past the frame's last byte (where its fence begins).
    #[must_use]
    pub const fn end_offset(self) -> u64 {
        self.offset + self.length as u64
    }

    /// Returns `true` if `position` lies inside the frame.
    #[must_use]
    pub const fn contains(self, position: u64) -> bool {
        position >= self.offset && position < self.end_offset()
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.offset, self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn limits() {
        assert_eq!(Ticket::MAX_LENGTH, 268_435_452);
        assert_eq!(Ticket::MAX_OFFSET, 1_099_511_627_772);
    }

    #[test]
    fn new_rejects_misaligned() {
        assert!(Ticket::new(5, 24).is_err());
        assert!(Ticket::new(4, 26).is_err());
        assert!(Ticket::new(4, 24).is_ok());
    }

    #[test]
    fn new_rejects_out_of_range() {
        assert!(Ticket::new(Ticket::MAX_OFFSET + 4, 24).is_err());
        assert!(Ticket::new(4, Ticket::MAX_LENGTH + 4).is_err());
        assert!(Ticket::new(Ticket::MAX_OFFSET, Ticket::MAX_LENGTH).is_ok());
    }

    #[test]
    fn end_and_contains() {
        let ticket = Ticket::new(8, 24).unwrap();
        assert_eq!(ticket.end_offset(), 32);
        assert!(ticket.contains(8));
        assert!(ticket.contains(31));
        assert!(!ticket.contains(32));
        assert!(!ticket.contains(7));
    }

    #[test]
    fn display() {
        assert_eq!(Ticket::new(4, 28).unwrap().to_string(), "4+28");
    }

    proptest! {
        #[test]
        fn packing_is_lossless(off in 0u64..=(Ticket::MAX_OFFSET >> 2), len in 0u32..=(Ticket::MAX_LENGTH >> 2)) {
            let ticket = Ticket::new(off << 2, len << 2).unwrap();
            prop_assert_eq!(Ticket::from_packed(ticket.to_packed()), ticket);
        }
    }
}
