//! On-disk constants and frame geometry.
//!
//! ```text
//! File  = Fence (Frame Fence)*
//! Frame = HeadLen | Payload | TailMeta | Padding | PayloadCrc | Trailer
//! ```
//!
//! Every frame is 4-byte aligned and starts right after a fence.

use crate::error::{RbfError, RbfResult};
use crate::ticket::Ticket;

/// Fence bytes. Written once as the file header and after every frame.
pub const FENCE: [u8; 4] = *b"RBF1";

/// Size of a fence in bytes.
pub const FENCE_SIZE: usize = 4;

/// Length of a file holding only the header fence.
pub const HEADER_ONLY_LENGTH: u64 = FENCE_SIZE as u64;

/// Offset of the first frame.
pub const FIRST_FRAME_OFFSET: u64 = HEADER_ONLY_LENGTH;

/// Size of the leading `HeadLen` field.
pub const HEAD_LEN_SIZE: usize = 4;

/// Size of the `PayloadCrc` field.
pub const PAYLOAD_CRC_SIZE: usize = 4;

/// Size of the trailer codeword.
pub const TRAILER_SIZE: usize = 16;

/// Bytes every frame carries besides payload, tail meta and padding.
pub const FIXED_OVERHEAD: usize = HEAD_LEN_SIZE + PAYLOAD_CRC_SIZE + TRAILER_SIZE;

/// Length of an empty frame.
pub const MIN_FRAME_LENGTH: u32 = FIXED_OVERHEAD as u32;

/// Largest frame length the format allows.
pub const MAX_FRAME_LENGTH: u32 = Ticket::MAX_LENGTH;

/// Largest tail meta length the descriptor can express.
pub const MAX_TAIL_META_LENGTH: usize = 0xFFFF;

/// Largest padding length.
pub const MAX_PADDING_LENGTH: usize = 3;

/// Smallest fence end offset that can follow a frame.
pub const MIN_FIRST_FRAME_FENCE_END: u64 =
    FIRST_FRAME_OFFSET + MIN_FRAME_LENGTH as u64 + FENCE_SIZE as u64;

/// Bytes read by the reverse scanner before each fence end: trailer + fence.
pub const TAIL_PROBE_SIZE: usize = TRAILER_SIZE + FENCE_SIZE;

/// Geometry of one frame, derived from its payload and tail meta lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    payload_length: usize,
    tail_meta_length: usize,
    padding_length: usize,
}

impl FrameLayout {
    /// Computes the layout for `payload_length` and `tail_meta_length`.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidArgument`] if the tail meta exceeds
    /// [`MAX_TAIL_META_LENGTH`] or the frame would exceed
    /// [`MAX_FRAME_LENGTH`].
    pub fn new(payload_length: usize, tail_meta_length: usize) -> RbfResult<Self> {
        if tail_meta_length > MAX_TAIL_META_LENGTH {
            return Err(RbfError::invalid_argument(format!(
                "tail meta length {tail_meta_length} exceeds {MAX_TAIL_META_LENGTH}"
            )));
        }
        let layout = Self {
            payload_length,
            tail_meta_length,
            padding_length: padding_for(payload_length, tail_meta_length),
        };
        let total = payload_length
            .checked_add(tail_meta_length)
            .and_then(|n| n.checked_add(FIXED_OVERHEAD + layout.padding_length));
        match total {
            Some(total) if total <= MAX_FRAME_LENGTH as usize => Ok(layout),
            _ => Err(RbfError::invalid_argument(format!(
                "frame with payload {payload_length} and tail meta {tail_meta_length} \
                 exceeds maximum frame length {MAX_FRAME_LENGTH}"
            ))),
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.payload_length
    }

    /// Tail meta length in bytes.
    #[must_use]
    pub const fn tail_meta_length(&self) -> usize {
        self.tail_meta_length
    }

    /// Padding length in bytes (0..=3).
    #[must_use]
    pub const fn padding_length(&self) -> usize {
        self.padding_length
    }

    /// Offset of the payload within the frame.
    #[must_use]
    pub const fn payload_offset(&self) -> usize {
        HEAD_LEN_SIZE
    }

    /// Offset of the tail meta within the frame.
    #[must_use]
    pub const fn tail_meta_offset(&self) -> usize {
        HEAD_LEN_SIZE + self.payload_length
    }

    /// Offset of the padding within the frame.
    #[must_use]
    pub const fn padding_offset(&self) -> usize {
        self.tail_meta_offset() + self.tail_meta_length
    }

    /// Offset of `PayloadCrc` within the frame.
    #[must_use]
    pub const fn payload_crc_offset(&self) -> usize {
        self.padding_offset() + self.padding_length
    }

    /// Offset of the trailer within the frame.
    #[must_use]
    pub const fn trailer_offset(&self) -> usize {
        self.payload_crc_offset() + PAYLOAD_CRC_SIZE
    }

    /// Length of the region covered by `PayloadCrc`.
    #[must_use]
    pub const fn crc_coverage_length(&self) -> usize {
        self.payload_length + self.tail_meta_length + self.padding_length
    }

    /// Total frame length, excluding the trailing fence.
    #[must_use]
    pub const fn frame_length(&self) -> u32 {
        (self.trailer_offset() + TRAILER_SIZE) as u32
    }

    /// Frame length plus the fence written after it.
    #[must_use]
    pub const fn frame_length_with_fence(&self) -> u64 {
        self.frame_length() as u64 + FENCE_SIZE as u64
    }
}

/// Padding that brings `payload + tail_meta` up to a multiple of 4.
#[inline]
#[must_use]
pub const fn padding_for(payload_length: usize, tail_meta_length: usize) -> usize {
    (4 - (payload_length % 4 + tail_meta_length % 4) % 4) % 4
}

/// Returns `true` if `value` is a multiple of 4.
#[inline]
#[must_use]
pub const fn is_aligned(value: u64) -> bool {
    value % 4 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn constants() {
        assert_eq!(&FENCE, b"RBF1");
        assert_eq!(FIXED_OVERHEAD, 24);
        assert_eq!(MIN_FRAME_LENGTH, 24);
        assert_eq!(MIN_FIRST_FRAME_FENCE_END, 32);
    }

    #[test]
    fn empty_frame() {
        let layout = FrameLayout::new(0, 0).unwrap();
        assert_eq!(layout.padding_length(), 0);
        assert_eq!(layout.frame_length(), 24);
        assert_eq!(layout.payload_crc_offset(), 4);
        assert_eq!(layout.trailer_offset(), 8);
    }

    #[test]
    fn offsets_for_small_frame() {
        let layout = FrameLayout::new(3, 2).unwrap();
        assert_eq!(layout.padding_length(), 3);
        assert_eq!(layout.tail_meta_offset(), 7);
        assert_eq!(layout.padding_offset(), 9);
        assert_eq!(layout.payload_crc_offset(), 12);
        assert_eq!(layout.trailer_offset(), 16);
        assert_eq!(layout.frame_length(), 32);
        assert_eq!(layout.crc_coverage_length(), 8);
    }

    #[test]
    fn rejects_oversized_tail_meta() {
        assert!(FrameLayout::new(0, MAX_TAIL_META_LENGTH).is_ok());
        assert!(FrameLayout::new(0, MAX_TAIL_META_LENGTH + 1).is_err());
    }

    #[test]
    fn rejects_oversized_frame() {
        let max_payload = MAX_FRAME_LENGTH as usize - FIXED_OVERHEAD;
        assert_eq!(
            FrameLayout::new(max_payload, 0).unwrap().frame_length(),
            MAX_FRAME_LENGTH
        );
        assert!(FrameLayout::new(max_payload + 1, 0).is_err());
        assert!(FrameLayout::new(usize::MAX, 4).is_err());
    }

    #[test]
    fn huge_lengths_are_rejected_not_overflowed() {
        assert_eq!(padding_for(usize::MAX, 4), 1);
        assert_eq!(
            padding_for(usize::MAX, MAX_TAIL_META_LENGTH),
            padding_for(3, MAX_TAIL_META_LENGTH)
        );
        for payload in [usize::MAX, usize::MAX - 3, usize::MAX - FIXED_OVERHEAD] {
            assert!(matches!(
                FrameLayout::new(payload, MAX_TAIL_META_LENGTH),
                Err(RbfError::InvalidArgument { .. })
            ));
        }
    }

    proptest! {
        #[test]
        fn frame_length_formula(n in 0usize..100_000, m in 0usize..=MAX_TAIL_META_LENGTH) {
            let layout = FrameLayout::new(n, m).unwrap();
            let p = layout.padding_length();
            prop_assert!(p <= MAX_PADDING_LENGTH);
            prop_assert_eq!((n + m + p) % 4, 0);
            prop_assert_eq!(layout.frame_length() as usize, 24 + n + m + p);
            prop_assert_eq!(layout.frame_length() % 4, 0);
        }
    }
}
