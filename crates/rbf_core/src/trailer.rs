//! The 16-byte trailer codeword at the end of every frame.
//!
//! ```text
//! [0..4)   TrailerCrc32C  u32 big-endian, CRC32C of bytes [4..16)
//! [4..8)   FrameDescriptor u32 little-endian
//! [8..12)  FrameTag        u32 little-endian
//! [12..16) TailLen         u32 little-endian, equals HeadLen
//! ```
//!
//! The trailer is self-validating, so a reader positioned at a fence can
//! decide whether the preceding bytes end a frame without touching the
//! payload.

use crate::crc::crc32c;
use crate::error::{CrcRegion, RbfError, RbfResult};
use crate::layout::{FIXED_OVERHEAD, MAX_PADDING_LENGTH, MAX_TAIL_META_LENGTH, TRAILER_SIZE};

/// Packed frame flags and lengths.
///
/// | bits  | meaning                      |
/// |-------|------------------------------|
/// | 31    | tombstone                    |
/// | 30-29 | padding length (0..=3)       |
/// | 28-16 | reserved, must be zero       |
/// | 15-0  | tail meta length (0..=65535) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameDescriptor(u32);

impl FrameDescriptor {
    const TOMBSTONE_BIT: u32 = 1 << 31;
    const PADDING_SHIFT: u32 = 29;
    const PADDING_MASK: u32 = 0b11 << Self::PADDING_SHIFT;
    /// Bits that must be zero in a valid descriptor.
    pub const RESERVED_MASK: u32 = 0x1FFF_0000;
    const TAIL_META_MASK: u32 = 0xFFFF;

    /// Builds a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidArgument`] if `padding_length > 3` or
    /// `tail_meta_length > 65535`.
    pub fn new(
        is_tombstone: bool,
        padding_length: usize,
        tail_meta_length: usize,
    ) -> RbfResult<Self> {
        if padding_length > MAX_PADDING_LENGTH {
            return Err(RbfError::invalid_argument(format!(
                "padding length {padding_length} exceeds {MAX_PADDING_LENGTH}"
            )));
        }
        if tail_meta_length > MAX_TAIL_META_LENGTH {
            return Err(RbfError::invalid_argument(format!(
                "tail meta length {tail_meta_length} exceeds {MAX_TAIL_META_LENGTH}"
            )));
        }
        let mut raw = ((padding_length as u32) << Self::PADDING_SHIFT) | tail_meta_length as u32;
        if is_tombstone {
            raw |= Self::TOMBSTONE_BIT;
        }
        Ok(Self(raw))
    }

    /// Wraps a raw descriptor word without validation.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw descriptor word.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether the frame is a tombstone.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & Self::TOMBSTONE_BIT != 0
    }

    /// Padding length (0..=3).
    #[must_use]
    pub const fn padding_length(self) -> usize {
        ((self.0 & Self::PADDING_MASK) >> Self::PADDING_SHIFT) as usize
    }

    /// Tail meta length.
    #[must_use]
    pub const fn tail_meta_length(self) -> usize {
        (self.0 & Self::TAIL_META_MASK) as usize
    }

    /// The reserved bits, which are zero in any valid descriptor.
    #[must_use]
    pub const fn reserved_bits(self) -> u32 {
        self.0 & Self::RESERVED_MASK
    }
}

/// Decoded trailer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailerCodeword {
    /// Stored trailer CRC.
    pub trailer_crc: u32,
    /// Frame descriptor.
    pub descriptor: FrameDescriptor,
    /// Caller-defined frame tag.
    pub tag: u32,
    /// Frame length repeated at the tail.
    pub tail_len: u32,
}

impl TrailerCodeword {
    /// Encoded size in bytes.
    pub const SIZE: usize = TRAILER_SIZE;

    /// Decodes all four fields without checking anything.
    #[must_use]
    pub fn parse(bytes: &[u8; TRAILER_SIZE]) -> Self {
        Self {
            trailer_crc: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            descriptor: FrameDescriptor::from_raw(u32::from_le_bytes([
                bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            tag: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            tail_len: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    /// Encodes a trailer and seals it with its CRC.
    #[must_use]
    pub fn encode(descriptor: FrameDescriptor, tag: u32, tail_len: u32) -> [u8; TRAILER_SIZE] {
        let mut bytes = [0u8; TRAILER_SIZE];
        bytes[4..8].copy_from_slice(&descriptor.raw().to_le_bytes());
        bytes[8..12].copy_from_slice(&tag.to_le_bytes());
        bytes[12..16].copy_from_slice(&tail_len.to_le_bytes());
        Self::seal(&mut bytes);
        bytes
    }

    /// Computes the CRC of bytes `[4..16)` and stores it big-endian in `[0..4)`.
    pub fn seal(bytes: &mut [u8; TRAILER_SIZE]) -> u32 {
        let crc = crc32c(&bytes[4..]);
        bytes[..4].copy_from_slice(&crc.to_be_bytes());
        crc
    }

    /// Returns `true` if the stored CRC matches bytes `[4..16)`.
    #[must_use]
    pub fn check_crc(bytes: &[u8; TRAILER_SIZE]) -> bool {
        Self::parse(bytes).trailer_crc == crc32c(&bytes[4..])
    }

    /// Decodes a trailer, verifying its CRC and reserved bits.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::CrcMismatch`] for a bad CRC and
    /// [`RbfError::Framing`] if reserved descriptor bits are set.
    pub fn parse_and_validate(bytes: &[u8; TRAILER_SIZE]) -> RbfResult<Self> {
        let trailer = Self::parse(bytes);
        let actual = crc32c(&bytes[4..]);
        if trailer.trailer_crc != actual {
            return Err(RbfError::crc_mismatch(
                CrcRegion::Trailer,
                trailer.trailer_crc,
                actual,
            ));
        }
        let reserved = trailer.descriptor.reserved_bits();
        if reserved != 0 {
            return Err(RbfError::framing(format!(
                "reserved descriptor bits set: {reserved:#010x}"
            )));
        }
        Ok(trailer)
    }

    /// Derives the payload length from `tail_len` and the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::Framing`] if the lengths do not add up.
    pub fn payload_length(&self) -> RbfResult<usize> {
        compute_payload_length(
            self.tail_len,
            self.descriptor.tail_meta_length(),
            self.descriptor.padding_length(),
        )
    }
}

/// `frame_length - 24 - tail_meta_length - padding_length`, or an error if negative.
///
/// # Errors
///
/// Returns [`RbfError::Framing`] when the subtraction would go below zero.
pub fn compute_payload_length(
    frame_length: u32,
    tail_meta_length: usize,
    padding_length: usize,
) -> RbfResult<usize> {
    (frame_length as usize)
        .checked_sub(FIXED_OVERHEAD)
        .and_then(|n| n.checked_sub(tail_meta_length))
        .and_then(|n| n.checked_sub(padding_length))
        .ok_or_else(|| {
            RbfError::framing(format!(
                "frame length {frame_length} too small for tail meta {tail_meta_length} \
                 and padding {padding_length}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn descriptor_bits() {
        let d = FrameDescriptor::new(true, 3, 0xFFFF).unwrap();
        assert_eq!(d.raw(), 0xE000_FFFF);
        assert!(d.is_tombstone());
        assert_eq!(d.padding_length(), 3);
        assert_eq!(d.tail_meta_length(), 0xFFFF);
        assert_eq!(d.reserved_bits(), 0);

        let d = FrameDescriptor::new(false, 1, 2).unwrap();
        assert_eq!(d.raw(), 0x2000_0002);
        assert!(!d.is_tombstone());
    }

    #[test]
    fn descriptor_rejects_out_of_range() {
        assert!(FrameDescriptor::new(false, 4, 0).is_err());
        assert!(FrameDescriptor::new(false, 0, 0x1_0000).is_err());
    }

    #[test]
    fn crc_is_big_endian() {
        let bytes = TrailerCodeword::encode(FrameDescriptor::from_raw(0), 0, 24);
        let crc = crc32c(&bytes[4..]);
        assert_eq!(&bytes[..4], &crc.to_be_bytes());
        assert_eq!(&bytes[12..], &24u32.to_le_bytes());
    }

    #[test]
    fn roundtrip_fields() {
        let descriptor = FrameDescriptor::new(false, 2, 10).unwrap();
        let bytes = TrailerCodeword::encode(descriptor, 0xAABB_CCDD, 40);
        let trailer = TrailerCodeword::parse_and_validate(&bytes).unwrap();
        assert_eq!(trailer.descriptor, descriptor);
        assert_eq!(trailer.tag, 0xAABB_CCDD);
        assert_eq!(trailer.tail_len, 40);
        assert_eq!(trailer.payload_length().unwrap(), 4);
    }

    #[test]
    fn reserved_bits_rejected_even_with_valid_crc() {
        let bytes = TrailerCodeword::encode(FrameDescriptor::from_raw(0x0001_0000), 1, 24);
        assert!(TrailerCodeword::check_crc(&bytes));
        let err = TrailerCodeword::parse_and_validate(&bytes).unwrap_err();
        assert!(matches!(err, RbfError::Framing { .. }));
    }

    #[test]
    fn negative_payload_length_rejected() {
        assert!(compute_payload_length(24, 1, 3).is_err());
        assert!(compute_payload_length(16, 0, 0).is_err());
        assert_eq!(compute_payload_length(28, 1, 3).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn any_single_bit_flip_is_detected(
            tag in any::<u32>(),
            meta in 0usize..=0xFFFF,
            bit in 0usize..(TRAILER_SIZE * 8),
        ) {
            let descriptor = FrameDescriptor::new(false, 0, meta).unwrap();
            let mut bytes = TrailerCodeword::encode(descriptor, tag, 24 + meta as u32);
            bytes[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(!TrailerCodeword::check_crc(&bytes));
            let err = TrailerCodeword::parse_and_validate(&bytes).unwrap_err();
            prop_assert!(
                matches!(err, RbfError::CrcMismatch { region: CrcRegion::Trailer, .. }),
                "unexpected error: {}",
                err
            );
        }
    }
}
