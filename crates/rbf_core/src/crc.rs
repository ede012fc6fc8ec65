//! CRC32C (Castagnoli) checksums.
//!
//! Reflected polynomial `0x82F63B78`, register initialised to `0xFFFFFFFF`,
//! final XOR `0xFFFFFFFF`. Hardware acceleration comes from the `crc32c`
//! crate.

/// Computes the CRC32C of `data` in one call.
#[inline]
#[must_use]
pub fn crc32c(data: &[u8]) -> u32 {
    ::crc32c::crc32c(data)
}

/// Incremental CRC32C over a sequence of byte slices.
///
/// Feeding the same bytes in any split yields the same result as [`crc32c`].
///
/// ```
/// use rbf_core::crc::Crc32c;
///
/// let mut crc = Crc32c::new();
/// crc.update(b"1234");
/// crc.update(b"56789");
/// assert_eq!(crc.finalize(), 0xE306_9283);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32c {
    value: u32,
}

impl Crc32c {
    /// Starts a new checksum.
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Feeds `data` into the checksum.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.value = ::crc32c::crc32c_append(self.value, data);
    }

    /// Returns the checksum of everything fed so far.
    #[must_use]
    pub const fn finalize(self) -> u32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reference(data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in data {
            crc ^= u32::from(byte);
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0x82F6_3B78
                } else {
                    crc >> 1
                };
            }
        }
        crc ^ 0xFFFF_FFFF
    }

    #[test]
    fn check_value() {
        assert_eq!(crc32c(b"123456789"), 0xE306_9283);
        assert_eq!(reference(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn empty_input() {
        assert_eq!(crc32c(b""), 0);
        assert_eq!(Crc32c::new().finalize(), 0);
    }

    #[test]
    fn single_bit_flip_changes_crc() {
        let data = vec![0xA5u8; 64];
        let mut flipped = data.clone();
        flipped[17] ^= 0x04;
        assert_ne!(crc32c(&data), crc32c(&flipped));
    }

    proptest! {
        #[test]
        fn matches_bitwise_reference(data in prop::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(crc32c(&data), reference(&data));
        }

        #[test]
        fn split_invariance(
            data in prop::collection::vec(any::<u8>(), 0..512),
            cut in any::<prop::sample::Index>(),
        ) {
            let at = cut.index(data.len() + 1);
            let mut crc = Crc32c::new();
            crc.update(&data[..at]);
            crc.update(&data[at..]);
            prop_assert_eq!(crc.finalize(), crc32c(&data));
        }
    }
}
