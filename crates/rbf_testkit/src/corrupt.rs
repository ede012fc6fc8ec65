//! Byte-level corruption helpers.
//!
//! Tests name the part of a frame they want to damage with a
//! [`FrameRegion`] and let [`region_offset`] find the absolute byte.

use rbf_core::layout::{FrameLayout, FENCE_SIZE, HEAD_LEN_SIZE, PAYLOAD_CRC_SIZE};
use rbf_core::RbfFrameInfo;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A field of a frame or the fence that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRegion {
    /// Leading length field.
    HeadLen,
    /// Payload bytes.
    Payload,
    /// Tail meta bytes.
    TailMeta,
    /// Zero padding.
    Padding,
    /// CRC over payload, tail meta and padding.
    PayloadCrc,
    /// Big-endian CRC at the start of the trailer.
    TrailerCrc,
    /// Descriptor word in the trailer.
    Descriptor,
    /// Tag word in the trailer.
    Tag,
    /// Trailing length field.
    TailLen,
    /// The fence after the frame.
    Fence,
}

impl FrameRegion {
    /// Every region, in file order.
    pub const ALL: [Self; 10] = [
        Self::HeadLen,
        Self::Payload,
        Self::TailMeta,
        Self::Padding,
        Self::PayloadCrc,
        Self::TrailerCrc,
        Self::Descriptor,
        Self::Tag,
        Self::TailLen,
        Self::Fence,
    ];

    /// Whether damage here is caught by the reverse scanner.
    pub fn visible_to_scan(self) -> bool {
        matches!(
            self,
            Self::TrailerCrc | Self::Descriptor | Self::Tag | Self::TailLen | Self::Fence
        )
    }

    /// Whether damage here is covered by `PayloadCrc`.
    pub fn covered_by_payload_crc(self) -> bool {
        matches!(self, Self::Payload | Self::TailMeta | Self::Padding)
    }
}

/// Absolute offset of byte `index` within `region` of the frame `info`.
///
/// Returns `None` if the region is shorter than `index + 1` bytes.
pub fn region_offset(info: &RbfFrameInfo, region: FrameRegion, index: usize) -> Option<u64> {
    let layout = FrameLayout::new(info.payload_length(), info.tail_meta_length()).ok()?;
    let (start, len) = match region {
        FrameRegion::HeadLen => (0, HEAD_LEN_SIZE),
        FrameRegion::Payload => (layout.payload_offset(), layout.payload_length()),
        FrameRegion::TailMeta => (layout.tail_meta_offset(), layout.tail_meta_length()),
        FrameRegion::Padding => (layout.padding_offset(), layout.padding_length()),
        FrameRegion::PayloadCrc => (layout.payload_crc_offset(), PAYLOAD_CRC_SIZE),
        FrameRegion::TrailerCrc => (layout.trailer_offset(), 4),
        FrameRegion::Descriptor => (layout.trailer_offset() + 4, 4),
        FrameRegion::Tag => (layout.trailer_offset() + 8, 4),
        FrameRegion::TailLen => (layout.trailer_offset() + 12, 4),
        FrameRegion::Fence => (layout.frame_length() as usize, FENCE_SIZE),
    };
    (index < len).then(|| info.ticket().offset() + (start + index) as u64)
}

/// XORs one byte of a file on disk with `mask`.
pub fn flip_byte_in_file(path: &Path, offset: u64, mask: u8) {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .expect("Failed to open file for corruption");
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).expect("Failed to seek");
    file.read_exact(&mut byte).expect("Offset is past the end of the file");
    byte[0] ^= mask;
    file.seek(SeekFrom::Start(offset)).expect("Failed to seek");
    file.write_all(&byte).expect("Failed to write corrupted byte");
    file.sync_all().expect("Failed to sync corrupted file");
}

/// Appends raw bytes to a file on disk, simulating a torn write.
pub fn append_garbage_to_file(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("Failed to open file for appending garbage");
    file.write_all(bytes).expect("Failed to append garbage");
    file.sync_all().expect("Failed to sync file");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestLog;

    #[test]
    fn region_offsets_cover_the_frame() {
        let log = TestLog::memory();
        let ticket = log.append(1, b"abc", b"xy").unwrap();
        let info = log.read_frame_info(ticket).unwrap();

        assert_eq!(region_offset(&info, FrameRegion::HeadLen, 0), Some(4));
        assert_eq!(region_offset(&info, FrameRegion::Payload, 0), Some(8));
        assert_eq!(region_offset(&info, FrameRegion::TailMeta, 1), Some(12));
        assert_eq!(region_offset(&info, FrameRegion::Padding, 2), Some(15));
        assert_eq!(region_offset(&info, FrameRegion::Padding, 3), None);
        assert_eq!(region_offset(&info, FrameRegion::PayloadCrc, 0), Some(16));
        assert_eq!(region_offset(&info, FrameRegion::TrailerCrc, 0), Some(20));
        assert_eq!(region_offset(&info, FrameRegion::TailLen, 3), Some(35));
        assert_eq!(region_offset(&info, FrameRegion::Fence, 0), Some(36));
        assert_eq!(region_offset(&info, FrameRegion::Fence, 3), Some(39));
    }

    #[test]
    fn empty_regions_have_no_offsets() {
        let log = TestLog::memory();
        let ticket = log.append(1, b"", b"").unwrap();
        let info = log.read_frame_info(ticket).unwrap();
        assert_eq!(region_offset(&info, FrameRegion::Payload, 0), None);
        assert_eq!(region_offset(&info, FrameRegion::TailMeta, 0), None);
        assert_eq!(region_offset(&info, FrameRegion::Padding, 0), None);
    }

    #[test]
    fn garbage_appended_on_disk() {
        let log = TestLog::file();
        let path = log.path().unwrap().to_path_buf();
        append_garbage_to_file(&path, &[1, 2, 3]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 7);
    }
}
