//! Frame encoding and decoding against a storage backend.
//!
//! These functions know the byte layout but nothing about file state; the
//! [`RbfFile`](crate::RbfFile) handle checks state and then calls in here.

use crate::crc::{crc32c, Crc32c};
use crate::error::{CrcRegion, RbfError, RbfResult};
use crate::frame::{RbfFrame, RbfFrameInfo};
use crate::layout::{
    FrameLayout, FENCE, FENCE_SIZE, FIRST_FRAME_OFFSET, HEAD_LEN_SIZE, MIN_FIRST_FRAME_FENCE_END,
    MIN_FRAME_LENGTH, PAYLOAD_CRC_SIZE, TAIL_PROBE_SIZE, TRAILER_SIZE,
};
use crate::ticket::Ticket;
use crate::trailer::{FrameDescriptor, TrailerCodeword};
use rbf_storage::StorageBackend;

/// Frames up to this size (fence included) are assembled in memory and
/// written with a single call.
const SINGLE_WRITE_LIMIT: u64 = 4096;

const ZERO_PADDING: [u8; 3] = [0; 3];

/// Completes a staged frame in place and appends the trailing fence.
///
/// On entry `buf` holds `[HeadLen slot | payload | tail meta]`. On return it
/// holds the whole frame followed by a fence.
pub(crate) fn seal_frame(
    buf: &mut Vec<u8>,
    tag: u32,
    tail_meta_length: usize,
    is_tombstone: bool,
) -> RbfResult<FrameLayout> {
    let staged = buf.len() - HEAD_LEN_SIZE;
    if tail_meta_length > staged {
        return Err(RbfError::invalid_argument(format!(
            "tail meta length {tail_meta_length} exceeds {staged} staged bytes"
        )));
    }
    let layout = FrameLayout::new(staged - tail_meta_length, tail_meta_length)?;
    let descriptor = FrameDescriptor::new(is_tombstone, layout.padding_length(), tail_meta_length)?;
    let frame_length = layout.frame_length();

    buf.reserve(layout.padding_length() + PAYLOAD_CRC_SIZE + TRAILER_SIZE + FENCE_SIZE);
    buf.extend_from_slice(&ZERO_PADDING[..layout.padding_length()]);
    let payload_crc = crc32c(&buf[HEAD_LEN_SIZE..]);
    buf.extend_from_slice(&payload_crc.to_le_bytes());
    buf.extend_from_slice(&TrailerCodeword::encode(descriptor, tag, frame_length));
    buf.extend_from_slice(&FENCE);
    buf[..HEAD_LEN_SIZE].copy_from_slice(&frame_length.to_le_bytes());

    Ok(layout)
}

/// Writes one frame plus its fence at `offset` and returns its ticket.
///
/// Fields are written in file order: `HeadLen`, payload, tail meta, padding,
/// `PayloadCrc`, trailer, fence.
pub(crate) fn append_frame(
    backend: &dyn StorageBackend,
    offset: u64,
    tag: u32,
    payload: &[u8],
    tail_meta: &[u8],
    is_tombstone: bool,
) -> RbfResult<Ticket> {
    let layout = FrameLayout::new(payload.len(), tail_meta.len())?;
    let ticket = Ticket::new(offset, layout.frame_length())?;

    if layout.frame_length_with_fence() <= SINGLE_WRITE_LIMIT {
        let mut buf = Vec::with_capacity(layout.frame_length_with_fence() as usize);
        buf.extend_from_slice(&[0u8; HEAD_LEN_SIZE]);
        buf.extend_from_slice(payload);
        buf.extend_from_slice(tail_meta);
        seal_frame(&mut buf, tag, tail_meta.len(), is_tombstone)?;
        backend.write_at(offset, &buf)?;
        return Ok(ticket);
    }

    // Large payloads are written straight from the caller's slice.
    let padding = &ZERO_PADDING[..layout.padding_length()];
    let mut crc = Crc32c::new();
    crc.update(payload);
    crc.update(tail_meta);
    crc.update(padding);

    let descriptor = FrameDescriptor::new(is_tombstone, padding.len(), tail_meta.len())?;
    let mut tail = Vec::with_capacity(
        tail_meta.len() + padding.len() + PAYLOAD_CRC_SIZE + TRAILER_SIZE + FENCE_SIZE,
    );
    tail.extend_from_slice(tail_meta);
    tail.extend_from_slice(padding);
    tail.extend_from_slice(&crc.finalize().to_le_bytes());
    tail.extend_from_slice(&TrailerCodeword::encode(descriptor, tag, layout.frame_length()));
    tail.extend_from_slice(&FENCE);

    backend.write_at(offset, &layout.frame_length().to_le_bytes())?;
    backend.write_at(offset + HEAD_LEN_SIZE as u64, payload)?;
    backend.write_at(offset + layout.tail_meta_offset() as u64, &tail)?;
    Ok(ticket)
}

/// Reads and fully verifies the frame at `ticket` into `buf`, returning a
/// view whose slices borrow from `buf`.
pub(crate) fn read_frame<'b>(
    backend: &dyn StorageBackend,
    ticket: Ticket,
    buf: &'b mut [u8],
) -> RbfResult<RbfFrame<'b>> {
    let info = read_frame_bytes(backend, ticket, buf)?;
    let bytes: &'b [u8] = buf;
    let meta_start = HEAD_LEN_SIZE + info.payload_length();
    Ok(RbfFrame::new(
        ticket,
        info.tag(),
        &bytes[HEAD_LEN_SIZE..meta_start],
        &bytes[meta_start..meta_start + info.tail_meta_length()],
        info.is_tombstone(),
    ))
}

/// Reads the frame described by `info` into `buf`, trusting its trailer
/// fields. Only `HeadLen` and `PayloadCrc` are checked.
pub(crate) fn read_frame_with_info<'b>(
    backend: &dyn StorageBackend,
    info: &RbfFrameInfo,
    buf: &'b mut [u8],
) -> RbfResult<RbfFrame<'b>> {
    let ticket = info.ticket();
    let meta_start = HEAD_LEN_SIZE + info.payload_length();
    let meta_end = meta_start + info.tail_meta_length();
    if meta_end + PAYLOAD_CRC_SIZE + TRAILER_SIZE > ticket.length() as usize {
        return Err(RbfError::invalid_argument(format!(
            "frame info for {ticket} does not fit its ticket"
        )));
    }
    let bytes = read_image(backend, ticket, buf)?;
    check_head_len(ticket, bytes)?;
    check_payload_crc(bytes)?;

    let bytes: &'b [u8] = bytes;
    Ok(RbfFrame::new(
        ticket,
        info.tag(),
        &bytes[HEAD_LEN_SIZE..meta_start],
        &bytes[meta_start..meta_end],
        info.is_tombstone(),
    ))
}

/// Reads the frame at `ticket` into the front of `buf` and verifies it.
pub(crate) fn read_frame_bytes(
    backend: &dyn StorageBackend,
    ticket: Ticket,
    buf: &mut [u8],
) -> RbfResult<RbfFrameInfo> {
    let bytes = read_image(backend, ticket, buf)?;
    verify_frame(ticket, bytes)
}

/// Reads the `ticket.length()` bytes of a frame into the front of `buf`.
fn read_image<'b>(
    backend: &dyn StorageBackend,
    ticket: Ticket,
    buf: &'b mut [u8],
) -> RbfResult<&'b mut [u8]> {
    if ticket.length() < MIN_FRAME_LENGTH {
        return Err(RbfError::invalid_argument(format!(
            "ticket length {} is below the minimum frame length {MIN_FRAME_LENGTH}",
            ticket.length()
        )));
    }
    let len = ticket.length() as usize;
    if buf.len() < len {
        return Err(RbfError::BufferTooSmall {
            required: len,
            provided: buf.len(),
        });
    }
    let bytes = &mut buf[..len];
    let read = backend.read_at(ticket.offset(), bytes)?;
    if read < len {
        return Err(RbfError::invalid_argument(format!(
            "short read: ticket {ticket} runs past end of file ({read} of {len} bytes)"
        )));
    }
    Ok(bytes)
}

/// Checks `HeadLen`, trailer, `TailLen` and `PayloadCrc` of a frame image.
fn verify_frame(ticket: Ticket, bytes: &[u8]) -> RbfResult<RbfFrameInfo> {
    let len = bytes.len();
    let head_len = check_head_len(ticket, bytes)?;

    let trailer = TrailerCodeword::parse_and_validate(&trailer_at(bytes, len - TRAILER_SIZE))?;
    if trailer.tail_len != head_len {
        return Err(RbfError::framing(format!(
            "TailLen mismatch at {}: HeadLen {head_len}, TailLen {}",
            ticket.offset(),
            trailer.tail_len
        )));
    }
    let payload_length = trailer.payload_length()?;
    check_payload_crc(bytes)?;

    Ok(RbfFrameInfo::new(
        ticket,
        trailer.tag,
        payload_length,
        trailer.descriptor.tail_meta_length(),
        trailer.descriptor.is_tombstone(),
    ))
}

fn check_head_len(ticket: Ticket, bytes: &[u8]) -> RbfResult<u32> {
    let head_len = read_u32_le(bytes, 0);
    if head_len != ticket.length() {
        return Err(RbfError::framing(format!(
            "HeadLen mismatch at {}: stored {head_len}, ticket {}",
            ticket.offset(),
            ticket.length()
        )));
    }
    Ok(head_len)
}

fn check_payload_crc(bytes: &[u8]) -> RbfResult<()> {
    let crc_offset = bytes.len() - TRAILER_SIZE - PAYLOAD_CRC_SIZE;
    let expected = read_u32_le(bytes, crc_offset);
    let actual = crc32c(&bytes[HEAD_LEN_SIZE..crc_offset]);
    if expected != actual {
        return Err(RbfError::crc_mismatch(CrcRegion::Payload, expected, actual));
    }
    Ok(())
}

/// Reads only the trailer of the frame at `ticket`.
pub(crate) fn read_frame_info(
    backend: &dyn StorageBackend,
    ticket: Ticket,
) -> RbfResult<RbfFrameInfo> {
    if ticket.length() < MIN_FRAME_LENGTH {
        return Err(RbfError::invalid_argument(format!(
            "ticket length {} is below the minimum frame length {MIN_FRAME_LENGTH}",
            ticket.length()
        )));
    }
    let mut bytes = [0u8; TRAILER_SIZE];
    let offset = ticket.end_offset() - TRAILER_SIZE as u64;
    let read = backend.read_at(offset, &mut bytes)?;
    if read < TRAILER_SIZE {
        return Err(RbfError::invalid_argument(format!(
            "short read: ticket {ticket} runs past end of file"
        )));
    }

    let trailer = TrailerCodeword::parse_and_validate(&bytes)?;
    if trailer.tail_len != ticket.length() {
        return Err(RbfError::framing(format!(
            "TailLen mismatch at {}: ticket {}, TailLen {}",
            ticket.offset(),
            ticket.length(),
            trailer.tail_len
        )));
    }
    Ok(RbfFrameInfo::new(
        ticket,
        trailer.tag,
        trailer.payload_length()?,
        trailer.descriptor.tail_meta_length(),
        trailer.descriptor.is_tombstone(),
    ))
}

/// Decodes the frame that ends just before the fence ending at `fence_end`.
///
/// Only the trailer and fence are read. Any inconsistency is reported as an
/// error, never skipped.
pub(crate) fn read_trailer_before(
    backend: &dyn StorageBackend,
    fence_end: u64,
    max_frame_length: u32,
) -> RbfResult<RbfFrameInfo> {
    if fence_end < MIN_FIRST_FRAME_FENCE_END {
        return Err(RbfError::framing(format!(
            "no room for a frame before offset {fence_end}"
        )));
    }
    let mut probe = [0u8; TAIL_PROBE_SIZE];
    let probe_start = fence_end - TAIL_PROBE_SIZE as u64;
    let read = backend.read_at(probe_start, &mut probe)?;
    if read < TAIL_PROBE_SIZE {
        return Err(RbfError::framing(format!(
            "short read at {probe_start}: {read} of {TAIL_PROBE_SIZE} bytes"
        )));
    }
    if probe[TRAILER_SIZE..] != FENCE {
        return Err(RbfError::framing(format!(
            "fence mismatch at {}",
            fence_end - FENCE_SIZE as u64
        )));
    }

    let trailer = TrailerCodeword::parse_and_validate(&trailer_at(&probe, 0))?;
    let tail_len = trailer.tail_len;
    if tail_len < MIN_FRAME_LENGTH || tail_len % 4 != 0 || tail_len > max_frame_length {
        return Err(RbfError::framing(format!(
            "implausible TailLen {tail_len} before offset {fence_end}"
        )));
    }
    let frame_start = (fence_end - FENCE_SIZE as u64)
        .checked_sub(u64::from(tail_len))
        .filter(|&start| start >= FIRST_FRAME_OFFSET)
        .ok_or_else(|| {
            RbfError::framing(format!(
                "TailLen {tail_len} before offset {fence_end} reaches into the header"
            ))
        })?;
    let payload_length = trailer.payload_length()?;
    let ticket = Ticket::new(frame_start, tail_len)
        .map_err(|_| RbfError::framing(format!("frame at {frame_start} is not addressable")))?;

    Ok(RbfFrameInfo::new(
        ticket,
        trailer.tag,
        payload_length,
        trailer.descriptor.tail_meta_length(),
        trailer.descriptor.is_tombstone(),
    ))
}

/// Reads the tail meta described by `info` into the front of `buf`.
pub(crate) fn read_tail_meta<'b>(
    backend: &dyn StorageBackend,
    info: &RbfFrameInfo,
    buf: &'b mut [u8],
) -> RbfResult<&'b [u8]> {
    let len = info.tail_meta_length();
    if buf.len() < len {
        return Err(RbfError::BufferTooSmall {
            required: len,
            provided: buf.len(),
        });
    }
    if len == 0 {
        return Ok(&buf[..0]);
    }
    let read = backend.read_at(info.tail_meta_offset(), &mut buf[..len])?;
    if read < len {
        return Err(RbfError::invalid_argument(format!(
            "short read: tail meta of {} runs past end of file",
            info.ticket()
        )));
    }
    Ok(&buf[..len])
}

fn read_u32_le(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn trailer_at(bytes: &[u8], at: usize) -> [u8; TRAILER_SIZE] {
    let mut out = [0u8; TRAILER_SIZE];
    out.copy_from_slice(&bytes[at..at + TRAILER_SIZE]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbf_storage::InMemoryBackend;

    fn backend_with_header() -> InMemoryBackend {
        InMemoryBackend::with_data(FENCE.to_vec())
    }

    #[test]
    fn empty_frame_bytes() {
        let backend = backend_with_header();
        let ticket = append_frame(&backend, 4, 0, b"", b"", false).unwrap();
        assert_eq!(ticket, Ticket::new(4, 24).unwrap());

        let data = backend.data();
        assert_eq!(data.len(), 4 + 24 + 4);
        assert_eq!(&data[4..8], &24u32.to_le_bytes());
        // CRC32C of nothing is zero.
        assert_eq!(&data[8..12], &[0, 0, 0, 0]);
        assert_eq!(&data[24..28], &24u32.to_le_bytes());
        assert_eq!(&data[28..], b"RBF1");
    }

    #[test]
    fn small_frame_roundtrip() {
        let backend = backend_with_header();
        let ticket = append_frame(&backend, 4, 7, b"hello", b"mt", false).unwrap();
        assert_eq!(ticket.length(), 32);

        let mut buf = vec![0u8; 64];
        let frame = read_frame(&backend, ticket, &mut buf).unwrap();
        assert_eq!(frame.tag(), 7);
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(frame.tail_meta(), b"mt");
        assert!(!frame.is_tombstone());
    }

    #[test]
    fn large_frame_written_in_pieces_reads_back() {
        let backend = backend_with_header();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let ticket = append_frame(&backend, 4, 1, &payload, b"abc", true).unwrap();

        let mut buf = vec![0u8; ticket.length() as usize];
        let frame = read_frame(&backend, ticket, &mut buf).unwrap();
        assert_eq!(frame.payload(), payload.as_slice());
        assert_eq!(frame.tail_meta(), b"abc");
        assert!(frame.is_tombstone());
        assert_eq!(backend.size().unwrap(), ticket.end_offset() + 4);
    }

    #[test]
    fn seal_matches_direct_append() {
        let direct = backend_with_header();
        append_frame(&direct, 4, 9, b"xyz", b"q", false).unwrap();

        let mut buf = vec![0u8; HEAD_LEN_SIZE];
        buf.extend_from_slice(b"xyzq");
        seal_frame(&mut buf, 9, 1, false).unwrap();
        assert_eq!(&direct.data()[4..], buf.as_slice());
    }

    #[test]
    fn read_frame_argument_checks() {
        let backend = backend_with_header();
        let ticket = append_frame(&backend, 4, 0, b"abcd", b"", false).unwrap();

        let mut small = [0u8; 8];
        let err = read_frame(&backend, ticket, &mut small).unwrap_err();
        assert!(matches!(
            err,
            RbfError::BufferTooSmall {
                required: 28,
                provided: 8
            }
        ));

        let mut buf = [0u8; 64];
        let short = Ticket::new(4, 20).unwrap();
        assert!(matches!(
            read_frame(&backend, short, &mut buf),
            Err(RbfError::InvalidArgument { .. })
        ));

        let past_end = Ticket::new(4, 60).unwrap();
        assert!(matches!(
            read_frame(&backend, past_end, &mut buf),
            Err(RbfError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn payload_corruption_detected() {
        let backend = backend_with_header();
        let ticket = append_frame(&backend, 4, 0, b"abcd", b"", false).unwrap();
        backend.mutate_byte(9, |b| b ^ 1);

        let mut buf = [0u8; 64];
        let err = read_frame(&backend, ticket, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            RbfError::CrcMismatch {
                region: CrcRegion::Payload,
                ..
            }
        ));
        // The trailer alone is still fine.
        assert!(read_frame_info(&backend, ticket).is_ok());
    }

    #[test]
    fn head_len_mismatch_detected() {
        let backend = backend_with_header();
        append_frame(&backend, 4, 0, b"abcd", b"", false).unwrap();
        let wrong = Ticket::new(4, 24).unwrap();

        let mut buf = [0u8; 64];
        let err = read_frame(&backend, wrong, &mut buf).unwrap_err();
        assert!(err.to_string().contains("HeadLen mismatch"));
    }

    #[test]
    fn trailer_before_fence() {
        let backend = backend_with_header();
        let first = append_frame(&backend, 4, 1, b"one", b"", false).unwrap();
        let second = append_frame(&backend, first.end_offset() + 4, 2, b"two!", b"m", false).unwrap();

        let info = read_trailer_before(&backend, second.end_offset() + 4, MAX_TEST_FRAME).unwrap();
        assert_eq!(info.ticket(), second);
        assert_eq!(info.tag(), 2);
        assert_eq!(info.payload_length(), 4);
        assert_eq!(info.tail_meta_length(), 1);

        let info = read_trailer_before(&backend, first.end_offset() + 4, MAX_TEST_FRAME).unwrap();
        assert_eq!(info.ticket(), first);
    }

    #[test]
    fn trailer_before_rejects_bad_fence_and_large_tail_len() {
        let backend = backend_with_header();
        let ticket = append_frame(&backend, 4, 1, b"abcdefgh", b"", false).unwrap();
        let fence_end = ticket.end_offset() + 4;

        assert!(read_trailer_before(&backend, fence_end, 24).is_err());
        assert!(read_trailer_before(&backend, 20, MAX_TEST_FRAME).is_err());

        backend.mutate_byte(fence_end - 1, |_| b'X');
        let err = read_trailer_before(&backend, fence_end, MAX_TEST_FRAME).unwrap_err();
        assert!(err.to_string().contains("fence mismatch"));
    }

    #[test]
    fn tail_meta_only() {
        let backend = backend_with_header();
        let ticket = append_frame(&backend, 4, 1, b"payload", b"META", false).unwrap();
        let info = read_frame_info(&backend, ticket).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(read_tail_meta(&backend, &info, &mut buf).unwrap(), b"META");

        let mut tiny = [0u8; 2];
        assert!(matches!(
            read_tail_meta(&backend, &info, &mut tiny),
            Err(RbfError::BufferTooSmall { .. })
        ));
    }

    const MAX_TEST_FRAME: u32 = crate::layout::MAX_FRAME_LENGTH;
}
