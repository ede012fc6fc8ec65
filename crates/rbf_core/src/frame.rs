//! Frame views returned by reads and scans.

use crate::error::RbfResult;
use crate::file::RbfFile;
use crate::layout::HEAD_LEN_SIZE;
use crate::pool::PooledTailMeta;
use crate::ticket::Ticket;

/// A verified frame borrowed from a caller-provided buffer.
///
/// Produced only after `HeadLen`, the trailer and `PayloadCrc` all check out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RbfFrame<'a> {
    ticket: Ticket,
    tag: u32,
    payload: &'a [u8],
    tail_meta: &'a [u8],
    is_tombstone: bool,
}

impl<'a> RbfFrame<'a> {
    pub(crate) const fn new(
        ticket: Ticket,
        tag: u32,
        payload: &'a [u8],
        tail_meta: &'a [u8],
        is_tombstone: bool,
    ) -> Self {
        Self {
            ticket,
            tag,
            payload,
            tail_meta,
            is_tombstone,
        }
    }

    /// Where the frame lives.
    #[must_use]
    pub const fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Caller-defined tag.
    #[must_use]
    pub const fn tag(&self) -> u32 {
        self.tag
    }

    /// Payload bytes.
    #[must_use]
    pub const fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Tail meta bytes.
    #[must_use]
    pub const fn tail_meta(&self) -> &'a [u8] {
        self.tail_meta
    }

    /// Whether this frame is a tombstone.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.is_tombstone
    }
}

/// Frame metadata decoded from a validated trailer.
///
/// Cheap to copy; carries no bytes of the frame body. The payload itself has
/// not been checked, so [`RbfFile::read_frame_with_info`] still verifies
/// `PayloadCrc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RbfFrameInfo {
    ticket: Ticket,
    tag: u32,
    payload_length: usize,
    tail_meta_length: usize,
    is_tombstone: bool,
}

impl RbfFrameInfo {
    pub(crate) const fn new(
        ticket: Ticket,
        tag: u32,
        payload_length: usize,
        tail_meta_length: usize,
        is_tombstone: bool,
    ) -> Self {
        Self {
            ticket,
            tag,
            payload_length,
            tail_meta_length,
            is_tombstone,
        }
    }

    /// Where the frame lives.
    #[must_use]
    pub const fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Caller-defined tag.
    #[must_use]
    pub const fn tag(&self) -> u32 {
        self.tag
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

    /// Whether this frame is a tombstone.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.is_tombstone
    }

    /// Absolute file offset of the tail meta.
    #[must_use]
    pub const fn tail_meta_offset(&self) -> u64 {
        self.ticket.offset() + (HEAD_LEN_SIZE + self.payload_length) as u64
    }

    /// Reads just the tail meta into `buf`. See [`RbfFile::read_tail_meta`].
    ///
    /// # Errors
    ///
    /// Same as [`RbfFile::read_tail_meta`].
    pub fn read_tail_meta<'b>(&self, file: &RbfFile, buf: &'b mut [u8]) -> RbfResult<&'b [u8]> {
        file.read_tail_meta(self, buf)
    }

    /// Reads just the tail meta into a pooled buffer.
    ///
    /// # Errors
    ///
    /// Same as [`RbfFile::read_pooled_tail_meta`].
    pub fn read_pooled_tail_meta(&self, file: &RbfFile) -> RbfResult<PooledTailMeta> {
        file.read_pooled_tail_meta(self)
    }
}
