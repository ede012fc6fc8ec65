//! Staged, abortable frame construction.

use crate::error::{RbfError, RbfResult};
use crate::file::RbfFile;
use crate::layout::{FrameLayout, HEAD_LEN_SIZE};
use crate::raw;
use crate::ticket::Ticket;
use crate::writer::ReservableWriter;
use tracing::debug;

/// Builds one frame in memory, then commits or discards it.
///
/// Obtained from [`RbfFile::begin_append`]. Payload and tail meta are
/// written back to back into [`payload_and_meta`](Self::payload_and_meta);
/// [`end_append`](Self::end_append) says how many trailing bytes are tail
/// meta.
///
/// Abort performs no I/O: staged bytes never reach the file, so an aborted
/// frame leaves no trace. Dropping an unfinished builder aborts it.
///
/// ```
/// use rbf_core::{RbfConfig, RbfFile};
/// use rbf_storage::InMemoryBackend;
///
/// let file = RbfFile::create_with_backend(Box::new(InMemoryBackend::new()), RbfConfig::default())?;
/// let mut builder = file.begin_append()?;
/// let writer = builder.payload_and_meta()?;
/// let count = writer.reserve_span(4)?;
/// writer.write_bytes(b"abc")?;
/// writer.reserved_mut(&count)?.copy_from_slice(&3u32.to_le_bytes());
/// writer.commit(count)?;
/// let ticket = builder.end_append(0x10, 0)?;
/// assert_eq!(ticket.length(), 32);
/// # Ok::<(), rbf_core::RbfError>(())
/// ```
#[derive(Debug)]
pub struct RbfFrameBuilder<'a> {
    file: &'a RbfFile,
    writer: Option<ReservableWriter>,
    start_offset: u64,
}

impl<'a> RbfFrameBuilder<'a> {
    pub(crate) fn new(file: &'a RbfFile, start_offset: u64, capacity: usize) -> Self {
        Self {
            file,
            writer: Some(ReservableWriter::with_prefix(capacity, HEAD_LEN_SIZE)),
            start_offset,
        }
    }

    /// Offset the frame will start at if committed.
    #[must_use]
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Whether the builder can still accept bytes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// The staging writer for payload followed by tail meta.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidOperation`] once the builder has been
    /// committed or aborted.
    pub fn payload_and_meta(&mut self) -> RbfResult<&mut ReservableWriter> {
        self.writer
            .as_mut()
            .ok_or_else(|| RbfError::invalid_operation("frame builder is already finished"))
    }

    /// Seals and writes the staged frame; the last `tail_meta_length`
    /// staged bytes become the tail meta.
    ///
    /// # Errors
    ///
    /// - [`RbfError::InvalidOperation`] if already finished or a reservation
    ///   is still outstanding
    /// - [`RbfError::InvalidArgument`] if `tail_meta_length` exceeds the
    ///   staged bytes or 65535, or the frame is too large
    ///
    /// The builder stays open after either of these, so the caller can fix
    /// the input or abort. An I/O failure finishes the builder and leaves
    /// the file tail unchanged.
    pub fn end_append(&mut self, tag: u32, tail_meta_length: usize) -> RbfResult<Ticket> {
        self.finish(tag, tail_meta_length, false)
    }

    /// Like [`end_append`](Self::end_append) but marks the frame as a
    /// tombstone.
    ///
    /// # Errors
    ///
    /// Same as [`end_append`](Self::end_append).
    pub fn end_append_tombstone(&mut self, tag: u32, tail_meta_length: usize) -> RbfResult<Ticket> {
        self.finish(tag, tail_meta_length, true)
    }

    fn finish(&mut self, tag: u32, tail_meta_length: usize, is_tombstone: bool) -> RbfResult<Ticket> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| RbfError::invalid_operation("frame builder is already finished"))?;
        if writer.has_active_span() {
            return Err(RbfError::invalid_operation(
                "span lent by get_span was not advanced",
            ));
        }
        let pending = writer.pending_reservations();
        if pending > 0 {
            return Err(RbfError::invalid_operation(format!(
                "{pending} reservation(s) not committed"
            )));
        }
        let staged = writer.written_len();
        if tail_meta_length > staged {
            return Err(RbfError::invalid_argument(format!(
                "tail meta length {tail_meta_length} exceeds {staged} staged bytes"
            )));
        }
        let layout = FrameLayout::new(staged - tail_meta_length, tail_meta_length)?;
        self.file.check_frame_length(layout.frame_length())?;
        let ticket = Ticket::new(self.start_offset, layout.frame_length())?;

        let Some(writer) = self.writer.take() else {
            return Err(RbfError::invalid_operation("frame builder is already finished"));
        };
        let mut image = writer.into_buffer();
        let result = raw::seal_frame(&mut image, tag, tail_meta_length, is_tombstone)
            .and_then(|_| self.file.commit_built(ticket, &image));
        self.file.release_builder();
        result
    }

    /// Discards the staged bytes. Calling this more than once is harmless.
    pub fn abort(&mut self) {
        if let Some(writer) = self.writer.take() {
            debug!(
                offset = self.start_offset,
                staged = writer.written_len(),
                "aborted frame builder"
            );
            self.file.release_builder();
        }
    }
}

impl Drop for RbfFrameBuilder<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}
