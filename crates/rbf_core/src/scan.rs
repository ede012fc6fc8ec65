//! Reverse scanning from the tail towards the header.

use crate::error::{RbfError, RbfResult};
use crate::file::RbfFile;
use crate::frame::RbfFrameInfo;
use crate::layout::HEADER_ONLY_LENGTH;
use crate::raw;
use std::iter::FusedIterator;
use tracing::{trace, warn};

/// A lazy walk over frames, newest first.
///
/// Each step reads only the 20 bytes before the current fence end (trailer
/// and fence), validates them, and jumps to the start of that frame. Payload
/// bytes are never read, so payload corruption is invisible here and only
/// surfaces through [`RbfFile::read_frame`].
///
/// # Error Handling
///
/// The walk never skips over damaged bytes. The first inconsistency (fence
/// mismatch, trailer CRC, reserved bits, implausible `TailLen`) ends the
/// iteration and is kept in [`terminal_error`](Self::terminal_error).
/// Frames yielded before that point are valid. Reaching the header ends the
/// walk cleanly with no error.
///
/// # Example
///
/// ```no_run
/// # use rbf_core::RbfFile;
/// # let file = RbfFile::open_existing("events.rbf")?;
/// let mut scan = file.scan_reverse(false);
/// let newest_first: Vec<_> = scan.by_ref().collect();
/// if let Some(err) = scan.terminal_error() {
///     eprintln!("scan stopped early at {}: {err}", scan.position());
/// }
/// # Ok::<(), rbf_core::RbfError>(())
/// ```
#[derive(Debug)]
pub struct ScanReverse<'a> {
    file: &'a RbfFile,
    fence_end: u64,
    show_tombstone: bool,
    terminal_error: Option<RbfError>,
    finished: bool,
}

impl<'a> ScanReverse<'a> {
    pub(crate) fn new(file: &'a RbfFile, fence_end: u64, show_tombstone: bool) -> Self {
        Self {
            file,
            fence_end,
            show_tombstone,
            terminal_error: None,
            finished: false,
        }
    }

    /// The error that stopped the walk, if any.
    #[must_use]
    pub fn terminal_error(&self) -> Option<&RbfError> {
        self.terminal_error.as_ref()
    }

    /// Takes ownership of the error that stopped the walk.
    pub fn take_terminal_error(&mut self) -> Option<RbfError> {
        self.terminal_error.take()
    }

    /// The fence end the next step will read before.
    ///
    /// After a hard stop this is where the damage was found.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.fence_end
    }

    /// Whether the walk has ended, cleanly or not.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drains the walk and returns every frame, or the terminal error.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the walk early.
    pub fn into_result(mut self) -> RbfResult<Vec<RbfFrameInfo>> {
        let frames: Vec<_> = self.by_ref().collect();
        match self.terminal_error.take() {
            Some(e) => Err(e),
            None => Ok(frames),
        }
    }

    fn stop(&mut self, error: RbfError) {
        warn!(fence_end = self.fence_end, error = %error, "reverse scan stopped");
        self.terminal_error = Some(error);
        self.finished = true;
    }
}

impl Iterator for ScanReverse<'_> {
    type Item = RbfFrameInfo;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if self.fence_end <= HEADER_ONLY_LENGTH {
                self.finished = true;
                return None;
            }

            let max_frame_length = self.file.config().max_frame_length;
            let fence_end = self.fence_end;
            let step = self.file.with_backend(|backend| {
                raw::read_trailer_before(backend, fence_end, max_frame_length)
            });

            match step {
                Ok(info) => {
                    self.fence_end = info.ticket().offset();
                    trace!(
                        offset = info.ticket().offset(),
                        length = info.ticket().length(),
                        tag = info.tag(),
                        "scanned frame"
                    );
                    if info.is_tombstone() && !self.show_tombstone {
                        continue;
                    }
                    return Some(info);
                }
                Err(e) => {
                    self.stop(e);
                    return None;
                }
            }
        }
    }
}

impl FusedIterator for ScanReverse<'_> {}
