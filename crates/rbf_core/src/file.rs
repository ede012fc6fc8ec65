//! The RBF file handle.
//!
//! [`RbfFile`] is the single owner of one log file. It tracks the tail
//! offset, enforces the one-open-builder rule and routes reads, appends,
//! scans and truncation to the raw codec.

use crate::builder::RbfFrameBuilder;
use crate::config::RbfConfig;
use crate::error::{RbfError, RbfResult};
use crate::frame::{RbfFrame, RbfFrameInfo};
use crate::layout::{is_aligned, FrameLayout, FENCE, FENCE_SIZE, HEADER_ONLY_LENGTH};
use crate::pool::{BufferPool, PooledFrame, PooledTailMeta};
use crate::raw;
use crate::scan::ScanReverse;
use crate::ticket::Ticket;
use rbf_storage::{FileBackend, StorageBackend, StorageError};
use std::cell::{Cell, RefCell};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Idle,
    Building,
    Closed,
}

/// An open RBF file.
///
/// # Ownership
///
/// A handle has exactly one logical owner. Methods take `&self` so a
/// [`RbfFrameBuilder`] can borrow the file while it stages a frame, but the
/// handle is not `Sync`: one thread drives it at a time.
///
/// # Lifecycle
///
/// `Idle -> Building -> Idle` around each builder, and `Closed` after
/// [`close`](Self::close). While building, `append`, `begin_append` and
/// `truncate` fail; reads and scans still work. After close every operation
/// returns [`RbfError::Closed`].
///
/// # Example
///
/// ```no_run
/// use rbf_core::RbfFile;
///
/// let file = RbfFile::create_new("events.rbf")?;
/// let ticket = file.append(1, b"hello", b"")?;
///
/// let mut buf = vec![0u8; ticket.length() as usize];
/// let frame = file.read_frame(ticket, &mut buf)?;
/// assert_eq!(frame.payload(), b"hello");
///
/// for info in file.scan_reverse(false) {
///     println!("{} tag={}", info.ticket(), info.tag());
/// }
/// file.durable_flush()?;
/// # Ok::<(), rbf_core::RbfError>(())
/// ```
#[derive(Debug)]
pub struct RbfFile {
    backend: RefCell<Option<Box<dyn StorageBackend>>>,
    path: Option<PathBuf>,
    config: RbfConfig,
    tail_offset: Cell<u64>,
    state: Cell<FileState>,
    pool: Arc<BufferPool>,
}

impl RbfFile {
    /// Creates a new file at `path` holding only the header fence.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::AlreadyExists`] if anything exists at `path`.
    pub fn create_new(path: impl AsRef<Path>) -> RbfResult<Self> {
        Self::create_new_with(path, RbfConfig::default())
    }

    /// Creates a new file with explicit configuration.
    ///
    /// Nothing is left behind at `path` if creation fails after the file was
    /// made.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::AlreadyExists`] if anything exists at `path`,
    /// [`RbfError::Locked`] if the lock cannot be taken, or an I/O error.
    pub fn create_new_with(path: impl AsRef<Path>, config: RbfConfig) -> RbfResult<Self> {
        let path = path.as_ref();
        let backend = if config.create_parent_dirs {
            FileBackend::create_new_with_dirs(path)
        } else {
            FileBackend::create_new(path)
        }
        .map_err(|e| map_path_error(e, path))?;

        let result = Self::lock_if_configured(&backend, &config).and_then(|()| {
            Self::init_backend(Box::new(backend), Some(path.to_path_buf()), config)
        });
        if result.is_err() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove partially created file");
            }
        }
        result
    }

    /// Opens an existing file and positions the tail at its end.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::NotFound`] if nothing exists at `path`, and
    /// [`RbfError::FileTooShort`], [`RbfError::MisalignedLength`] or
    /// [`RbfError::HeaderFenceMismatch`] if the file is not an RBF file.
    /// A missing file is never created.
    pub fn open_existing(path: impl AsRef<Path>) -> RbfResult<Self> {
        Self::open_existing_with(path, RbfConfig::default())
    }

    /// Opens an existing file with explicit configuration.
    ///
    /// # Errors
    ///
    /// See [`open_existing`](Self::open_existing); also
    /// [`RbfError::Locked`] if another handle holds the lock.
    pub fn open_existing_with(path: impl AsRef<Path>, config: RbfConfig) -> RbfResult<Self> {
        let path = path.as_ref();
        let backend = FileBackend::open_existing(path).map_err(|e| map_path_error(e, path))?;
        Self::lock_if_configured(&backend, &config)?;
        Self::open_backend(Box::new(backend), Some(path.to_path_buf()), config)
    }

    /// Creates a file on an empty, caller-supplied backend.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidArgument`] if the backend is not empty.
    pub fn create_with_backend(
        backend: Box<dyn StorageBackend>,
        config: RbfConfig,
    ) -> RbfResult<Self> {
        Self::init_backend(backend, None, config)
    }

    /// Opens a file stored in a caller-supplied backend.
    ///
    /// # Errors
    ///
    /// Same header checks as [`open_existing`](Self::open_existing).
    pub fn open_with_backend(backend: Box<dyn StorageBackend>, config: RbfConfig) -> RbfResult<Self> {
        Self::open_backend(backend, None, config)
    }

    fn lock_if_configured(backend: &FileBackend, config: &RbfConfig) -> RbfResult<()> {
        if config.exclusive_lock {
            backend.lock_exclusive().map_err(|e| match e {
                StorageError::Locked { path } => RbfError::Locked { path },
                other => RbfError::Storage(other),
            })?;
        }
        Ok(())
    }

    fn init_backend(
        backend: Box<dyn StorageBackend>,
        path: Option<PathBuf>,
        config: RbfConfig,
    ) -> RbfResult<Self> {
        let size = backend.size()?;
        if size != 0 {
            return Err(RbfError::invalid_argument(format!(
                "cannot create an RBF file on a backend holding {size} bytes"
            )));
        }
        backend.write_at(0, &FENCE)?;
        backend.flush()?;
        if config.sync_on_append {
            backend.sync()?;
        }
        debug!(path = ?path, "created RBF file");
        Ok(Self::from_parts(backend, path, config, HEADER_ONLY_LENGTH))
    }

    fn open_backend(
        backend: Box<dyn StorageBackend>,
        path: Option<PathBuf>,
        config: RbfConfig,
    ) -> RbfResult<Self> {
        let length = backend.size()?;
        if length < HEADER_ONLY_LENGTH {
            return Err(RbfError::FileTooShort { length });
        }
        if !is_aligned(length) {
            return Err(RbfError::MisalignedLength { length });
        }
        let mut found = [0u8; FENCE_SIZE];
        backend.read_exact_at(0, &mut found)?;
        if found != FENCE {
            return Err(RbfError::HeaderFenceMismatch { found });
        }
        debug!(path = ?path, tail_offset = length, "opened RBF file");
        Ok(Self::from_parts(backend, path, config, length))
    }

    fn from_parts(
        backend: Box<dyn StorageBackend>,
        path: Option<PathBuf>,
        config: RbfConfig,
        tail_offset: u64,
    ) -> Self {
        let pool = Arc::new(BufferPool::new(config.pool_retained_buffers));
        Self {
            backend: RefCell::new(Some(backend)),
            path,
            config,
            tail_offset: Cell::new(tail_offset),
            state: Cell::new(FileState::Idle),
            pool,
        }
    }

    /// Path of the file, if it was opened from the filesystem.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The configuration this handle was opened with.
    #[must_use]
    pub fn config(&self) -> &RbfConfig {
        &self.config
    }

    /// Logical end of the file: where the next frame will start.
    #[must_use]
    pub fn tail_offset(&self) -> u64 {
        self.tail_offset.get()
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.get() == FileState::Closed
    }

    /// Whether a frame builder is currently open.
    #[must_use]
    pub fn has_open_builder(&self) -> bool {
        self.state.get() == FileState::Building
    }

    /// Appends a frame and returns its ticket.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidOperation`] while a builder is open,
    /// [`RbfError::InvalidArgument`] if the frame is too large, or an I/O
    /// error. A failed append leaves the tail where it was.
    pub fn append(&self, tag: u32, payload: &[u8], tail_meta: &[u8]) -> RbfResult<Ticket> {
        self.append_inner(tag, payload, tail_meta, false)
    }

    /// Appends a tombstone frame.
    ///
    /// Tombstones mark logical deletion; scans skip them unless asked to
    /// show them.
    ///
    /// # Errors
    ///
    /// Same as [`append`](Self::append).
    pub fn append_tombstone(
        &self,
        tag: u32,
        payload: &[u8],
        tail_meta: &[u8],
    ) -> RbfResult<Ticket> {
        self.append_inner(tag, payload, tail_meta, true)
    }

    fn append_inner(
        &self,
        tag: u32,
        payload: &[u8],
        tail_meta: &[u8],
        is_tombstone: bool,
    ) -> RbfResult<Ticket> {
        self.ensure_idle("append")?;
        let offset = self.appendable_tail()?;
        self.check_frame_length(FrameLayout::new(payload.len(), tail_meta.len())?.frame_length())?;
        self.with_backend(|backend| {
            let result =
                raw::append_frame(backend, offset, tag, payload, tail_meta, is_tombstone);
            self.finish_append(backend, result)
        })
    }

    /// Opens a builder that stages one frame in memory.
    ///
    /// Nothing touches the file until the builder's `end_append`; aborting
    /// or dropping the builder discards the staged bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidOperation`] if a builder is already open.
    pub fn begin_append(&self) -> RbfResult<RbfFrameBuilder<'_>> {
        self.ensure_idle("begin_append")?;
        let offset = self.appendable_tail()?;
        self.state.set(FileState::Building);
        trace!(offset, "builder opened");
        Ok(RbfFrameBuilder::new(self, offset, self.config.builder_capacity))
    }

    /// Writes a frame image sealed by a builder.
    pub(crate) fn commit_built(&self, ticket: Ticket, image: &[u8]) -> RbfResult<Ticket> {
        self.with_backend(|backend| {
            let result = backend
                .write_at(ticket.offset(), image)
                .map(|()| ticket)
                .map_err(RbfError::from);
            self.finish_append(backend, result)
        })
    }

    /// Rejects frames longer than the configured ceiling, which the scanner
    /// would refuse to walk over.
    pub(crate) fn check_frame_length(&self, length: u32) -> RbfResult<()> {
        let max = self.config.max_frame_length;
        if length > max {
            return Err(RbfError::invalid_argument(format!(
                "frame length {length} exceeds the configured maximum {max}"
            )));
        }
        Ok(())
    }

    /// Returns the handle to `Idle` after a builder finishes or aborts.
    pub(crate) fn release_builder(&self) {
        if self.state.get() == FileState::Building {
            self.state.set(FileState::Idle);
        }
    }

    fn finish_append(
        &self,
        backend: &dyn StorageBackend,
        result: RbfResult<Ticket>,
    ) -> RbfResult<Ticket> {
        let tail = self.tail_offset.get();
        match result {
            Ok(ticket) => {
                self.tail_offset.set(ticket.end_offset() + FENCE_SIZE as u64);
                trace!(
                    offset = ticket.offset(),
                    length = ticket.length(),
                    "appended frame"
                );
                if self.config.sync_on_append {
                    backend.sync()?;
                }
                Ok(ticket)
            }
            Err(e) => {
                // Drop any partial bytes so the file still ends at a fence.
                if backend.size().is_ok_and(|size| size > tail) {
                    if let Err(cleanup) = backend.truncate(tail) {
                        warn!(tail, error = %cleanup, "failed to roll back partial append");
                    }
                }
                Err(e)
            }
        }
    }

    /// Reads and verifies the frame at `ticket` into `buf`.
    ///
    /// # Errors
    ///
    /// - [`RbfError::InvalidArgument`] if the ticket length is below the
    ///   minimum frame length or runs past the end of the file
    /// - [`RbfError::BufferTooSmall`] if `buf` is shorter than the frame
    /// - [`RbfError::Framing`] if `HeadLen`, `TailLen` or the descriptor
    ///   disagree
    /// - [`RbfError::CrcMismatch`] if the trailer or payload CRC fails
    pub fn read_frame<'b>(&self, ticket: Ticket, buf: &'b mut [u8]) -> RbfResult<RbfFrame<'b>> {
        self.with_backend(move |backend| raw::read_frame(backend, ticket, buf))
    }

    /// Reads the frame described by `info` into `buf`.
    ///
    /// The trailer was validated when `info` was produced, so only `HeadLen`
    /// and `PayloadCrc` are checked; tag, lengths and the tombstone flag come
    /// from `info`.
    ///
    /// # Errors
    ///
    /// - [`RbfError::InvalidArgument`] if the ticket is too short, runs past
    ///   the end of the file, or cannot hold the lengths in `info`
    /// - [`RbfError::BufferTooSmall`] if `buf` is shorter than the frame
    /// - [`RbfError::Framing`] if `HeadLen` disagrees with the ticket
    /// - [`RbfError::CrcMismatch`] if the payload CRC fails
    pub fn read_frame_with_info<'b>(
        &self,
        info: &RbfFrameInfo,
        buf: &'b mut [u8],
    ) -> RbfResult<RbfFrame<'b>> {
        self.with_backend(move |backend| raw::read_frame_with_info(backend, info, buf))
    }

    /// Reads and verifies the frame at `ticket` into a pooled buffer.
    ///
    /// # Errors
    ///
    /// Same as [`read_frame`](Self::read_frame), minus `BufferTooSmall`.
    pub fn read_pooled_frame(&self, ticket: Ticket) -> RbfResult<PooledFrame> {
        self.with_backend(|backend| {
            let mut buf = self.pool.rent(ticket.length() as usize);
            match raw::read_frame_bytes(backend, ticket, &mut buf) {
                Ok(info) => Ok(PooledFrame::new(
                    Arc::clone(&self.pool),
                    buf,
                    ticket,
                    info.tag(),
                    info.payload_length(),
                    info.tail_meta_length(),
                    info.is_tombstone(),
                )),
                Err(e) => {
                    self.pool.give_back(buf);
                    Err(e)
                }
            }
        })
    }

    /// Reads only the trailer of the frame at `ticket`.
    ///
    /// The payload is not read, so payload corruption goes unnoticed here.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailer is damaged or disagrees with the
    /// ticket length.
    pub fn read_frame_info(&self, ticket: Ticket) -> RbfResult<RbfFrameInfo> {
        self.with_backend(|backend| raw::read_frame_info(backend, ticket))
    }

    /// Reads only the tail meta of a frame into `buf`.
    ///
    /// The bytes are not covered by a CRC check on this path.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::BufferTooSmall`] if `buf` is shorter than the
    /// tail meta, or an I/O error.
    pub fn read_tail_meta<'b>(
        &self,
        info: &RbfFrameInfo,
        buf: &'b mut [u8],
    ) -> RbfResult<&'b [u8]> {
        self.with_backend(move |backend| raw::read_tail_meta(backend, info, buf))
    }

    /// Reads only the tail meta of a frame into a pooled buffer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error or [`RbfError::InvalidArgument`] on a short read.
    pub fn read_pooled_tail_meta(&self, info: &RbfFrameInfo) -> RbfResult<PooledTailMeta> {
        self.with_backend(|backend| {
            let mut buf = self.pool.rent(info.tail_meta_length());
            match raw::read_tail_meta(backend, info, &mut buf) {
                Ok(_) => Ok(PooledTailMeta::new(Arc::clone(&self.pool), buf)),
                Err(e) => {
                    self.pool.give_back(buf);
                    Err(e)
                }
            }
        })
    }

    /// Walks frames from the tail towards the header.
    ///
    /// Tombstones are skipped unless `show_tombstone` is set. The walk stops
    /// at the first inconsistency; see [`ScanReverse`].
    #[must_use]
    pub fn scan_reverse(&self, show_tombstone: bool) -> ScanReverse<'_> {
        ScanReverse::new(self, self.tail_offset.get(), show_tombstone)
    }

    /// Walks frames backwards starting from the fence that ends at
    /// `fence_end`.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidArgument`] if `fence_end` is misaligned or
    /// beyond the tail, and [`RbfError::Closed`] after close.
    pub fn scan_reverse_from(
        &self,
        fence_end: u64,
        show_tombstone: bool,
    ) -> RbfResult<ScanReverse<'_>> {
        self.ensure_open()?;
        if !is_aligned(fence_end) || fence_end > self.tail_offset.get() {
            return Err(RbfError::invalid_argument(format!(
                "scan start {fence_end} must be 4-byte aligned and at most the tail offset {}",
                self.tail_offset.get()
            )));
        }
        Ok(ScanReverse::new(self, fence_end, show_tombstone))
    }

    /// Cuts the file to `new_length` bytes and moves the tail there.
    ///
    /// Used for recovery: truncating to a frame's fence end drops every
    /// later frame. Truncating below the header is allowed but leaves a
    /// file that cannot be reopened or appended to.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidArgument`] if `new_length` is not 4-byte
    /// aligned or exceeds the tail offset, and
    /// [`RbfError::InvalidOperation`] while a builder is open.
    pub fn truncate(&self, new_length: u64) -> RbfResult<()> {
        self.ensure_idle("truncate")?;
        if !is_aligned(new_length) {
            return Err(RbfError::invalid_argument(format!(
                "truncate length {new_length} is not 4-byte aligned"
            )));
        }
        let tail = self.tail_offset.get();
        if new_length > tail {
            return Err(RbfError::invalid_argument(format!(
                "truncate length {new_length} exceeds tail offset {tail}"
            )));
        }
        self.with_backend(|backend| {
            backend.truncate(new_length)?;
            Ok(())
        })?;
        self.tail_offset.set(new_length);
        debug!(from = tail, to = new_length, "truncated RBF file");
        Ok(())
    }

    /// Flushes and syncs everything written so far.
    ///
    /// Bytes staged in an open builder are not part of the file yet and are
    /// unaffected. Calling this repeatedly is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::Closed`] after close, or an I/O error.
    pub fn durable_flush(&self) -> RbfResult<()> {
        self.with_backend(|backend| {
            backend.flush()?;
            backend.sync()?;
            Ok(())
        })
    }

    /// Flushes and releases the underlying file.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidOperation`] while a builder is open, or an
    /// I/O error from the final flush (the handle is closed regardless).
    pub fn close(&self) -> RbfResult<()> {
        match self.state.get() {
            FileState::Closed => return Ok(()),
            FileState::Building => {
                return Err(RbfError::invalid_operation(
                    "close while a frame builder is open",
                ))
            }
            FileState::Idle => {}
        }
        self.state.set(FileState::Closed);
        let backend = self.backend.borrow_mut().take();
        debug!(path = ?self.path, tail_offset = self.tail_offset.get(), "closed RBF file");
        match backend {
            Some(backend) => backend.flush().map_err(RbfError::from),
            None => Ok(()),
        }
    }

    /// Fails unless the handle is open and no builder is active.
    fn ensure_idle(&self, operation: &str) -> RbfResult<()> {
        match self.state.get() {
            FileState::Idle => Ok(()),
            FileState::Building => Err(RbfError::invalid_operation(format!(
                "{operation} while a frame builder is open"
            ))),
            FileState::Closed => Err(RbfError::Closed),
        }
    }

    fn ensure_open(&self) -> RbfResult<()> {
        if self.is_closed() {
            Err(RbfError::Closed)
        } else {
            Ok(())
        }
    }

    fn appendable_tail(&self) -> RbfResult<u64> {
        let tail = self.tail_offset.get();
        if tail < HEADER_ONLY_LENGTH {
            return Err(RbfError::invalid_operation(format!(
                "cannot append: file was truncated to {tail} bytes, below the header fence"
            )));
        }
        Ok(tail)
    }

    /// Runs `f` against the backend, or fails with [`RbfError::Closed`].
    pub(crate) fn with_backend<T>(
        &self,
        f: impl FnOnce(&dyn StorageBackend) -> RbfResult<T>,
    ) -> RbfResult<T> {
        let guard = self.backend.borrow();
        let backend = guard.as_deref().ok_or(RbfError::Closed)?;
        f(backend)
    }
}

fn map_path_error(error: StorageError, path: &Path) -> RbfError {
    match error {
        StorageError::Io(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            RbfError::AlreadyExists {
                path: path.to_path_buf(),
            }
        }
        StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound => RbfError::NotFound {
            path: path.to_path_buf(),
        },
        other => RbfError::Storage(other),
    }
}
