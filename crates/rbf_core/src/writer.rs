//! A growable staging buffer with in-place reservations.
//!
//! Builders stage `payload ‖ tail meta` here. Besides plain writes, a caller
//! can reserve a span, keep writing after it, and fill the span in later
//! (typically a length or count known only at the end). A frame cannot be
//! committed while any reservation is outstanding.

use crate::error::{RbfError, RbfResult};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESERVATION_ID: AtomicU64 = AtomicU64::new(1);

/// Span handed out by [`ReservableWriter::get_span`] when no size is hinted.
const DEFAULT_SPAN: usize = 256;

/// Handle to a reserved span. Consumed by [`ReservableWriter::commit`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation must be committed before the frame can be finished"]
pub struct ReservationToken {
    id: u64,
    start: usize,
    len: usize,
}

impl ReservationToken {
    /// Length of the reserved span.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the span is empty (never true for a live token).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Append-only byte sink with reservable spans.
#[derive(Debug)]
pub struct ReservableWriter {
    buf: Vec<u8>,
    prefix: usize,
    len: usize,
    span: usize,
    active: bool,
    outstanding: Vec<u64>,
}

impl ReservableWriter {
    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_prefix(capacity, 0)
    }

    /// Creates a writer whose buffer starts with `prefix` zero bytes that are
    /// not part of the written data. Builders use this to leave room for
    /// `HeadLen`.
    #[must_use]
    pub(crate) fn with_prefix(capacity: usize, prefix: usize) -> Self {
        let mut buf = Vec::with_capacity(prefix + capacity);
        buf.resize(prefix, 0);
        Self {
            buf,
            prefix,
            len: prefix,
            span: 0,
            active: false,
            outstanding: Vec::new(),
        }
    }

    /// Number of bytes written or reserved so far.
    #[must_use]
    pub fn written_len(&self) -> usize {
        self.len - self.prefix
    }

    /// Number of reservations not yet committed.
    #[must_use]
    pub fn pending_reservations(&self) -> usize {
        self.outstanding.len()
    }

    /// The bytes written so far, reservations included.
    #[must_use]
    pub fn as_written(&self) -> &[u8] {
        &self.buf[self.prefix..self.len]
    }

    /// Whether a span from [`get_span`](Self::get_span) awaits
    /// [`advance`](Self::advance).
    #[must_use]
    pub fn has_active_span(&self) -> bool {
        self.active
    }

    /// Appends `data`.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidOperation`] if a span is still active.
    pub fn write_bytes(&mut self, data: &[u8]) -> RbfResult<()> {
        self.ensure_no_active_span()?;
        self.buf.extend_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Returns a writable span of at least `size_hint` bytes at the end of
    /// the data. Nothing counts as written until [`advance`](Self::advance),
    /// which must be called before the next write, span or reservation.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidOperation`] if the previous span was not
    /// advanced.
    pub fn get_span(&mut self, size_hint: usize) -> RbfResult<&mut [u8]> {
        self.ensure_no_active_span()?;
        let want = if size_hint == 0 {
            DEFAULT_SPAN
        } else {
            size_hint
        };
        self.buf.resize(self.len + want, 0);
        self.span = want;
        self.active = true;
        Ok(&mut self.buf[self.len..])
    }

    /// Marks `count` bytes of the active span as written and ends the span.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidOperation`] if no span is active or
    /// `count` exceeds it. The span stays active on overrun.
    pub fn advance(&mut self, count: usize) -> RbfResult<()> {
        if !self.active {
            return Err(RbfError::invalid_operation(
                "advance called without an active span",
            ));
        }
        if count > self.span {
            return Err(RbfError::invalid_operation(format!(
                "cannot advance {count} bytes past a span of {}",
                self.span
            )));
        }
        self.len += count;
        self.close_span();
        Ok(())
    }

    /// Reserves `count` zeroed bytes at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidArgument`] if `count` is zero, or
    /// [`RbfError::InvalidOperation`] if a span is still active.
    pub fn reserve_span(&mut self, count: usize) -> RbfResult<ReservationToken> {
        if count == 0 {
            return Err(RbfError::invalid_argument("reservation must not be empty"));
        }
        self.ensure_no_active_span()?;
        let start = self.len;
        self.buf.resize(start + count, 0);
        self.len += count;

        let id = NEXT_RESERVATION_ID.fetch_add(1, Ordering::Relaxed);
        self.outstanding.push(id);
        Ok(ReservationToken {
            id,
            start,
            len: count,
        })
    }

    /// Mutable access to a reserved span.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidOperation`] if the token is not an
    /// outstanding reservation of this writer.
    pub fn reserved_mut(&mut self, token: &ReservationToken) -> RbfResult<&mut [u8]> {
        self.check_token(token)?;
        Ok(&mut self.buf[token.start..token.start + token.len])
    }

    /// Finalises a reservation. Its bytes stay as last written.
    ///
    /// # Errors
    ///
    /// Returns [`RbfError::InvalidOperation`] if the token is not an
    /// outstanding reservation of this writer.
    pub fn commit(&mut self, token: ReservationToken) -> RbfResult<()> {
        self.check_token(&token)?;
        self.outstanding.retain(|&id| id != token.id);
        Ok(())
    }

    /// Takes the staged buffer, prefix included. Bytes of an unadvanced span
    /// are not part of it.
    pub(crate) fn into_buffer(mut self) -> Vec<u8> {
        self.close_span();
        self.buf
    }

    fn check_token(&self, token: &ReservationToken) -> RbfResult<()> {
        if self.outstanding.contains(&token.id) {
            Ok(())
        } else {
            Err(RbfError::invalid_operation(
                "reservation token is not outstanding in this writer",
            ))
        }
    }

    fn ensure_no_active_span(&self) -> RbfResult<()> {
        if self.active {
            Err(RbfError::invalid_operation(format!(
                "previous span of {} bytes was not advanced",
                self.span
            )))
        } else {
            Ok(())
        }
    }

    fn close_span(&mut self) {
        self.buf.truncate(self.len);
        self.span = 0;
        self.active = false;
    }
}

impl io::Write for ReservableWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
