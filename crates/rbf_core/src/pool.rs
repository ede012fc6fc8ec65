//! Pooled read buffers.
//!
//! [`PooledFrame`] and [`PooledTailMeta`] own a buffer rented from the
//! file's [`BufferPool`] and give it back on [`release`](PooledFrame::release)
//! or drop. Touching the bytes after release is a programming error and
//! panics.

use crate::ticket::Ticket;
use parking_lot::Mutex;
use std::sync::Arc;

/// A small free list of byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
}

impl BufferPool {
    /// Creates a pool that keeps at most `max_retained` idle buffers.
    #[must_use]
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_retained,
        }
    }

    /// Rents a zeroed buffer of exactly `len` bytes.
    #[must_use]
    pub fn rent(&self, len: usize) -> Vec<u8> {
        let reused = {
            let mut free = self.free.lock();
            free.iter()
                .position(|buf| buf.capacity() >= len)
                .map(|i| free.swap_remove(i))
        };
        let mut buf = reused.unwrap_or_else(|| Vec::with_capacity(len));
        buf.clear();
        buf.resize(len, 0);
        buf
    }

    /// Returns a buffer to the pool.
    pub fn give_back(&self, buf: Vec<u8>) {
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }

    /// Number of idle buffers currently held.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(8)
    }
}

/// A verified frame whose bytes live in a pooled buffer.
#[derive(Debug)]
pub struct PooledFrame {
    pool: Arc<BufferPool>,
    buffer: Option<Vec<u8>>,
    ticket: Ticket,
    tag: u32,
    payload_length: usize,
    tail_meta_length: usize,
    is_tombstone: bool,
}

impl PooledFrame {
    /// `buffer` holds the whole frame starting at `HeadLen`.
    pub(crate) fn new(
        pool: Arc<BufferPool>,
        buffer: Vec<u8>,
        ticket: Ticket,
        tag: u32,
        payload_length: usize,
        tail_meta_length: usize,
        is_tombstone: bool,
    ) -> Self {
        Self {
            pool,
            buffer: Some(buffer),
            ticket,
            tag,
            payload_length,
            tail_meta_length,
            is_tombstone,
        }
    }

    /// Where the frame lives.
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Caller-defined tag.
    #[must_use]
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Whether this frame is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.is_tombstone
    }

    /// Payload bytes.
    ///
    /// # Panics
    ///
    /// Panics if the frame has been released.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let start = crate::layout::HEAD_LEN_SIZE;
        &self.bytes()[start..start + self.payload_length]
    }

    /// Tail meta bytes.
    ///
    /// # Panics
    ///
    /// Panics if the frame has been released.
    #[must_use]
    pub fn tail_meta(&self) -> &[u8] {
        let start = crate::layout::HEAD_LEN_SIZE + self.payload_length;
        &self.bytes()[start..start + self.tail_meta_length]
    }

    /// Whether [`release`](Self::release) has run.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.buffer.is_none()
    }

    /// Returns the buffer to the pool. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(buf) = self.buffer.take() {
            self.pool.give_back(buf);
        }
    }

    fn bytes(&self) -> &[u8] {
        match &self.buffer {
            Some(buf) => buf,
            None => panic!("pooled frame {} used after release", self.ticket),
        }
    }
}

impl Drop for PooledFrame {
    fn drop(&mut self) {
        self.release();
    }
}

/// Tail meta bytes held in a pooled buffer.
#[derive(Debug)]
pub struct PooledTailMeta {
    pool: Arc<BufferPool>,
    buffer: Option<Vec<u8>>,
}

impl PooledTailMeta {
    pub(crate) fn new(pool: Arc<BufferPool>, buffer: Vec<u8>) -> Self {
        Self {
            pool,
            buffer: Some(buffer),
        }
    }

    /// The tail meta bytes.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has been released.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match &self.buffer {
            Some(buf) => buf,
            None => panic!("pooled tail meta used after release"),
        }
    }

    /// Length in bytes.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has been released.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the tail meta is empty.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has been released.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Whether [`release`](Self::release) has run.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.buffer.is_none()
    }

    /// Returns the buffer to the pool. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(buf) = self.buffer.take() {
            self.pool.give_back(buf);
        }
    }
}

impl Drop for PooledTailMeta {
    fn drop(&mut self) {
        self.release();
    }
}
