//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};

/// A positioned byte store.
///
/// Backends are **opaque byte stores**. They read and write at explicit
/// offsets, flush, and change their length. The RBF engine owns all format
/// interpretation - backends do not understand frames or fences.
///
/// # Invariants
///
/// - `read_at` returns bytes previously written at that offset
/// - `write_at` past the current end extends the store (gap is zero-filled)
/// - `sync` makes all previously written bytes durable
/// - Backends must be `Send + Sync`; methods take `&self` and lock internally
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is short only when the read
    /// reaches the end of storage. Reading at or past the end returns `0`.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize>;

    /// Writes all of `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&self) -> StorageResult<()>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// This is a stronger guarantee than `flush` - after it returns, all
    /// previously written bytes and the current length survive power loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the storage to the given size.
    ///
    /// This removes all data after `new_size`. It never grows the store.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `new_size` is greater than the current size
    /// - The truncation fails
    fn truncate(&self, new_size: u64) -> StorageResult<()>;

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] if fewer bytes are available.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        let read = self.read_at(offset, buf)?;
        if read < buf.len() {
            return Err(StorageError::ReadPastEnd {
                offset,
                len: buf.len(),
                size: self.size()?,
            });
        }
        Ok(())
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        (**self).write_at(offset, data)
    }

    fn flush(&self) -> StorageResult<()> {
        (**self).flush()
    }

    fn sync(&self) -> StorageResult<()> {
        (**self).sync()
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        (**self).truncate(new_size)
    }
}
