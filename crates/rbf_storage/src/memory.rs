//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// An in-memory storage backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Corruption and crash simulation (bytes can be edited directly)
/// - Ephemeral logs that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use rbf_storage::{StorageBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.write_at(0, b"test data").unwrap();
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of all data in the backend.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Applies `f` to the byte at `offset`, returning `false` if out of range.
    ///
    /// Simulates bit rot without going through the write path.
    pub fn mutate_byte(&self, offset: u64, f: impl FnOnce(u8) -> u8) -> bool {
        let mut data = self.data.write();
        match usize::try_from(offset).ok().and_then(|i| data.get_mut(i)) {
            Some(byte) => {
                *byte = f(*byte);
                true
            }
            None => false,
        }
    }

    /// Clears all data from the backend.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        let data = self.data.read();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }

        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, offset: u64, new_data: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        let start = usize::try_from(offset).map_err(|_| StorageError::ReadPastEnd {
            offset,
            len: new_data.len(),
            size: data.len() as u64,
        })?;
        let end = start + new_data.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(new_data);
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        // In-memory backend has no pending writes
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&self) -> StorageResult<()> {
        // In-memory backend has no metadata to sync
        Ok(())
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let current_size = data.len() as u64;

        if new_size > current_size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: current_size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_write_at_end_extends() {
        let backend = InMemoryBackend::new();

        backend.write_at(0, b"hello").unwrap();
        backend.write_at(5, b" world").unwrap();

        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.data(), b"hello world");
    }

    #[test]
    fn memory_write_past_end_zero_fills_gap() {
        let backend = InMemoryBackend::new();
        backend.write_at(4, b"ab").unwrap();
        assert_eq!(backend.data(), vec![0, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn memory_read_at_returns_correct_data() {
        let backend = InMemoryBackend::with_data(b"hello world".to_vec());

        let mut buf = [0u8; 5];
        backend.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        backend.read_exact_at(6, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn memory_read_past_end_is_short() {
        let backend = InMemoryBackend::with_data(b"hello".to_vec());

        let mut buf = [0u8; 5];
        assert_eq!(backend.read_at(10, &mut buf).unwrap(), 0);
        assert_eq!(backend.read_at(3, &mut buf).unwrap(), 2);

        let result = backend.read_exact_at(3, &mut buf);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn memory_empty_read() {
        let backend = InMemoryBackend::with_data(b"hello".to_vec());
        let mut buf = [0u8; 0];
        assert_eq!(backend.read_at(2, &mut buf).unwrap(), 0);
    }

    #[test]
    fn memory_mutate_byte() {
        let backend = InMemoryBackend::with_data(vec![0x0F; 4]);
        assert!(backend.mutate_byte(2, |b| b ^ 0xFF));
        assert!(!backend.mutate_byte(4, |b| b));
        assert_eq!(backend.data(), vec![0x0F, 0x0F, 0xF0, 0x0F]);
    }

    #[test]
    fn memory_clear() {
        let backend = InMemoryBackend::with_data(b"some data".to_vec());
        backend.clear();
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn memory_flush_and_sync_succeed() {
        let backend = InMemoryBackend::with_data(b"data".to_vec());
        assert!(backend.flush().is_ok());
        assert!(backend.sync().is_ok());
    }

    #[test]
    fn memory_truncate_partial() {
        let backend = InMemoryBackend::with_data(b"hello world".to_vec());

        backend.truncate(5).unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert_eq!(backend.data(), b"hello");
    }

    #[test]
    fn memory_truncate_to_larger_size_fails() {
        let backend = InMemoryBackend::with_data(b"hello".to_vec());

        let result = backend.truncate(100);
        assert!(matches!(
            result,
            Err(StorageError::TruncateBeyondEnd {
                requested: 100,
                size: 5
            })
        ));
    }

    proptest! {
        #[test]
        fn memory_reads_back_what_was_written(
            prefix in prop::collection::vec(any::<u8>(), 0..64),
            chunk in prop::collection::vec(any::<u8>(), 1..64),
        ) {
            let backend = InMemoryBackend::with_data(prefix.clone());
            let offset = prefix.len() as u64;
            backend.write_at(offset, &chunk).unwrap();

            let mut buf = vec![0u8; chunk.len()];
            backend.read_exact_at(offset, &mut buf).unwrap();
            prop_assert_eq!(buf, chunk);
        }
    }
}
