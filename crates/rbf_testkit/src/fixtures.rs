//! Test fixtures and log helpers.
//!
//! Provides convenience functions for setting up test logs and common
//! test scenarios.

use rbf_core::{RbfConfig, RbfFile, Ticket};
use rbf_storage::InMemoryBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A test log with automatic cleanup.
///
/// Memory logs keep a handle on their backend so tests can damage bytes
/// underneath the open file.
pub struct TestLog {
    /// The open log.
    pub file: RbfFile,
    backend: Option<Arc<InMemoryBackend>>,
    path: Option<PathBuf>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestLog {
    /// Creates a new in-memory test log.
    pub fn memory() -> Self {
        Self::memory_with(RbfConfig::default())
    }

    /// Creates a new in-memory test log with a custom configuration.
    pub fn memory_with(config: RbfConfig) -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let file = RbfFile::create_with_backend(Box::new(Arc::clone(&backend)), config)
            .expect("Failed to create in-memory log");
        Self {
            file,
            backend: Some(backend),
            path: None,
            _temp_dir: None,
        }
    }

    /// Creates a new file-based test log in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("test.rbf");
        let file = RbfFile::create_new(&path).expect("Failed to create log file");
        Self {
            file,
            backend: None,
            path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the log path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the shared backend if in-memory.
    pub fn backend(&self) -> Option<&Arc<InMemoryBackend>> {
        self.backend.as_ref()
    }

    /// Returns a copy of every byte of the log.
    pub fn bytes(&self) -> Vec<u8> {
        match (&self.backend, &self.path) {
            (Some(backend), _) => backend.data(),
            (None, Some(path)) => std::fs::read(path).expect("Failed to read log file"),
            (None, None) => Vec::new(),
        }
    }

    /// XORs the byte at `offset` with `mask`.
    pub fn flip(&self, offset: u64, mask: u8) {
        match (&self.backend, &self.path) {
            (Some(backend), _) => {
                assert!(
                    backend.mutate_byte(offset, |b| b ^ mask),
                    "offset {offset} is past the end of the log"
                );
            }
            (None, Some(path)) => crate::corrupt::flip_byte_in_file(path, offset, mask),
            (None, None) => unreachable!("test log has neither backend nor path"),
        }
    }

    /// Closes the log and opens it again from the same bytes.
    pub fn reopen(self) -> Self {
        let Self {
            file,
            backend,
            path,
            _temp_dir,
        } = self;
        file.close().expect("Failed to close log");
        drop(file);

        let config = RbfConfig::default();
        let file = match (&backend, &path) {
            (Some(backend), _) => RbfFile::open_with_backend(Box::new(Arc::clone(backend)), config),
            (None, Some(path)) => RbfFile::open_existing_with(path, config),
            (None, None) => unreachable!("test log has neither backend nor path"),
        }
        .expect("Failed to reopen log");

        Self {
            file,
            backend,
            path,
            _temp_dir,
        }
    }
}

impl std::ops::Deref for TestLog {
    type Target = RbfFile;

    fn deref(&self) -> &Self::Target {
        &self.file
    }
}

/// Runs a test with a temporary in-memory log.
///
/// # Example
///
/// ```rust
/// use rbf_testkit::with_temp_log;
///
/// with_temp_log(|log| {
///     log.append(7, b"x", b"").unwrap();
///     // header, frame, fence
///     assert_eq!(log.tail_offset(), 4 + 28 + 4);
/// });
/// ```
pub fn with_temp_log<F, R>(f: F) -> R
where
    F: FnOnce(&RbfFile) -> R,
{
    let log = TestLog::memory();
    f(&log.file)
}

/// Runs a test with a temporary file-based log.
pub fn with_file_log<F, R>(f: F) -> R
where
    F: FnOnce(&RbfFile, &Path) -> R,
{
    let log = TestLog::file();
    let path = log.path().expect("File log should have a path").to_path_buf();
    f(&log.file, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a log with `frame_count` frames tagged `0..frame_count`.
    ///
    /// Payloads vary in length so every padding length appears.
    pub fn populated_log(frame_count: u32) -> (TestLog, Vec<Ticket>) {
        let log = TestLog::memory();
        let tickets = append_numbered(&log.file, frame_count);
        (log, tickets)
    }

    /// Appends `count` frames tagged `0..count` with payload `"frame-<i>"`.
    pub fn append_numbered(file: &RbfFile, count: u32) -> Vec<Ticket> {
        (0..count)
            .map(|i| {
                let payload = format!("frame-{i}{}", "+".repeat(i as usize % 4));
                file.append(i, payload.as_bytes(), &i.to_le_bytes()[..(i as usize % 3)])
                    .expect("Failed to append frame")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log() {
        let log = TestLog::memory();
        assert_eq!(log.tail_offset(), 4);
        assert_eq!(log.bytes(), b"RBF1");
    }

    #[test]
    fn test_file_log_reopen() {
        let log = TestLog::file();
        let ticket = log.append(1, b"survives", b"").unwrap();
        let log = log.reopen();
        assert_eq!(log.read_frame_info(ticket).unwrap().tag(), 1);
    }

    #[test]
    fn test_flip_memory_and_file() {
        for log in [TestLog::memory(), TestLog::file()] {
            log.flip(0, 0x20);
            assert_eq!(&log.bytes()[..4], b"rBF1");
        }
    }

    #[test]
    fn test_populated_scenario() {
        let (log, tickets) = scenarios::populated_log(8);
        assert_eq!(tickets.len(), 8);
        assert_eq!(log.scan_reverse(false).count(), 8);
    }

    #[test]
    fn test_single_append_tail() {
        let tail = with_temp_log(|log| {
            log.append(7, b"x", b"").unwrap();
            log.tail_offset()
        });
        assert_eq!(tail, 4 + 28 + 4);
    }

    #[test]
    fn test_with_file_log() {
        with_file_log(|log, path| {
            log.append(1, b"x", b"").unwrap();
            log.durable_flush().unwrap();
            assert_eq!(std::fs::metadata(path).unwrap().len(), log.tail_offset());
        });
    }
}
