//! Crash recovery testing for RBF.
//!
//! [`CrashableBackend`] wraps another backend and "loses power" after a
//! configurable number of written bytes: the write that crosses the limit is
//! cut short and every later mutation fails. Reopening the inner backend
//! then shows exactly what a real crash would have left on disk.
//!
//! ## Test Strategy
//!
//! 1. **Crash before the frame** - nothing of the frame reaches storage
//! 2. **Crash mid-frame** - a torn tail that scans must refuse to cross
//! 3. **Crash before the fence** - the frame is complete but unfenced
//! 4. **Crash after the fence** - the frame is fully durable
//!
//! ## Usage
//!
//! ```rust
//! use rbf_testkit::crash::torn_append;
//!
//! let outcome = torn_append(3, b"victim", 10);
//! assert_eq!(outcome.surviving_frames, 3);
//! ```

use rbf_core::{RbfConfig, RbfFile};
use rbf_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A storage backend wrapper that can simulate crashes.
#[derive(Debug)]
pub struct CrashableBackend {
    inner: Arc<dyn StorageBackend>,
    crash_after_bytes: AtomicU64,
    bytes_written: AtomicU64,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

impl CrashableBackend {
    /// Creates a new crashable backend wrapping an inner backend.
    pub fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner,
            crash_after_bytes: AtomicU64::new(u64::MAX),
            bytes_written: AtomicU64::new(0),
            crashed: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        }
    }

    /// Crashes once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: u64) {
        self.bytes_written.store(0, Ordering::SeqCst);
        self.crash_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Sets whether `sync` should fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    fn crash_error(what: &str) -> StorageError {
        StorageError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }

    fn check_alive(&self, what: &str) -> StorageResult<()> {
        if self.has_crashed() {
            Err(Self::crash_error(what))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.check_alive("write")?;
        let len = data.len() as u64;
        let current = self.bytes_written.fetch_add(len, Ordering::SeqCst);
        let threshold = self.crash_after_bytes.load(Ordering::SeqCst);

        if current.saturating_add(len) > threshold {
            self.crashed.store(true, Ordering::SeqCst);
            let partial = threshold.saturating_sub(current) as usize;
            if partial > 0 {
                self.inner.write_at(offset, &data[..partial])?;
            }
            return Err(Self::crash_error("write"));
        }
        self.inner.write_at(offset, data)
    }

    fn flush(&self) -> StorageResult<()> {
        self.check_alive("flush")?;
        self.inner.flush()
    }

    fn sync(&self) -> StorageResult<()> {
        self.check_alive("sync")?;
        if self.fail_on_sync.load(Ordering::SeqCst) {
            return Err(Self::crash_error("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        self.check_alive("truncate")?;
        self.inner.truncate(new_size)
    }
}

/// What a torn append left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TornAppendOutcome {
    /// Bytes of the victim frame that reached storage.
    pub bytes_persisted: u64,
    /// Whether the file could be reopened as-is.
    pub reopened: bool,
    /// Frames yielded by a reverse scan after reopening (and, for a
    /// misaligned tail, after cutting back to the previous boundary).
    pub surviving_frames: usize,
    /// Whether that scan hit a terminal error before the header.
    pub scan_stopped_early: bool,
}

/// Appends `good_frames` frames, then crashes `crash_after` bytes into one
/// more frame carrying `victim_payload`, and reports what recovery sees.
pub fn torn_append(good_frames: u32, victim_payload: &[u8], crash_after: u64) -> TornAppendOutcome {
    let storage = Arc::new(InMemoryBackend::new());
    let crashable = Arc::new(CrashableBackend::new(storage.clone()));
    let config = RbfConfig::default();

    let file = RbfFile::create_with_backend(Box::new(Arc::clone(&crashable)), config.clone())
        .expect("Failed to create log");
    for i in 0..good_frames {
        file.append(i, format!("good-{i}").as_bytes(), b"")
            .expect("Failed to append good frame");
    }
    let boundary = file.tail_offset();

    crashable.crash_after(crash_after);
    let result = file.append(u32::MAX, victim_payload, b"");
    drop(file);

    let persisted = storage.size().expect("size") - boundary;
    if result.is_ok() {
        assert!(!crashable.has_crashed());
    }

    let (reopened, file) =
        match RbfFile::open_with_backend(Box::new(storage.clone()), config.clone()) {
            Ok(file) => (true, file),
            Err(_) => {
                // A misaligned torn tail cannot be opened; cut back to the
                // last boundary the application knew about.
                storage.truncate(boundary).expect("truncate");
                let file = RbfFile::open_with_backend(Box::new(storage.clone()), config)
                    .expect("Failed to reopen after cutting the torn tail");
                (false, file)
            }
        };

    let mut scan = file.scan_reverse(true);
    let surviving_frames = scan.by_ref().count();
    TornAppendOutcome {
        bytes_persisted: persisted,
        reopened,
        surviving_frames,
        scan_stopped_early: scan.terminal_error().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbf_core::salvage;

    #[test]
    fn test_crash_before_frame() {
        let outcome = torn_append(2, b"victim", 0);
        assert_eq!(outcome.bytes_persisted, 0);
        assert!(outcome.reopened);
        assert_eq!(outcome.surviving_frames, 2);
        assert!(!outcome.scan_stopped_early);
    }

    #[test]
    fn test_crash_mid_frame_aligned() {
        // 4 + 6 + 2 padding + 4 crc = 16 bytes: HeadLen, payload and CRC but no trailer.
        let outcome = torn_append(2, b"victim", 16);
        assert!(outcome.reopened);
        assert_eq!(outcome.surviving_frames, 0);
        assert!(outcome.scan_stopped_early);
    }

    #[test]
    fn test_crash_mid_frame_misaligned() {
        let outcome = torn_append(2, b"victim", 7);
        assert!(!outcome.reopened);
        assert_eq!(outcome.surviving_frames, 2);
        assert!(!outcome.scan_stopped_early);
    }

    #[test]
    fn test_crash_before_fence() {
        // Victim frame is 32 bytes; the fence is lost.
        let outcome = torn_append(1, b"victim", 32);
        assert!(outcome.reopened);
        assert_eq!(outcome.bytes_persisted, 32);
        assert!(outcome.scan_stopped_early);
        assert_eq!(outcome.surviving_frames, 0);
    }

    #[test]
    fn test_crash_after_fence() {
        let outcome = torn_append(1, b"victim", 36);
        assert!(outcome.reopened);
        assert_eq!(outcome.surviving_frames, 2);
        assert!(!outcome.scan_stopped_early);
    }

    #[test]
    fn test_torn_tail_is_recoverable_by_truncation() {
        let storage = Arc::new(InMemoryBackend::new());
        let crashable = Arc::new(CrashableBackend::new(storage.clone()));
        let file =
            RbfFile::create_with_backend(Box::new(Arc::clone(&crashable)), RbfConfig::default())
                .unwrap();
        for i in 0..3u32 {
            file.append(i, b"keep", b"").unwrap();
        }
        let good_tail = file.tail_offset();
        crashable.crash_after(20);
        assert!(file.append(9, &[0x55; 64], b"").is_err());
        drop(file);

        let file =
            RbfFile::open_with_backend(Box::new(storage.clone()), RbfConfig::default()).unwrap();
        assert!(file.scan_reverse(true).into_result().is_err());

        let boundary = salvage::last_good_boundary(&file).unwrap();
        assert_eq!(boundary, good_tail);
        file.truncate(boundary).unwrap();
        assert_eq!(file.scan_reverse(true).into_result().unwrap().len(), 3);
    }

    #[test]
    fn test_failed_sync_keeps_frame_and_reports_error() {
        let storage = Arc::new(InMemoryBackend::new());
        let crashable = Arc::new(CrashableBackend::new(storage.clone()));
        let file = RbfFile::create_with_backend(
            Box::new(Arc::clone(&crashable)),
            RbfConfig::default().sync_on_append(true),
        )
        .unwrap();

        crashable.set_fail_on_sync(true);
        assert!(file.append(1, b"written", b"").is_err());
        assert!(file.durable_flush().is_err());

        crashable.set_fail_on_sync(false);
        file.durable_flush().unwrap();
        assert_eq!(file.scan_reverse(true).count(), 1);
    }

    #[test]
    fn test_failed_write_leaves_tail_unchanged() {
        let storage = Arc::new(InMemoryBackend::new());
        let crashable = Arc::new(CrashableBackend::new(storage.clone()));
        let file =
            RbfFile::create_with_backend(Box::new(Arc::clone(&crashable)), RbfConfig::default())
                .unwrap();
        file.append(1, b"first", b"").unwrap();
        let tail = file.tail_offset();

        crashable.crash_after(8);
        assert!(file.append(2, b"second", b"").is_err());
        assert_eq!(file.tail_offset(), tail);
    }
}
