//! Cross-crate integration test helpers.
//!
//! Provides a model-checked log harness and the recovery scenarios every
//! backend must pass.

use crate::fixtures::TestLog;
use crate::generators::FrameSpec;
use rbf_core::{RbfFile, Ticket};

/// A log that remembers what was appended to it.
pub struct LogHarness {
    /// The log under test.
    pub log: TestLog,
    frames: Vec<(Ticket, FrameSpec)>,
}

impl LogHarness {
    /// Creates a harness over a fresh in-memory log.
    pub fn memory() -> Self {
        Self::with_log(TestLog::memory())
    }

    /// Creates a harness over a fresh file-based log.
    pub fn file() -> Self {
        Self::with_log(TestLog::file())
    }

    fn with_log(log: TestLog) -> Self {
        Self {
            log,
            frames: Vec::new(),
        }
    }

    /// Appends a frame and tracks it.
    pub fn append(&mut self, spec: FrameSpec) -> Ticket {
        let ticket = spec.append_to(&self.log);
        self.frames.push((ticket, spec));
        ticket
    }

    /// Appends a live frame with the given tag and payload.
    pub fn append_simple(&mut self, tag: u32, payload: &[u8]) -> Ticket {
        self.append(FrameSpec {
            tag,
            payload: payload.to_vec(),
            tail_meta: Vec::new(),
            tombstone: false,
        })
    }

    /// Reads every tracked frame back and checks it against the model.
    pub fn verify_all(&self) {
        for (ticket, spec) in &self.frames {
            let frame = self
                .log
                .read_pooled_frame(*ticket)
                .expect("Failed to read tracked frame");
            assert_eq!(frame.tag(), spec.tag, "Tag mismatch at {ticket}");
            assert_eq!(frame.payload(), spec.payload.as_slice(), "Payload mismatch at {ticket}");
            assert_eq!(
                frame.tail_meta(),
                spec.tail_meta.as_slice(),
                "Tail meta mismatch at {ticket}"
            );
            assert_eq!(frame.is_tombstone(), spec.tombstone);
        }
    }

    /// Checks that a reverse scan returns exactly the tracked frames.
    pub fn verify_scan(&self) {
        let expected: Vec<Ticket> = self.frames.iter().rev().map(|(t, _)| *t).collect();
        let scanned: Vec<Ticket> = self
            .log
            .scan_reverse(true)
            .into_result()
            .expect("Scan of a clean log failed")
            .iter()
            .map(|info| info.ticket())
            .collect();
        assert_eq!(scanned, expected);
    }

    /// Truncates the log right after the first `keep` tracked frames.
    pub fn truncate_to(&mut self, keep: usize) {
        self.frames.truncate(keep);
        let boundary = self
            .frames
            .last()
            .map_or(4, |(ticket, _)| ticket.end_offset() + 4);
        self.log.truncate(boundary).expect("Failed to truncate");
    }

    /// Closes and reopens the underlying log.
    pub fn reopen(self) -> Self {
        Self {
            log: self.log.reopen(),
            frames: self.frames,
        }
    }

    /// Returns the count of tracked frames.
    pub fn tracked_count(&self) -> usize {
        self.frames.len()
    }
}

/// Recovery scenarios over an open log.
pub mod recovery {
    use super::*;
    use crate::corrupt::{region_offset, FrameRegion};
    use rbf_core::{CrcRegion, RbfError};

    /// Appends three frames, truncates after the second and checks the
    /// scan and tail.
    pub fn test_truncate_after_second(file: &RbfFile) {
        file.append(1, b"one", b"").expect("Failed to append");
        let second = file.append(2, b"two", b"").expect("Failed to append");
        file.append(3, b"three", b"").expect("Failed to append");

        let boundary = second.end_offset() + 4;
        file.truncate(boundary).expect("Failed to truncate");

        let tags: Vec<u32> = file.scan_reverse(false).map(|info| info.tag()).collect();
        assert_eq!(tags, vec![2, 1]);
        assert_eq!(file.tail_offset(), boundary);

        let next = file.append(4, b"four", b"").expect("Failed to append");
        assert_eq!(next.offset(), boundary);
    }

    /// Checks that a scan visits frames newest first with strictly
    /// decreasing offsets.
    pub fn test_strict_reverse_order(file: &RbfFile, count: u32) {
        let tickets = crate::fixtures::scenarios::append_numbered(file, count);
        let scanned: Vec<_> = file
            .scan_reverse(true)
            .into_result()
            .expect("Scan failed");

        assert_eq!(scanned.len(), tickets.len());
        for (info, ticket) in scanned.iter().zip(tickets.iter().rev()) {
            assert_eq!(info.ticket(), *ticket);
        }
        assert!(scanned
            .windows(2)
            .all(|w| w[0].ticket().offset() > w[1].ticket().offset()));
    }

    /// Damages one payload byte: the scan still lists the frame, the read
    /// rejects it.
    pub fn test_payload_corruption_found_on_read(log: &TestLog) {
        let ticket = log.append(9, b"precious payload", b"").expect("Failed to append");
        let info = log.read_frame_info(ticket).expect("Failed to read info");
        let offset = region_offset(&info, FrameRegion::Payload, 3).expect("Payload too short");
        log.flip(offset, 0x01);

        let scanned: Vec<_> = log.scan_reverse(false).map(|info| info.ticket()).collect();
        assert_eq!(scanned, vec![ticket]);

        let mut buf = vec![0u8; ticket.length() as usize];
        let err = log.read_frame(ticket, &mut buf).unwrap_err();
        assert!(
            matches!(
                err,
                RbfError::CrcMismatch {
                    region: CrcRegion::Payload,
                    ..
                }
            ),
            "unexpected error: {err}"
        );
    }

    /// Damages the trailer of frame `victim` out of `count`: the scan yields
    /// the newer frames and then stops with an integrity error.
    pub fn test_trailer_corruption_stops_scan(log: &TestLog, count: u32, victim: usize) {
        assert!((victim as u32) < count);
        let tickets = crate::fixtures::scenarios::append_numbered(log, count);
        let info = log
            .read_frame_info(tickets[victim])
            .expect("Failed to read info");
        let offset = region_offset(&info, FrameRegion::Tag, 0).expect("Tag is four bytes");
        log.flip(offset, 0x80);

        let mut scan = log.scan_reverse(true);
        let scanned: Vec<_> = scan.by_ref().map(|info| info.ticket()).collect();
        let expected: Vec<_> = tickets[victim + 1..].iter().rev().copied().collect();
        assert_eq!(scanned, expected);

        let err = scan.take_terminal_error().expect("Scan should hard-stop");
        assert!(err.is_corruption(), "unexpected error: {err}");
        assert!(matches!(
            err,
            RbfError::CrcMismatch {
                region: CrcRegion::Trailer,
                ..
            }
        ));
    }

    /// Stages 100 bytes in a builder, aborts, and checks that nothing
    /// reached the log.
    pub fn test_abort_is_invisible(log: &TestLog) {
        log.append(1, b"before", b"").expect("Failed to append");
        let bytes_before = log.bytes();
        let tail_before = log.tail_offset();

        {
            let mut builder = log.begin_append().expect("Failed to begin append");
            builder
                .payload_and_meta()
                .expect("Builder should be open")
                .write_bytes(&[0xAB; 100])
                .expect("Failed to stage payload");
            builder.abort();
            assert!(!builder.is_open());
        }

        assert_eq!(log.bytes(), bytes_before);
        assert_eq!(log.tail_offset(), tail_before);
        assert!(!log.has_open_builder());

        let next = log.append(2, b"after", b"").expect("Failed to append");
        assert_eq!(next.offset(), tail_before);
    }

    /// Flushing and closing repeatedly is harmless; everything after close
    /// fails with `Closed`.
    pub fn test_flush_and_close_idempotent(file: &RbfFile) {
        let ticket = file.append(1, b"x", b"").expect("Failed to append");
        file.durable_flush().expect("First flush failed");
        file.durable_flush().expect("Second flush failed");
        file.close().expect("First close failed");
        file.close().expect("Second close failed");

        assert!(file.is_closed());
        assert!(matches!(file.append(2, b"y", b""), Err(RbfError::Closed)));
        assert!(matches!(file.read_frame_info(ticket), Err(RbfError::Closed)));
        assert!(matches!(file.durable_flush(), Err(RbfError::Closed)));
        assert!(matches!(file.truncate(4), Err(RbfError::Closed)));
    }
}

/// Factory scenarios against the filesystem.
pub mod lifecycle {
    use rbf_core::{RbfError, RbfFile};
    use std::path::Path;

    /// Checks create and open failures in `dir`.
    pub fn test_factory_failures(dir: &Path) {
        let existing = dir.join("existing.rbf");
        RbfFile::create_new(&existing)
            .expect("Failed to create")
            .close()
            .expect("Failed to close");
        assert!(matches!(
            RbfFile::create_new(&existing),
            Err(RbfError::AlreadyExists { .. })
        ));

        let missing = dir.join("missing.rbf");
        assert!(matches!(
            RbfFile::open_existing(&missing),
            Err(RbfError::NotFound { .. })
        ));
        assert!(!missing.exists());

        let short = dir.join("short.rbf");
        std::fs::write(&short, b"RB").expect("Failed to write");
        assert!(matches!(
            RbfFile::open_existing(&short),
            Err(RbfError::FileTooShort { length: 2 })
        ));

        let wrong = dir.join("wrong.rbf");
        std::fs::write(&wrong, b"RBF2").expect("Failed to write");
        assert!(matches!(
            RbfFile::open_existing(&wrong),
            Err(RbfError::HeaderFenceMismatch { found }) if &found == b"RBF2"
        ));

        let misaligned = dir.join("misaligned.rbf");
        std::fs::write(&misaligned, b"RBF1\0\0").expect("Failed to write");
        assert!(matches!(
            RbfFile::open_existing(&misaligned),
            Err(RbfError::MisalignedLength { length: 6 })
        ));
    }

    /// Writes frames, closes, reopens and reads them back.
    pub fn test_round_trip(path: &Path) {
        let tickets = {
            let file = RbfFile::create_new(path).expect("Failed to create");
            let tickets = crate::fixtures::scenarios::append_numbered(&file, 5);
            file.durable_flush().expect("Failed to flush");
            file.close().expect("Failed to close");
            tickets
        };

        let file = RbfFile::open_existing(path).expect("Failed to reopen");
        let last = tickets.last().expect("Appended frames");
        assert_eq!(file.tail_offset(), last.end_offset() + 4);
        for (i, ticket) in tickets.iter().enumerate() {
            let frame = file.read_pooled_frame(*ticket).expect("Failed to read");
            assert_eq!(frame.tag(), i as u32);
            assert!(frame.payload().starts_with(format!("frame-{i}").as_bytes()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_harness() {
        for mut harness in [LogHarness::memory(), LogHarness::file()] {
            harness.append_simple(1, b"alpha");
            harness.append(FrameSpec {
                tag: 2,
                payload: b"beta".to_vec(),
                tail_meta: b"meta".to_vec(),
                tombstone: false,
            });
            harness.append(FrameSpec {
                tag: 3,
                payload: Vec::new(),
                tail_meta: Vec::new(),
                tombstone: true,
            });
            harness.verify_all();
            harness.verify_scan();

            harness.truncate_to(1);
            assert_eq!(harness.tracked_count(), 1);
            let harness = harness.reopen();
            harness.verify_all();
            harness.verify_scan();
        }
    }

    #[test]
    fn test_truncate_after_second() {
        recovery::test_truncate_after_second(&TestLog::memory());
        recovery::test_truncate_after_second(&TestLog::file());
    }

    #[test]
    fn test_strict_reverse_order() {
        recovery::test_strict_reverse_order(&TestLog::memory(), 40);
        recovery::test_strict_reverse_order(&TestLog::file(), 12);
    }

    #[test]
    fn test_payload_corruption_found_on_read() {
        recovery::test_payload_corruption_found_on_read(&TestLog::memory());
        recovery::test_payload_corruption_found_on_read(&TestLog::file());
    }

    #[test]
    fn test_trailer_corruption_stops_scan() {
        for victim in 0..5 {
            recovery::test_trailer_corruption_stops_scan(&TestLog::memory(), 5, victim);
        }
        recovery::test_trailer_corruption_stops_scan(&TestLog::file(), 4, 1);
    }

    #[test]
    fn test_abort_is_invisible() {
        recovery::test_abort_is_invisible(&TestLog::memory());
        recovery::test_abort_is_invisible(&TestLog::file());
    }

    #[test]
    fn test_flush_and_close_idempotent() {
        recovery::test_flush_and_close_idempotent(&TestLog::memory());
        recovery::test_flush_and_close_idempotent(&TestLog::file());
    }

    #[test]
    fn test_factory_failures() {
        let dir = tempdir().unwrap();
        lifecycle::test_factory_failures(dir.path());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        lifecycle::test_round_trip(&dir.path().join("round_trip.rbf"));
    }
}
