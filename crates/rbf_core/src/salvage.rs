//! Best-effort recovery of frames behind damaged regions.
//!
//! [`ScanReverse`](crate::ScanReverse) stops at the first damaged byte. When
//! an operator needs to know what is still readable beyond that point,
//! [`salvage_scan`] walks backwards in 4-byte steps, looking for any fence
//! preceded by a fully verified frame. It only reads.

use crate::error::{RbfError, RbfResult};
use crate::file::RbfFile;
use crate::frame::RbfFrameInfo;
use crate::layout::{FENCE_SIZE, HEADER_ONLY_LENGTH};
use crate::raw;
use std::iter;
use tracing::{debug, warn};

/// A byte range the salvage walk could not attribute to a valid frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedRegion {
    /// First skipped byte.
    pub start: u64,
    /// One past the last skipped byte.
    pub end: u64,
}

impl SkippedRegion {
    /// Length of the region in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the region is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Result of [`salvage_scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalvageReport {
    /// Every verified frame found, newest first.
    pub frames: Vec<RbfFrameInfo>,
    /// Damaged or unattributable regions, newest first.
    pub skipped: Vec<SkippedRegion>,
}

impl SalvageReport {
    /// Total bytes that belong to no recovered frame.
    #[must_use]
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped.iter().map(SkippedRegion::len).sum()
    }

    /// Whether every byte after the header belongs to a verified frame.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Walks the whole file backwards and collects every frame whose trailer,
/// `HeadLen` and `PayloadCrc` all verify, skipping over damage.
///
/// Tombstones are included.
///
/// # Errors
///
/// Returns [`RbfError::Closed`] after close or an I/O error. Corruption is
/// reported in the result, never as an error.
pub fn salvage_scan(file: &RbfFile) -> RbfResult<SalvageReport> {
    let mut report = SalvageReport::default();
    let mut position = file.tail_offset() & !3;
    let mut skip_end: Option<u64> = None;

    while position > HEADER_ONLY_LENGTH {
        match verified_frame_before(file, position) {
            Ok(info) => {
                if let Some(end) = skip_end.take() {
                    record_skip(&mut report, position, end);
                }
                report.frames.push(info);
                position = info.ticket().offset();
            }
            Err(e) if is_recoverable(&e) => {
                skip_end.get_or_insert(position);
                position -= 4;
            }
            Err(e) => return Err(e),
        }
    }
    if let Some(end) = skip_end {
        record_skip(&mut report, position, end);
    }

    debug!(
        frames = report.frames.len(),
        skipped_bytes = report.skipped_bytes(),
        "salvage scan finished"
    );
    Ok(report)
}

/// Finds the largest fence end from which a strict reverse scan reaches the
/// header without error.
///
/// Truncating the file to this offset removes a damaged tail while keeping
/// every frame before it. Returns the tail offset itself when the file is
/// already clean.
///
/// # Errors
///
/// Returns [`RbfError::Closed`] after close or an I/O error.
pub fn last_good_boundary(file: &RbfFile) -> RbfResult<u64> {
    let tail = file.tail_offset();
    if tail <= HEADER_ONLY_LENGTH {
        return Ok(tail);
    }
    if scans_cleanly(file, tail)? {
        return Ok(tail);
    }

    let report = salvage_scan(file)?;
    let candidates = report
        .frames
        .iter()
        .map(|info| info.ticket().end_offset() + FENCE_SIZE as u64)
        .chain(iter::once(HEADER_ONLY_LENGTH));
    for candidate in candidates {
        if scans_cleanly(file, candidate)? {
            return Ok(candidate);
        }
    }
    Ok(HEADER_ONLY_LENGTH)
}

fn scans_cleanly(file: &RbfFile, fence_end: u64) -> RbfResult<bool> {
    let mut scan = file.scan_reverse_from(fence_end, true)?;
    scan.by_ref().for_each(drop);
    match scan.take_terminal_error() {
        None => Ok(true),
        Some(e) if is_recoverable(&e) => Ok(false),
        Some(e) => Err(e),
    }
}

fn verified_frame_before(file: &RbfFile, fence_end: u64) -> RbfResult<RbfFrameInfo> {
    let max_frame_length = file.config().max_frame_length;
    let info = file.with_backend(|backend| {
        raw::read_trailer_before(backend, fence_end, max_frame_length)
    })?;
    let mut frame = file.read_pooled_frame(info.ticket())?;
    frame.release();
    Ok(info)
}

/// Damage, as opposed to a closed handle or failing disk.
fn is_recoverable(error: &RbfError) -> bool {
    error.is_corruption() || matches!(error, RbfError::InvalidArgument { .. })
}

fn record_skip(report: &mut SalvageReport, start: u64, end: u64) {
    warn!(start, end, "skipped unreadable region");
    report.skipped.push(SkippedRegion { start, end });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RbfConfig;
    use rbf_storage::{InMemoryBackend, StorageBackend};
    use std::sync::Arc;

    fn memory_file() -> (Arc<InMemoryBackend>, RbfFile) {
        let backend = Arc::new(InMemoryBackend::new());
        let file =
            RbfFile::create_with_backend(Box::new(Arc::clone(&backend)), RbfConfig::default())
                .unwrap();
        (backend, file)
    }

    #[test]
    fn clean_file() {
        let (_backend, file) = memory_file();
        for i in 0..3u32 {
            file.append(i, b"clean", b"m").unwrap();
        }
        let report = salvage_scan(&file).unwrap();
        assert_eq!(report.frames.len(), 3);
        assert!(report.is_clean());
        assert_eq!(last_good_boundary(&file).unwrap(), file.tail_offset());
    }

    #[test]
    fn recovers_frames_behind_damage() {
        let (backend, file) = memory_file();
        let tickets: Vec<_> = (0..5u32)
            .map(|i| file.append(i, b"record", b"").unwrap())
            .collect();
        backend.mutate_byte(tickets[2].offset() + 6, |b| b ^ 0x80);

        let tags: Vec<_> = file.scan_reverse(true).map(|i| i.tag()).collect();
        assert_eq!(tags, vec![4, 3, 2, 1, 0]);

        let report = salvage_scan(&file).unwrap();
        let tags: Vec<_> = report.frames.iter().map(|i| i.tag()).collect();
        assert_eq!(tags, vec![4, 3, 1, 0]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0],
            SkippedRegion {
                start: tickets[2].offset(),
                end: tickets[2].end_offset() + 4,
            }
        );
    }

    #[test]
    fn boundary_excludes_damaged_tail() {
        let (backend, file) = memory_file();
        let tickets: Vec<_> = (0..4u32)
            .map(|i| file.append(i, b"abcd", b"").unwrap())
            .collect();
        // Break the trailer of the newest frame.
        backend.mutate_byte(tickets[3].end_offset() - 8, |b| b ^ 0x01);

        let boundary = last_good_boundary(&file).unwrap();
        assert_eq!(boundary, tickets[2].end_offset() + 4);

        file.truncate(boundary).unwrap();
        let frames = file.scan_reverse(true).into_result().unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn boundary_of_garbage_tail() {
        let (backend, file) = memory_file();
        let ticket = file.append(1, b"keep", b"").unwrap();
        drop(file);

        backend.write_at(ticket.end_offset() + 4, &[0xEE; 12]).unwrap();
        let file = RbfFile::open_with_backend(
            Box::new(Arc::clone(&backend)),
            RbfConfig::default(),
        )
        .unwrap();

        assert_eq!(last_good_boundary(&file).unwrap(), ticket.end_offset() + 4);
        let report = salvage_scan(&file).unwrap();
        assert_eq!(report.skipped_bytes(), 12);
    }
}
