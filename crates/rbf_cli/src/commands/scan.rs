//! Scan command implementation.

use super::open_shared;
use rbf_core::{RbfFile, RbfFrameInfo};
use serde::Serialize;
use std::path::Path;

/// Frame representation for output.
#[derive(Debug, Serialize)]
pub struct FrameListing {
    /// Frame offset.
    pub offset: u64,
    /// Frame length.
    pub length: u32,
    /// Packed ticket value.
    pub ticket: u64,
    /// Caller tag.
    pub tag: u32,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Tail meta size in bytes.
    pub tail_meta_size: usize,
    /// Whether the frame is a tombstone.
    pub tombstone: bool,
}

impl From<&RbfFrameInfo> for FrameListing {
    fn from(info: &RbfFrameInfo) -> Self {
        let ticket = info.ticket();
        Self {
            offset: ticket.offset(),
            length: ticket.length(),
            ticket: ticket.to_packed(),
            tag: info.tag(),
            payload_size: info.payload_length(),
            tail_meta_size: info.tail_meta_length(),
            tombstone: info.is_tombstone(),
        }
    }
}

/// Scan output: the frames plus how the walk ended.
#[derive(Debug, Serialize)]
pub struct ScanListing {
    /// Frames, newest first.
    pub frames: Vec<FrameListing>,
    /// The error that stopped the scan, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<String>,
}

/// Runs the scan command.
pub fn run(
    path: &Path,
    show_tombstones: bool,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = open_shared(path)?;
    let listing = list_frames(&file, show_tombstones, limit);
    file.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        _ => {
            print_text_output(&listing);
        }
    }

    Ok(())
}

/// Lists up to `limit` frames newest first.
pub fn list_frames(file: &RbfFile, show_tombstones: bool, limit: Option<usize>) -> ScanListing {
    let mut scan = file.scan_reverse(show_tombstones);
    let frames = scan
        .by_ref()
        .take(limit.unwrap_or(usize::MAX))
        .map(|info| FrameListing::from(&info))
        .collect();
    ScanListing {
        frames,
        stopped: scan.take_terminal_error().map(|e| e.to_string()),
    }
}

fn print_text_output(listing: &ScanListing) {
    println!(
        "{:>12}  {:>10}  {:>10}  {:>8}  {:>6}  FLAGS",
        "OFFSET", "LENGTH", "TAG", "PAYLOAD", "META"
    );
    for frame in &listing.frames {
        println!(
            "{:>12}  {:>10}  {:#010x}  {:>8}  {:>6}  {}",
            frame.offset,
            frame.length,
            frame.tag,
            frame.payload_size,
            frame.tail_meta_size,
            if frame.tombstone { "tombstone" } else { "" }
        );
    }
    println!();
    println!("Listed {} frame(s)", listing.frames.len());
    if let Some(error) = &listing.stopped {
        println!("Scan stopped early: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_log;

    #[test]
    fn lists_newest_first_with_limit() {
        let (_dir, path) = sample_log(5);
        let file = open_shared(&path).unwrap();

        let listing = list_frames(&file, false, Some(2));
        let tags: Vec<_> = listing.frames.iter().map(|f| f.tag).collect();
        assert_eq!(tags, vec![4, 3]);
        assert!(listing.stopped.is_none());

        let listing = list_frames(&file, false, None);
        assert_eq!(listing.frames.len(), 5);
        assert_eq!(listing.frames.last().unwrap().offset, 4);
    }

    #[test]
    fn tombstones_are_opt_in() {
        let (_dir, path) = sample_log(1);
        let file = RbfFile::open_existing(&path).unwrap();
        file.append_tombstone(9, b"", b"").unwrap();

        assert_eq!(list_frames(&file, false, None).frames.len(), 1);
        let listing = list_frames(&file, true, None);
        assert!(listing.frames[0].tombstone);
        assert_eq!(listing.frames[0].tag, 9);
    }
}
