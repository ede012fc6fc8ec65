//! Dump command implementation.

use super::{open_shared, to_hex, to_printable};
use rbf_core::{RbfFile, Ticket};
use serde::Serialize;
use std::path::Path;

/// A fully verified frame for output.
#[derive(Debug, Serialize)]
pub struct FrameDump {
    /// Frame offset.
    pub offset: u64,
    /// Frame length.
    pub length: u32,
    /// Caller tag.
    pub tag: u32,
    /// Whether the frame is a tombstone.
    pub tombstone: bool,
    /// Payload bytes (hex-encoded).
    pub payload_hex: String,
    /// Tail meta bytes (hex-encoded).
    pub tail_meta_hex: String,
    #[serde(skip)]
    payload: Vec<u8>,
    #[serde(skip)]
    tail_meta: Vec<u8>,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    offset: u64,
    length: u32,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = open_shared(path)?;
    let dump = dump_frame(&file, offset, length)?;
    file.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
        _ => {
            print_text_output(&dump);
        }
    }

    Ok(())
}

/// Reads and verifies the frame at `offset`.
pub fn dump_frame(
    file: &RbfFile,
    offset: u64,
    length: u32,
) -> Result<FrameDump, Box<dyn std::error::Error>> {
    let ticket = Ticket::new(offset, length)?;
    let frame = file.read_pooled_frame(ticket)?;
    Ok(FrameDump {
        offset,
        length,
        tag: frame.tag(),
        tombstone: frame.is_tombstone(),
        payload_hex: to_hex(frame.payload()),
        tail_meta_hex: to_hex(frame.tail_meta()),
        payload: frame.payload().to_vec(),
        tail_meta: frame.tail_meta().to_vec(),
    })
}

fn print_text_output(dump: &FrameDump) {
    println!("Frame {}+{}", dump.offset, dump.length);
    println!("  Tag:       {:#010x}", dump.tag);
    println!("  Tombstone: {}", dump.tombstone);
    print_bytes("Payload", &dump.payload);
    print_bytes("Tail meta", &dump.tail_meta);
}

fn print_bytes(label: &str, bytes: &[u8]) {
    println!("  {label} ({} bytes):", bytes.len());
    for (row, chunk) in bytes.chunks(16).enumerate() {
        println!(
            "    {:08x}  {:<32}  {}",
            row * 16,
            to_hex(chunk),
            to_printable(chunk)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_log;

    #[test]
    fn dumps_first_frame() {
        let (_dir, path) = sample_log(2);
        let file = open_shared(&path).unwrap();
        let first = file.scan_reverse(false).last().unwrap().ticket();

        let dump = dump_frame(&file, first.offset(), first.length()).unwrap();
        assert_eq!(dump.tag, 0);
        assert_eq!(dump.payload_hex, to_hex(b"payload-0"));
        assert_eq!(dump.tail_meta_hex, "6d");
    }

    #[test]
    fn wrong_length_is_rejected() {
        let (_dir, path) = sample_log(1);
        let file = open_shared(&path).unwrap();
        assert!(dump_frame(&file, 4, 28).is_err());
        assert!(dump_frame(&file, 5, 32).is_err());
    }
}
