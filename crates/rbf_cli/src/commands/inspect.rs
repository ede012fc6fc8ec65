//! Inspect command implementation.

use super::{open_shared, to_hex};
use rbf_core::layout::FENCE;
use rbf_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::path::Path;

/// File inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// File path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// First four bytes of the file (hex-encoded).
    pub header_hex: String,
    /// Whether the header fence is intact.
    pub header_valid: bool,
    /// Why the file cannot be opened, if it cannot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_error: Option<String>,
    /// Number of live frames reached by the reverse scan.
    pub frame_count: usize,
    /// Number of tombstones reached by the reverse scan.
    pub tombstone_count: usize,
    /// Total payload bytes of the frames reached.
    pub payload_bytes: u64,
    /// Total tail meta bytes of the frames reached.
    pub tail_meta_bytes: u64,
    /// Offset where the scan stopped (4 when it reached the header).
    pub scan_stopped_at: u64,
    /// The error that stopped the scan, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics about the file at `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No RBF file found at {path:?}").into());
    }

    let (file_size, header) = {
        let backend = FileBackend::open_existing(path)?;
        let mut header = [0u8; 4];
        let read = backend.read_at(0, &mut header)?;
        (backend.size()?, header[..read].to_vec())
    };

    let mut result = InspectResult {
        path: path.display().to_string(),
        file_size,
        header_hex: to_hex(&header),
        header_valid: header == FENCE,
        open_error: None,
        frame_count: 0,
        tombstone_count: 0,
        payload_bytes: 0,
        tail_meta_bytes: 0,
        scan_stopped_at: 0,
        scan_error: None,
    };

    let file = match open_shared(path) {
        Ok(file) => file,
        Err(e) => {
            result.open_error = Some(e.to_string());
            return Ok(result);
        }
    };

    let mut scan = file.scan_reverse(true);
    for info in scan.by_ref() {
        if info.is_tombstone() {
            result.tombstone_count += 1;
        } else {
            result.frame_count += 1;
        }
        result.payload_bytes += info.payload_length() as u64;
        result.tail_meta_bytes += info.tail_meta_length() as u64;
    }
    result.scan_stopped_at = scan.position();
    result.scan_error = scan.take_terminal_error().map(|e| e.to_string());
    file.close()?;

    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("RBF File: {}", result.path);
    println!();
    println!("Size:   {} bytes", result.file_size);
    println!(
        "Header: {} ({})",
        result.header_hex,
        if result.header_valid { "valid" } else { "INVALID" }
    );

    if let Some(error) = &result.open_error {
        println!();
        println!("Cannot open file: {error}");
        return;
    }

    println!();
    println!("Frames:");
    println!("  Live:       {}", result.frame_count);
    println!("  Tombstones: {}", result.tombstone_count);
    println!("  Payload:    {} bytes", result.payload_bytes);
    println!("  Tail meta:  {} bytes", result.tail_meta_bytes);

    println!();
    match &result.scan_error {
        None => println!("Reverse scan reached the header"),
        Some(error) => println!(
            "Reverse scan stopped at offset {}: {}",
            result.scan_stopped_at, error
        ),
    }
}
