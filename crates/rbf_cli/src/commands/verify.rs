//! Verify command implementation.

use super::open_shared;
use rbf_core::salvage::last_good_boundary;
use rbf_core::RbfFile;
use std::path::Path;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of frames checked.
    pub frames_checked: usize,
    /// Number of frames whose payload checksum passed.
    pub valid_frames: usize,
    /// Number of frames whose payload checksum failed.
    pub corrupt_frames: usize,
    /// Where the reverse scan stopped, if it did not reach the header.
    pub scan_stopped_at: Option<u64>,
    /// Largest offset the file can be truncated to for a clean scan.
    pub last_good_boundary: u64,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn new() -> Self {
        Self {
            frames_checked: 0,
            valid_frames: 0,
            corrupt_frames: 0,
            scan_stopped_at: None,
            last_good_boundary: 0,
            errors: Vec::new(),
        }
    }

    /// Whether the file has no problems.
    pub fn is_ok(&self) -> bool {
        self.corrupt_frames == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, check_payloads: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying RBF file at {path:?}");
    println!();

    let file = open_shared(path)?;
    let result = verify(&file, check_payloads)?;
    file.close()?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Verification passed");
        Ok(())
    } else {
        if result.scan_stopped_at.is_some() {
            println!(
                "  Truncating to {} bytes would restore a clean scan",
                result.last_good_boundary
            );
        }
        println!("✗ Verification failed");
        Err("Verification failed".into())
    }
}

/// Walks `file` newest first and checks every frame it reaches.
pub fn verify(
    file: &RbfFile,
    check_payloads: bool,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::new();

    let mut scan = file.scan_reverse(true);
    for info in scan.by_ref() {
        result.frames_checked += 1;
        if !check_payloads {
            result.valid_frames += 1;
            continue;
        }
        match file.read_pooled_frame(info.ticket()) {
            Ok(_) => result.valid_frames += 1,
            Err(e) if e.is_corruption() => {
                result.corrupt_frames += 1;
                result
                    .errors
                    .push(format!("Frame at {}: {}", info.ticket(), e));
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(error) = scan.take_terminal_error() {
        if !error.is_corruption() {
            return Err(error.into());
        }
        result.scan_stopped_at = Some(scan.position());
        result.errors.push(format!(
            "Scan stopped at offset {}: {}",
            scan.position(),
            error
        ));
    }
    result.last_good_boundary = last_good_boundary(file)?;

    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!(
        "  Frames checked: {}, valid: {}, corrupt: {}",
        result.frames_checked, result.valid_frames, result.corrupt_frames
    );
    for error in &result.errors {
        println!("    ERROR: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{flip, sample_log};

    #[test]
    fn clean_file_passes() {
        let (_dir, path) = sample_log(4);
        let file = open_shared(&path).unwrap();
        let result = verify(&file, true).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.frames_checked, 4);
        assert_eq!(result.last_good_boundary, file.tail_offset());
    }

    #[test]
    fn payload_damage_needs_payload_check() {
        let (_dir, path) = sample_log(2);
        // First payload byte of the first frame.
        flip(&path, 8);
        let file = open_shared(&path).unwrap();

        assert!(verify(&file, false).unwrap().is_ok());

        let result = verify(&file, true).unwrap();
        assert_eq!(result.corrupt_frames, 1);
        assert!(result.scan_stopped_at.is_none());
    }

    #[test]
    fn torn_tail_reports_boundary() {
        let (_dir, path) = sample_log(2);
        let good_length = std::fs::metadata(&path).unwrap().len();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0xEE; 12]);
        std::fs::write(&path, bytes).unwrap();

        let file = open_shared(&path).unwrap();
        let result = verify(&file, true).unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.scan_stopped_at, Some(good_length + 12));
        assert_eq!(result.last_good_boundary, good_length);
    }
}
