//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod salvage;
pub mod scan;
pub mod truncate;
pub mod verify;

use rbf_core::{RbfConfig, RbfFile, RbfResult};
use std::path::Path;

/// Opens a file for inspection without taking the exclusive lock.
pub fn open_shared(path: &Path) -> RbfResult<RbfFile> {
    RbfFile::open_existing_with(path, RbfConfig::default().exclusive_lock(false))
}

/// Lowercase hex of `bytes`.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Printable rendering of `bytes`, with `.` for anything outside ASCII.
pub fn to_printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use rbf_core::RbfFile;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Creates a closed log holding `count` frames tagged `0..count`.
    pub fn sample_log(count: u32) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.rbf");
        let file = RbfFile::create_new(&path).unwrap();
        for i in 0..count {
            file.append(i, format!("payload-{i}").as_bytes(), b"m").unwrap();
        }
        file.close().unwrap();
        (dir, path)
    }

    /// XORs one byte of the file at `path`.
    pub fn flip(path: &Path, offset: u64) {
        let mut bytes = std::fs::read(path).unwrap();
        bytes[offset as usize] ^= 0xFF;
        std::fs::write(path, bytes).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_printable() {
        assert_eq!(to_hex(b"\x00\xffA"), "00ff41");
        assert_eq!(to_printable(b"ab\ncd"), "ab.cd");
    }
}
