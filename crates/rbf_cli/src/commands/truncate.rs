//! Truncate command implementation.

use rbf_core::salvage::last_good_boundary;
use rbf_core::RbfFile;
use std::path::Path;
use tracing::info;

/// Where to cut the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// An explicit length.
    Length(u64),
    /// The largest offset from which a reverse scan is clean.
    LastGood,
}

/// Runs the truncate command.
///
/// Takes the exclusive lock, so it fails while a writer has the file open.
pub fn run(path: &Path, target: Target, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let file = RbfFile::open_existing(path)?;
    let from = file.tail_offset();
    let to = resolve(&file, target)?;

    if dry_run {
        println!("Would truncate {path:?} from {from} to {to} bytes");
        println!("Dry run - no changes made");
        return Ok(());
    }

    if to == from {
        println!("Nothing to do: {path:?} is already {from} bytes");
    } else {
        file.truncate(to)?;
        file.durable_flush()?;
        info!(from, to, "truncated RBF file");
        println!("Truncated {path:?} from {from} to {to} bytes");
    }
    file.close()?;
    Ok(())
}

/// Resolves `target` to a byte length for `file`.
pub fn resolve(file: &RbfFile, target: Target) -> Result<u64, Box<dyn std::error::Error>> {
    match target {
        Target::Length(length) => Ok(length),
        Target::LastGood => Ok(last_good_boundary(file)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::sample_log;

    #[test]
    fn cuts_torn_tail() {
        let (_dir, path) = sample_log(3);
        let good_length = std::fs::metadata(&path).unwrap().len();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0u8; 20]);
        std::fs::write(&path, bytes).unwrap();

        run(&path, Target::LastGood, true).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_length + 20);

        run(&path, Target::LastGood, false).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_length);

        let file = RbfFile::open_existing(&path).unwrap();
        assert_eq!(file.scan_reverse(false).count(), 3);
    }

    #[test]
    fn rejects_unaligned_length() {
        let (_dir, path) = sample_log(1);
        assert!(run(&path, Target::Length(6), false).is_err());
        assert!(run(&path, Target::Length(4), false).is_ok());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4);
    }
}
