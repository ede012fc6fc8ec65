//! Benchmark utilities.

use rbf_core::{RbfConfig, RbfFile, Ticket};
use rbf_storage::InMemoryBackend;

/// Payload sizes exercised by every group.
pub const PAYLOAD_SIZES: [usize; 4] = [64, 256, 1024, 16 * 1024];

/// Generate deterministic payload data of the specified size.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Opens an empty in-memory log.
pub fn memory_log() -> RbfFile {
    RbfFile::create_with_backend(Box::new(InMemoryBackend::new()), RbfConfig::default())
        .expect("Failed to create in-memory log")
}

/// Fills `file` with `count` frames of `payload_size` bytes each.
pub fn fill(file: &RbfFile, count: usize, payload_size: usize) -> Vec<Ticket> {
    let data = payload(payload_size);
    (0..count)
        .map(|i| {
            file.append(i as u32, &data, &(i as u32).to_le_bytes())
                .expect("Failed to append")
        })
        .collect()
}
