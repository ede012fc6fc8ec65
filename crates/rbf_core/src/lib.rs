//! # RBF Core
//!
//! Reversible binary framing: an append-only log of self-delimiting frames
//! that can be read forwards by ticket and walked backwards from the tail.
//!
//! ## File Layout
//!
//! ```text
//! "RBF1" | Frame | "RBF1" | Frame | "RBF1" | ...
//!
//! Frame = HeadLen u32 LE
//!       | Payload (N bytes) | TailMeta (M bytes) | Padding (0-3 zero bytes)
//!       | PayloadCrc u32 LE  (CRC32C of Payload, TailMeta, Padding)
//!       | TrailerCrc u32 BE  (CRC32C of the next 12 bytes)
//!       | FrameDescriptor u32 LE | FrameTag u32 LE | TailLen u32 LE
//! ```
//!
//! The fence written after every frame is also the file header, so a file
//! ends on a fence whenever no append is in flight. A crash mid-append
//! leaves a tail that reverse scans refuse to cross; truncating to the last
//! good fence restores a clean file.
//!
//! ## Reading
//!
//! - [`RbfFile::read_frame`] verifies everything, including `PayloadCrc`
//! - [`RbfFile::scan_reverse`] trusts only trailers and never reads payloads
//! - [`salvage::salvage_scan`] hunts for valid frames past damage
//!
//! ## Example
//!
//! ```rust
//! use rbf_core::{RbfConfig, RbfFile};
//! use rbf_storage::InMemoryBackend;
//!
//! let file = RbfFile::create_with_backend(Box::new(InMemoryBackend::new()), RbfConfig::default())?;
//! file.append(1, b"first", b"")?;
//! file.append(2, b"second", b"meta")?;
//!
//! let tags: Vec<u32> = file.scan_reverse(false).map(|info| info.tag()).collect();
//! assert_eq!(tags, vec![2, 1]);
//! # Ok::<(), rbf_core::RbfError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
pub mod crc;
mod error;
mod file;
mod frame;
pub mod layout;
mod pool;
mod raw;
pub mod salvage;
mod scan;
mod ticket;
pub mod trailer;
mod writer;

pub use builder::RbfFrameBuilder;
pub use config::RbfConfig;
pub use error::{CrcRegion, ErrorCategory, RbfError, RbfResult};
pub use file::RbfFile;
pub use frame::{RbfFrame, RbfFrameInfo};
pub use pool::{BufferPool, PooledFrame, PooledTailMeta};
pub use salvage::{SalvageReport, SkippedRegion};
pub use scan::ScanReverse;
pub use ticket::Ticket;
pub use writer::{ReservableWriter, ReservationToken};

/// Crate version, for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
