//! # RBF Storage
//!
//! Positioned byte storage underneath the RBF record log.
//!
//! Backends are **opaque byte stores** addressed by explicit offsets. They
//! know nothing about frames, fences or checksums; `rbf_core` owns all
//! format interpretation.
//!
//! ## Design Principles
//!
//! - Every operation takes an explicit offset (no shared seek cursor)
//! - Writes past the current end extend the store
//! - `flush` hands buffered bytes to the OS, `sync` makes them durable
//! - Must be `Send + Sync`; backends lock internally
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and fault injection
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use rbf_storage::{StorageBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.write_at(0, b"hello world").unwrap();
//! let mut buf = [0u8; 5];
//! backend.read_exact_at(6, &mut buf).unwrap();
//! assert_eq!(&buf, b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
