//! # RBF Testkit
//!
//! Test utilities for RBF.
//!
//! This crate provides:
//! - Log fixtures backed by memory or a temporary directory
//! - Byte-level corruption helpers addressed by frame region
//! - A crash-injecting storage backend
//! - Property-based test generators using proptest
//! - Golden frame vectors for format verification
//! - Recovery scenarios exercised across crates
//!
//! ## Usage
//!
//! ```rust
//! use rbf_testkit::prelude::*;
//!
//! with_temp_log(|log| {
//!     let ticket = log.append(1, b"payload", b"").unwrap();
//!     assert_eq!(log.scan_reverse(false).count(), 1);
//!     assert_eq!(ticket.offset(), 4);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod corrupt;
pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod golden;
pub mod integration;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::corrupt::*;
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::golden::*;
    pub use crate::integration::*;
    pub use crate::vectors::*;
}

pub use corrupt::*;
pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use golden::*;
pub use integration::*;
pub use vectors::*;
