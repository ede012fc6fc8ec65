//! Shared helpers for the RBF benchmarks.

pub mod utils;
