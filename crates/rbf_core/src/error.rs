//! Error types for RBF operations.

use rbf_storage::StorageError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for RBF operations.
pub type RbfResult<T> = Result<T, RbfError>;

/// Which CRC-protected region failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcRegion {
    /// The 12 bytes of descriptor, tag and tail length in the trailer.
    Trailer,
    /// Payload, tail meta and padding.
    Payload,
}

impl fmt::Display for CrcRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trailer => f.write_str("trailer"),
            Self::Payload => f.write_str("payload"),
        }
    }
}

/// Coarse classification of an [`RbfError`].
///
/// Callers that only need to decide "bad call", "bad bytes" or "bad disk"
/// should match on this rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller used the API incorrectly (bad argument, wrong state).
    Usage,
    /// Bytes on disk do not form a valid frame or file.
    Framing,
    /// A CRC did not match.
    Integrity,
    /// A caller-provided buffer was too small.
    Capacity,
    /// The storage layer failed.
    Io,
}

/// Errors that can occur in RBF operations.
#[derive(Debug, Error)]
pub enum RbfError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another handle holds the exclusive lock on the file.
    #[error("file locked: another process has exclusive access to {path:?}")]
    Locked {
        /// The locked file.
        path: PathBuf,
    },

    /// The file handle has been closed.
    #[error("file is closed")]
    Closed,

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// An argument was out of range or malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the bad argument.
        message: String,
    },

    /// `create_new` found something already at the path.
    #[error("file already exists: {path:?}")]
    AlreadyExists {
        /// The existing path.
        path: PathBuf,
    },

    /// `open_existing` found nothing at the path.
    #[error("file not found: {path:?}")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The file is shorter than the header fence.
    #[error("file too short: {length} bytes")]
    FileTooShort {
        /// Observed file length.
        length: u64,
    },

    /// The file length is not a multiple of 4.
    #[error("file length {length} is not 4-byte aligned")]
    MisalignedLength {
        /// Observed file length.
        length: u64,
    },

    /// The first four bytes are not the fence.
    #[error("header fence mismatch: found {found:02x?}")]
    HeaderFenceMismatch {
        /// The bytes found at offset 0.
        found: [u8; 4],
    },

    /// Bytes on disk violate the frame layout.
    #[error("framing error: {message}")]
    Framing {
        /// Description of the violation.
        message: String,
    },

    /// A CRC did not match the stored value.
    #[error("{region} CRC mismatch: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        /// The region that failed.
        region: CrcRegion,
        /// The stored CRC.
        expected: u32,
        /// The CRC computed over the bytes read.
        actual: u32,
    },

    /// A caller-provided buffer cannot hold the requested bytes.
    #[error("buffer too small: required {required} bytes, provided {provided}")]
    BufferTooSmall {
        /// Bytes needed.
        required: usize,
        /// Bytes available.
        provided: usize,
    },
}

impl RbfError {
    /// Creates a framing error.
    pub fn framing(message: impl Into<String>) -> Self {
        Self::Framing {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a CRC mismatch error for `region`.
    pub fn crc_mismatch(region: CrcRegion, expected: u32, actual: u32) -> Self {
        Self::CrcMismatch {
            region,
            expected,
            actual,
        }
    }

    /// Returns the coarse category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Closed
            | Self::InvalidOperation { .. }
            | Self::InvalidArgument { .. }
            | Self::AlreadyExists { .. }
            | Self::NotFound { .. }
            | Self::Locked { .. } => ErrorCategory::Usage,
            Self::FileTooShort { .. }
            | Self::MisalignedLength { .. }
            | Self::HeaderFenceMismatch { .. }
            | Self::Framing { .. } => ErrorCategory::Framing,
            Self::CrcMismatch { .. } => ErrorCategory::Integrity,
            Self::BufferTooSmall { .. } => ErrorCategory::Capacity,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Returns `true` if the error reports damaged bytes on disk.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Framing | ErrorCategory::Integrity
        )
    }
}
