//! File handle configuration.

use crate::ticket::Ticket;

/// Configuration for creating or opening an RBF file.
#[derive(Debug, Clone)]
pub struct RbfConfig {
    /// Largest frame length the reverse scanner will accept from a trailer.
    ///
    /// Never above [`Ticket::MAX_LENGTH`]; lowering it makes the scanner
    /// reject implausible `TailLen` values earlier.
    pub max_frame_length: u32,

    /// Whether to sync the file after every successful append.
    pub sync_on_append: bool,

    /// Whether `create_new` creates missing parent directories.
    pub create_parent_dirs: bool,

    /// Initial staging capacity of a frame builder, in bytes.
    pub builder_capacity: usize,

    /// Whether to hold an advisory exclusive lock while the file is open.
    pub exclusive_lock: bool,

    /// How many released buffers the read pool keeps for reuse.
    pub pool_retained_buffers: usize,
}

impl Default for RbfConfig {
    fn default() -> Self {
        Self {
            max_frame_length: Ticket::MAX_LENGTH,
            sync_on_append: false,
            create_parent_dirs: false,
            builder_capacity: 4096,
            exclusive_lock: true,
            pool_retained_buffers: 8,
        }
    }
}

impl RbfConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest frame length accepted during reverse scans.
    ///
    /// Values above [`Ticket::MAX_LENGTH`] are clamped.
    #[must_use]
    pub const fn max_frame_length(mut self, value: u32) -> Self {
        self.max_frame_length = if value > Ticket::MAX_LENGTH {
            Ticket::MAX_LENGTH
        } else {
            value
        };
        self
    }

    /// Sets whether to sync after every append.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Sets whether to create missing parent directories on create.
    #[must_use]
    pub const fn create_parent_dirs(mut self, value: bool) -> Self {
        self.create_parent_dirs = value;
        self
    }

    /// Sets the initial builder staging capacity.
    #[must_use]
    pub const fn builder_capacity(mut self, value: usize) -> Self {
        self.builder_capacity = value;
        self
    }

    /// Sets whether to take an exclusive advisory lock.
    #[must_use]
    pub const fn exclusive_lock(mut self, value: bool) -> Self {
        self.exclusive_lock = value;
        self
    }

    /// Sets how many buffers the read pool retains.
    #[must_use]
    pub const fn pool_retained_buffers(mut self, value: usize) -> Self {
        self.pool_retained_buffers = value;
        self
    }
}
