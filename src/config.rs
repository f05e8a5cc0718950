//! Configuration options for table writers.

use crate::{DEFAULT_BLOCK_RESTART_INTERVAL, DEFAULT_BLOCK_SIZE};

/// Configuration options for a [`Writer`](crate::Writer).
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Minimum uncompressed size in bytes of each table block.
    /// Default: 4KiB
    pub block_size: usize,

    /// Number of entries between section restart points for delta
    /// encoding of keys.
    /// Default: 16
    pub block_restart_interval: usize,

    /// Compression codec applied to blocks.
    /// Default: Compression::Snappy
    pub compression: Compression,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            compression: Compression::Snappy,
        }
    }
}

impl WriterOptions {
    /// Creates a new WriterOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the block restart interval.
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    /// Sets the compression codec.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Replaces zero-valued fields with their defaults.
    pub(crate) fn normalized(mut self) -> Self {
        if self.block_size < 1 {
            self.block_size = DEFAULT_BLOCK_SIZE;
        }
        if self.block_restart_interval < 1 {
            self.block_restart_interval = DEFAULT_BLOCK_RESTART_INTERVAL;
        }
        self
    }
}

/// Compression codecs supported for table blocks.
///
/// Snappy is the default; storing blocks uncompressed must be requested
/// explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Snappy compression (fast, moderate compression ratio).
    Snappy,

    /// No compression.
    None,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Snappy
    }
}
