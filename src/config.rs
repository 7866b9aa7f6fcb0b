//! Configuration options for table building.

use crate::comparator::{BytewiseComparator, Comparator};
use crate::filter::FilterPolicy;
use std::sync::Arc;

/// Default soft threshold for data block payloads (4KB).
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default restart cadence for data blocks.
pub const DEFAULT_BLOCK_RESTART_INTERVAL: usize = 16;

/// Options controlling how a table is built.
#[derive(Clone)]
pub struct Options {
    /// Soft size threshold (in uncompressed bytes) for data blocks.
    /// The current block is flushed once its estimated size reaches this.
    /// Default: 4KB
    pub block_size: usize,

    /// Number of entries between restart points in data blocks.
    /// Index blocks always use an interval of 1 regardless.
    /// Default: 16
    pub block_restart_interval: usize,

    /// Compression applied to data, meta-index and index blocks.
    /// Default: Snappy when the `snappy` feature is enabled
    pub compression: CompressionType,

    /// Filter policy for data blocks, or `None` for no filter block.
    /// Default: None
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// Total order over keys.
    /// Default: byte-wise
    pub comparator: Arc<dyn Comparator>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            compression: CompressionType::default(),
            filter_policy: None,
            comparator: Arc::new(BytewiseComparator),
        }
    }
}

/// Compression algorithms recognized in block trailers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    Snappy = 1,
}

impl CompressionType {
    /// Convert from the trailer type byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            _ => None,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data block size threshold.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the restart cadence for data blocks.
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    /// Sets the compression algorithm.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the filter policy.
    pub fn filter_policy(mut self, policy: Arc<dyn FilterPolicy>) -> Self {
        self.filter_policy = Some(policy);
        self
    }

    /// Sets the comparator.
    pub fn comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        if self.block_restart_interval == 0 {
            return Err(crate::Error::invalid_argument("block_restart_interval must be > 0"));
        }
        Ok(())
    }
}
