//! Filter block implementation for SSTable.
//!
//! The filter block holds a sequence of filters indexed by data-block file
//! offset: filter `i` summarizes the keys of every data block whose offset
//! falls in `[i * 2KB, (i+1) * 2KB)`. A reader recovers the right filter
//! from a data block's handle alone (`index = offset >> base_lg`), with no
//! per-block filter table.
//!
//! Format (always stored uncompressed):
//! ```text
//! [filter 0]
//! [filter 1]
//! ...
//! [filter M-1]
//! [offset of filter 0: u32]
//! ...
//! [offset of filter M-1: u32]
//! [offset of the offset array: u32]
//! [base_lg: u8]
//! ```
//!
//! A data block spanning several 2KB windows leaves empty filters in the
//! skipped windows; empty filters match nothing.

use crate::coding::{get_fixed32, put_fixed32};
use crate::filter::FilterPolicy;
use crate::sstable::FILTER_BASE_LG;
use bytes::Bytes;
use std::sync::Arc;

const FILTER_BASE: u64 = 1 << FILTER_BASE_LG;

/// FilterBlockBuilder accumulates per-window filters while data blocks are
/// written.
///
/// Call sequence: repeated `(start_block, add_key*)` with non-decreasing
/// block offsets, then one `finish`.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    keys: Vec<u8>,      // Flattened key contents
    start: Vec<usize>,  // Start offset of each key within `keys`
    result: Vec<u8>,
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    /// Create a new FilterBlockBuilder for `policy`.
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self {
            policy,
            keys: Vec::new(),
            start: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Note that the next data block begins at `block_offset`.
    ///
    /// Emits one filter per 2KB window passed since the previous call, so
    /// pending keys always land in the filter their block's offset selects.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset / FILTER_BASE;
        assert!(filter_index >= self.filter_offsets.len() as u64);
        while filter_index > self.filter_offsets.len() as u64 {
            self.generate_filter();
        }
    }

    /// Record a key belonging to the current data block.
    pub fn add_key(&mut self, key: &[u8]) {
        self.start.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Emit any pending filter and return the finished block payload.
    pub fn finish(&mut self) -> &[u8] {
        if !self.start.is_empty() {
            self.generate_filter();
        }

        // Append the offset array, its position, and the window granularity.
        let array_offset = self.result.len() as u32;
        for i in 0..self.filter_offsets.len() {
            put_fixed32(&mut self.result, self.filter_offsets[i]);
        }
        put_fixed32(&mut self.result, array_offset);
        self.result.push(FILTER_BASE_LG);
        &self.result
    }

    fn generate_filter(&mut self) {
        let num_keys = self.start.len();
        if num_keys == 0 {
            // Empty window: a zero-length filter whose offset equals the
            // next filter's. Readers treat it as matching nothing.
            self.filter_offsets.push(self.result.len() as u32);
            return;
        }

        // Rebuild key slices from the flattened representation.
        self.start.push(self.keys.len()); // Simplifies length computation
        let tmp_keys: Vec<&[u8]> =
            (0..num_keys).map(|i| &self.keys[self.start[i]..self.start[i + 1]]).collect();

        self.filter_offsets.push(self.result.len() as u32);
        self.policy.create_filter(&tmp_keys, &mut self.result);

        self.keys.clear();
        self.start.clear();
    }
}

/// FilterBlockReader answers membership probes against a filter block.
#[derive(Clone)]
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Bytes,
    offset_start: usize, // Beginning of the offset array
    num: usize,          // Number of filters
    base_lg: u8,
}

impl FilterBlockReader {
    /// Wrap the raw contents of a filter block.
    ///
    /// Malformed contents yield a reader with zero filters, which treats
    /// every probe as a potential match.
    pub fn new(policy: Arc<dyn FilterPolicy>, contents: Bytes) -> Self {
        let mut reader =
            Self { policy, data: Bytes::new(), offset_start: 0, num: 0, base_lg: 0 };

        let n = contents.len();
        if n < 5 {
            // 1 byte for base_lg and 4 for the offset-array position.
            return reader;
        }
        reader.base_lg = contents[n - 1];
        let offset_start = get_fixed32(&contents[n - 5..]) as usize;
        if offset_start > n - 5 {
            return reader;
        }
        reader.num = (n - 5 - offset_start) / 4;
        reader.offset_start = offset_start;
        reader.data = contents;
        reader
    }

    /// Whether `key` may be present in the data block at `block_offset`.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index < self.num {
            let start = get_fixed32(&self.data[self.offset_start + index * 4..]) as usize;
            let limit = get_fixed32(&self.data[self.offset_start + index * 4 + 4..]) as usize;
            if start <= limit && limit <= self.offset_start {
                return self.policy.key_may_match(key, &self.data[start..limit]);
            } else if start == limit {
                // Empty filters do not match any keys.
                return false;
            }
        }
        true // Errors are treated as potential matches
    }
}
