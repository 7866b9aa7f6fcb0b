//! Block format implementation for SSTable.
//!
//! A block holds key-value entries with prefix compression, bounded by
//! restart points that allow seeking without decoding the whole block.
//!
//! Format:
//! ```text
//! [Entry 1]
//! [Entry 2]
//! ...
//! [Entry N]
//! [Restart Point 1: u32]
//! ...
//! [Restart Point R: u32]
//! [Num Restarts: u32]
//! ```
//!
//! Each entry format:
//! ```text
//! [shared_key_len: varint32]   // Length of prefix shared with previous key
//! [unshared_key_len: varint32] // Length of the key suffix
//! [value_len: varint32]        // Length of the value
//! [unshared_key: bytes]        // Key suffix
//! [value: bytes]               // Value data
//! ```
//!
//! The first entry after a restart point stores its full key (shared = 0),
//! so a reader can reconstruct keys starting from any restart.

use crate::coding::{get_fixed32, get_varint32, put_varint32};
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;
use std::sync::Arc;

/// BlockBuilder builds a block with prefix compression.
///
/// Requires keys to be added in strictly ascending order; the caller
/// asserts ordering under its comparator before calling [`add`](Self::add).
/// Identical input always yields identical bytes.
pub struct BlockBuilder {
    buffer: BytesMut,
    restarts: Vec<u32>,
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
    restart_interval: usize,
}

impl BlockBuilder {
    /// Create a new BlockBuilder emitting a restart point every
    /// `restart_interval` entries.
    pub fn new(restart_interval: usize) -> Self {
        assert!(restart_interval >= 1);
        Self {
            buffer: BytesMut::new(),
            restarts: vec![0], // First restart point at offset 0
            counter: 0,
            finished: false,
            last_key: Vec::new(),
            restart_interval,
        }
    }

    /// Discard all contents as if the builder were just constructed.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    /// Change the restart cadence. Takes effect at the next restart point.
    pub fn set_restart_interval(&mut self, restart_interval: usize) {
        assert!(restart_interval >= 1);
        self.restart_interval = restart_interval;
    }

    /// Add a key-value pair to the block.
    ///
    /// `key` must be greater than any previously added key, and
    /// [`finish`](Self::finish) must not have been called since the last
    /// [`reset`](Self::reset).
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.finished, "add after finish");

        let mut shared = 0;
        if self.counter < self.restart_interval {
            // Share a prefix with the previous key.
            let min_length = self.last_key.len().min(key.len());
            while shared < min_length && self.last_key[shared] == key[shared] {
                shared += 1;
            }
        } else {
            // Restart compression: the full key is stored.
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        }
        let non_shared = key.len() - shared;

        // Entry header followed by key suffix and value.
        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);
        self.counter += 1;
    }

    /// Finish building and return the block payload.
    ///
    /// The returned slice is valid until the next `reset`.
    pub fn finish(&mut self) -> &[u8] {
        for i in 0..self.restarts.len() {
            self.buffer.put_u32_le(self.restarts[i]);
        }
        self.buffer.put_u32_le(self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// Estimated size of the block being built, were it finished now.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len()             // Entry bytes
            + self.restarts.len() * 4 // Restart array
            + 4                       // Restart count
    }

    /// True iff no entries have been added since the last reset.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// An immutable, decoded view over a block payload.
#[derive(Debug, Clone)]
pub struct Block {
    data: Bytes,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Create a Block from raw payload bytes.
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("Block too small"));
        }

        let num_restarts = get_fixed32(&data[data.len() - 4..]);

        // Every block carries at least one restart, and the restart array
        // plus count must fit within the payload.
        if num_restarts == 0 || num_restarts as usize * 4 + 4 > data.len() {
            return Err(Error::corruption("Invalid restart count"));
        }
        let restart_offset = data.len() - 4 - num_restarts as usize * 4;

        Ok(Self { data, restart_offset, num_restarts })
    }

    /// Number of restart points.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Create an iterator over the block, ordered by `comparator`.
    pub fn iter(&self, comparator: Arc<dyn Comparator>) -> BlockIterator {
        BlockIterator::new(self.clone(), comparator)
    }

    /// The raw payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn restart_point(&self, index: u32) -> u32 {
        debug_assert!(index < self.num_restarts);
        get_fixed32(&self.data[self.restart_offset + index as usize * 4..])
    }
}

/// Iterator over entries in a block.
///
/// Freshly created iterators are positioned before the first entry; call
/// [`advance`](Self::advance) or [`seek`](Self::seek) to make them valid.
pub struct BlockIterator {
    block: Block,
    comparator: Arc<dyn Comparator>,
    current: usize,
    key: Vec<u8>,
    value: Vec<u8>,
    valid: bool,
}

impl BlockIterator {
    fn new(block: Block, comparator: Arc<dyn Comparator>) -> Self {
        Self {
            block,
            comparator,
            current: 0,
            key: Vec::new(),
            value: Vec::new(),
            valid: false,
        }
    }

    /// Position before the first entry.
    pub fn seek_to_first(&mut self) {
        self.seek_to_restart_point(0);
    }

    /// Position at the first entry with key >= `target`.
    ///
    /// Binary-searches the restart array, then scans at most one restart
    /// interval. Invalid if every key is < `target`.
    pub fn seek(&mut self, target: &[u8]) {
        // Find the last restart point with a key < target.
        let mut left = 0;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            match self.restart_key(mid) {
                Some(key) if self.comparator.compare(key, target) == Ordering::Less => left = mid,
                _ => right = mid - 1,
            }
        }

        self.seek_to_restart_point(left);
        while self.advance() {
            if self.comparator.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    /// Move to the next entry. Returns whether the iterator is valid.
    pub fn advance(&mut self) -> bool {
        if self.current >= self.block.restart_offset {
            self.valid = false;
            return false;
        }
        self.parse_next_entry();
        self.valid
    }

    /// Whether the iterator is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Key of the current entry.
    pub fn key(&self) -> &[u8] {
        assert!(self.valid, "Iterator not valid");
        &self.key
    }

    /// Value of the current entry.
    pub fn value(&self) -> &[u8] {
        assert!(self.valid, "Iterator not valid");
        &self.value
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.value.clear();
        self.current = self.block.restart_point(index) as usize;
        self.valid = false;
    }

    /// Decode the full key stored at restart point `index`.
    fn restart_key(&self, index: u32) -> Option<&[u8]> {
        let entries = &self.block.data[..self.block.restart_offset];
        let mut p = self.block.restart_point(index) as usize;

        let (shared, n) = get_varint32(entries.get(p..)?)?;
        p += n;
        let (non_shared, n) = get_varint32(entries.get(p..)?)?;
        p += n;
        let (_value_len, n) = get_varint32(entries.get(p..)?)?;
        p += n;

        if shared != 0 {
            // Restart entries must carry their full key.
            return None;
        }
        entries.get(p..p + non_shared as usize)
    }

    fn parse_next_entry(&mut self) {
        let entries = &self.block.data[..self.block.restart_offset];
        let mut p = self.current;

        let header = (|| {
            let (shared, n) = get_varint32(entries.get(p..)?)?;
            p += n;
            let (non_shared, n) = get_varint32(entries.get(p..)?)?;
            p += n;
            let (value_len, n) = get_varint32(entries.get(p..)?)?;
            p += n;
            Some((shared as usize, non_shared as usize, value_len as usize))
        })();

        let (shared, non_shared, value_len) = match header {
            Some(h) => h,
            None => return self.corrupt(),
        };

        if shared > self.key.len() || p + non_shared + value_len > entries.len() {
            return self.corrupt();
        }

        // Reconstruct key from the shared prefix and the stored suffix.
        self.key.truncate(shared);
        self.key.extend_from_slice(&entries[p..p + non_shared]);

        self.value.clear();
        self.value.extend_from_slice(&entries[p + non_shared..p + non_shared + value_len]);

        self.current = p + non_shared + value_len;
        self.valid = true;
    }

    fn corrupt(&mut self) {
        self.valid = false;
        self.current = self.block.restart_offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;

    fn bytewise() -> Arc<dyn Comparator> {
        Arc::new(BytewiseComparator)
    }

    fn build_block(interval: usize, entries: &[(&[u8], &[u8])]) -> Block {
        let mut builder = BlockBuilder::new(interval);
        for (key, value) in entries {
            builder.add(key, value);
        }
        Block::new(Bytes::copy_from_slice(builder.finish())).unwrap()
    }

    fn collect(block: &Block) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut iter = block.iter(bytewise());
        iter.seek_to_first();
        let mut out = Vec::new();
        while iter.advance() {
            out.push((iter.key().to_vec(), iter.value().to_vec()));
        }
        out
    }

    #[test]
    fn test_block_builder_empty() {
        let mut builder = BlockBuilder::new(16);
        assert!(builder.is_empty());
        assert_eq!(builder.current_size_estimate(), 8);

        // Even an empty block carries one restart at offset 0.
        let payload = builder.finish();
        assert_eq!(payload, [0, 0, 0, 0, 1, 0, 0, 0]);

        let block = Block::new(Bytes::copy_from_slice(payload)).unwrap();
        assert_eq!(block.num_restarts(), 1);
        assert!(collect(&block).is_empty());
    }

    #[test]
    fn test_block_builder_single_entry() {
        let block = build_block(16, &[(b"key1", b"value1")]);
        assert_eq!(block.num_restarts(), 1);
        assert_eq!(collect(&block), vec![(b"key1".to_vec(), b"value1".to_vec())]);
    }

    #[test]
    fn test_restart_interval_layout() {
        // With interval 3, entry 3 starts a new restart and stores its full
        // key; entries 1 and 2 share the one-byte prefix of "aa".
        let mut builder = BlockBuilder::new(3);
        builder.add(b"aa", b"1");
        builder.add(b"ab", b"2");
        builder.add(b"ac", b"3");
        builder.add(b"ad", b"4");

        #[rustfmt::skip]
        let expected = [
            0, 2, 1, b'a', b'a', b'1', // shared=0
            1, 1, 1, b'b', b'2',       // shared=1
            1, 1, 1, b'c', b'3',       // shared=1
            0, 2, 1, b'a', b'd', b'4', // shared=0, restart
            0, 0, 0, 0,                // restart[0] = 0
            16, 0, 0, 0,               // restart[1] = 16
            2, 0, 0, 0,                // num restarts
        ];
        assert_eq!(builder.finish(), expected);
    }

    #[test]
    fn test_no_sharing_with_interval_one() {
        // Index blocks use interval 1: every entry is a restart.
        let mut builder = BlockBuilder::new(1);
        builder.add(b"apple_a", b"1");
        builder.add(b"apple_b", b"2");

        let block = Block::new(Bytes::copy_from_slice(builder.finish())).unwrap();
        assert_eq!(block.num_restarts(), 2);
        // Full keys stored: the payload contains both complete keys.
        assert_eq!(collect(&block).len(), 2);
    }

    #[test]
    fn test_prefix_compression_shrinks_block() {
        let mut with_sharing = BlockBuilder::new(16);
        let mut without_sharing = BlockBuilder::new(1);
        for i in 0..10u8 {
            let key = [b'c', b'o', b'm', b'm', b'o', b'n', b'_', i + b'0'];
            with_sharing.add(&key, b"v");
            without_sharing.add(&key, b"v");
        }
        assert!(with_sharing.current_size_estimate() < without_sharing.current_size_estimate());
    }

    #[test]
    fn test_block_iterator() {
        let block = build_block(
            16,
            &[(b"apple", b"red"), (b"banana", b"yellow"), (b"cherry", b"red")],
        );

        assert_eq!(
            collect(&block),
            vec![
                (b"apple".to_vec(), b"red".to_vec()),
                (b"banana".to_vec(), b"yellow".to_vec()),
                (b"cherry".to_vec(), b"red".to_vec()),
            ]
        );
    }

    #[test]
    fn test_iterator_seek() {
        // Small interval so seek crosses restart boundaries.
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..50u32)
            .map(|i| (format!("key{:04}", i * 2).into_bytes(), format!("v{}", i).into_bytes()))
            .collect();
        let borrowed: Vec<(&[u8], &[u8])> =
            entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())).collect();
        let block = build_block(4, &borrowed);

        let mut iter = block.iter(bytewise());

        // Exact match.
        iter.seek(b"key0024");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key0024");

        // Between keys: lands on the next greater key.
        iter.seek(b"key0025");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key0026");

        // Before the first key.
        iter.seek(b"aaa");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key0000");

        // Past the last key.
        iter.seek(b"zzz");
        assert!(!iter.valid());
    }

    #[test]
    fn test_long_shared_prefix() {
        // Keys sharing a 4KB prefix still restart every `interval` entries.
        let prefix = vec![b'p'; 4096];
        let mut builder = BlockBuilder::new(4);
        let mut keys = Vec::new();
        for i in 0..16u8 {
            let mut key = prefix.clone();
            key.push(i + b'0');
            builder.add(&key, b"v");
            keys.push(key);
        }
        let block = Block::new(Bytes::copy_from_slice(builder.finish())).unwrap();
        assert_eq!(block.num_restarts(), 4);

        let mut iter = block.iter(bytewise());
        iter.seek(&keys[9]);
        assert!(iter.valid());
        assert_eq!(iter.key(), keys[9].as_slice());
    }

    #[test]
    fn test_size_estimate_grows_with_entries() {
        let mut builder = BlockBuilder::new(4);
        let mut last = builder.current_size_estimate();
        for i in 0..20u32 {
            builder.add(format!("key{:04}", i).as_bytes(), b"value");
            let estimate = builder.current_size_estimate();
            assert!(estimate > last);
            last = estimate;
        }
        assert_eq!(builder.finish().len(), last);
    }

    #[test]
    fn test_builder_reset() {
        let mut builder = BlockBuilder::new(16);
        builder.add(b"key1", b"value1");
        builder.finish();

        builder.reset();
        assert!(builder.is_empty());
        builder.add(b"other", b"value");
        let block = Block::new(Bytes::copy_from_slice(builder.finish())).unwrap();
        assert_eq!(collect(&block), vec![(b"other".to_vec(), b"value".to_vec())]);
    }

    #[test]
    #[should_panic(expected = "add after finish")]
    fn test_add_after_finish_panics() {
        let mut builder = BlockBuilder::new(16);
        builder.add(b"key1", b"value1");
        builder.finish();
        builder.add(b"key2", b"value2");
    }

    #[test]
    fn test_block_too_small() {
        assert!(Block::new(Bytes::from_static(&[0, 0])).is_err());
    }

    #[test]
    fn test_block_bad_restart_count() {
        // Claims 100 restarts in an 8-byte payload.
        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(&100u32.to_le_bytes());
        assert!(Block::new(Bytes::from(payload)).is_err());
    }

    #[test]
    fn test_truncated_entry_invalidates_iterator() {
        let mut builder = BlockBuilder::new(16);
        builder.add(b"key1", b"value1");
        let payload = builder.finish().to_vec();

        // Drop a byte from the entry region, keeping the trailer intact.
        let mut corrupted = payload.clone();
        corrupted.remove(4);
        if let Ok(block) = Block::new(Bytes::from(corrupted)) {
            let mut iter = block.iter(Arc::new(BytewiseComparator));
            iter.seek_to_first();
            while iter.advance() {}
            assert!(!iter.valid());
        }
    }
}
