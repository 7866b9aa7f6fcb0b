//! SSTable reader implementation.
//!
//! Opens a finished table file and serves point lookups and ordered scans,
//! verifying block trailers and probing the filter block before touching
//! data blocks.

use crate::comparator::{BytewiseComparator, Comparator};
use crate::config::{CompressionType, Options};
use crate::error::{Error, Result};
use crate::sstable::block::{Block, BlockIterator};
use crate::sstable::filter_block::FilterBlockReader;
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::{BLOCK_TRAILER_SIZE, FOOTER_SIZE};
use crate::{coding, crc};
use bytes::Bytes;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// SSTableReader provides read access to a finished table file.
///
/// Usage:
/// ```no_run
/// use lsmtable::sstable::SSTableReader;
/// use lsmtable::Options;
///
/// let reader = SSTableReader::open(Options::default(), "table.sst").unwrap();
/// if let Some(value) = reader.get(b"key1").unwrap() {
///     println!("Found: {:?}", value);
/// }
/// ```
///
/// Open with the same comparator and filter policy the table was built
/// with; a filter under a different policy name is ignored.
pub struct SSTableReader {
    file: Arc<File>,
    options: Options,
    index_block: Block,
    filter: Option<FilterBlockReader>,
    file_size: u64,
}

impl SSTableReader {
    /// Open the table file at `path`.
    pub fn open<P: AsRef<Path>>(options: Options, path: P) -> Result<Self> {
        let mut file = File::open(path)?;

        let file_size = file.metadata()?.len();
        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("File too small to be a valid table"));
        }

        // Footer first: it locates everything else.
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer_buf = [0u8; FOOTER_SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode_from(&footer_buf)?;

        let index_contents = Self::read_block(&mut file, &footer.index_handle())?;
        let index_block = Block::new(index_contents)?;

        // Look up the filter block through the meta-index, if a policy is
        // configured and the table carries a matching filter.
        let mut filter = None;
        if let Some(policy) = options.filter_policy.clone() {
            let meta_contents = Self::read_block(&mut file, &footer.meta_index_handle())?;
            let meta_block = Block::new(meta_contents)?;

            let mut key = b"filter.".to_vec();
            key.extend_from_slice(policy.name().as_bytes());

            // Meta-index keys are ordered byte-wise regardless of the
            // table's comparator.
            let mut iter = meta_block.iter(Arc::new(BytewiseComparator));
            iter.seek(&key);
            if iter.valid() && iter.key() == key.as_slice() {
                let (handle, _) = BlockHandle::decode_from(iter.value())?;
                let contents = Self::read_block(&mut file, &handle)?;
                filter = Some(FilterBlockReader::new(policy, contents));
            }
        }

        Ok(Self { file: Arc::new(file), options, index_block, filter, file_size })
    }

    /// Get the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut index_iter = self.index_block.iter(self.options.comparator.clone());
        index_iter.seek(key);
        if !index_iter.valid() {
            // Past the last block's separator: not in this table.
            return Ok(None);
        }
        let (handle, _) = BlockHandle::decode_from(index_iter.value())?;

        // The filter is indexed by the data block's file offset.
        if let Some(filter) = &self.filter {
            if !filter.key_may_match(handle.offset(), key) {
                return Ok(None);
            }
        }

        let contents = Self::read_block_at(&self.file, &handle)?;
        let block = Block::new(contents)?;
        let mut iter = block.iter(self.options.comparator.clone());
        iter.seek(key);
        if iter.valid() && self.options.comparator.compare(iter.key(), key) == Ordering::Equal {
            Ok(Some(iter.value().to_vec()))
        } else {
            Ok(None)
        }
    }

    /// Whether the table carries a usable filter block.
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Number of data blocks in the table.
    pub fn num_blocks(&self) -> usize {
        let mut iter = self.index_block.iter(self.options.comparator.clone());
        iter.seek_to_first();
        let mut count = 0;
        while iter.advance() {
            count += 1;
        }
        count
    }

    /// Size of the table file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Create an iterator over all key-value pairs, in key order.
    pub fn iter(&self) -> Result<SSTableIterator> {
        SSTableIterator::new(self)
    }

    /// Read a block payload, verify its trailer, and decompress it.
    fn read_block(file: &mut File, handle: &BlockHandle) -> Result<Bytes> {
        file.seek(SeekFrom::Start(handle.offset()))?;

        let total_size = handle.size() as usize + BLOCK_TRAILER_SIZE;
        let mut buffer = vec![0u8; total_size];
        file.read_exact(&mut buffer)?;

        // Layout: [payload][compression_type: 1 byte][masked crc: 4 bytes]
        let payload_size = handle.size() as usize;
        let block_type = buffer[payload_size];
        let stored_checksum = coding::get_fixed32(&buffer[payload_size + 1..]);

        // The trailer checksum covers the payload plus the type byte.
        let actual = crc::mask(crc::extend(
            crc::value(&buffer[..payload_size]),
            &buffer[payload_size..payload_size + 1],
        ));
        if actual != stored_checksum {
            log::warn!(
                "block checksum mismatch at offset {}: stored {:#x}, computed {:#x}",
                handle.offset(),
                stored_checksum,
                actual
            );
            return Err(Error::ChecksumMismatch { expected: stored_checksum, actual });
        }

        let compression = CompressionType::from_u8(block_type)
            .ok_or_else(|| Error::corruption(format!("Unknown block type: {}", block_type)))?;

        buffer.truncate(payload_size);
        match compression {
            CompressionType::None => Ok(Bytes::from(buffer)),

            #[cfg(feature = "snappy")]
            CompressionType::Snappy => {
                let decompressed = snap::raw::Decoder::new()
                    .decompress_vec(&buffer)
                    .map_err(|e| Error::corruption(format!("Snappy decompression: {}", e)))?;
                Ok(Bytes::from(decompressed))
            }

            #[cfg(not(feature = "snappy"))]
            CompressionType::Snappy => {
                Err(Error::corruption("Snappy block but snappy support not compiled in"))
            }
        }
    }

    fn read_block_at(file: &Arc<File>, handle: &BlockHandle) -> Result<Bytes> {
        // Clone the descriptor so concurrent readers don't fight over the
        // shared seek position.
        let mut file = file.try_clone().map_err(Error::Io)?;
        Self::read_block(&mut file, handle)
    }
}

/// Iterator over all entries of a table, block by block.
pub struct SSTableIterator {
    file: Arc<File>,
    options: Options,
    block_handles: Vec<BlockHandle>,
    next_block: usize,
    current: Option<BlockIterator>,
}

impl SSTableIterator {
    fn new(reader: &SSTableReader) -> Result<Self> {
        // Collect data block handles from the index up front.
        let mut handles = Vec::new();
        let mut index_iter = reader.index_block.iter(reader.options.comparator.clone());
        index_iter.seek_to_first();
        while index_iter.advance() {
            let (handle, _) = BlockHandle::decode_from(index_iter.value())?;
            handles.push(handle);
        }

        Ok(Self {
            file: Arc::clone(&reader.file),
            options: reader.options.clone(),
            block_handles: handles,
            next_block: 0,
            current: None,
        })
    }

    /// Move to the next entry. Returns whether the iterator is valid.
    pub fn advance(&mut self) -> Result<bool> {
        loop {
            if let Some(iter) = &mut self.current {
                if iter.advance() {
                    return Ok(true);
                }
            }

            // Current block exhausted; load the next one.
            if self.next_block >= self.block_handles.len() {
                self.current = None;
                return Ok(false);
            }
            let handle = self.block_handles[self.next_block];
            self.next_block += 1;

            let contents = SSTableReader::read_block_at(&self.file, &handle)?;
            let block = Block::new(contents)?;
            let mut iter = block.iter(self.options.comparator.clone());
            iter.seek_to_first();
            self.current = Some(iter);
        }
    }

    /// Whether the iterator is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.current.as_ref().map(|i| i.valid()).unwrap_or(false)
    }

    /// Key of the current entry.
    pub fn key(&self) -> &[u8] {
        self.current.as_ref().expect("Iterator not valid").key()
    }

    /// Value of the current entry.
    pub fn value(&self) -> &[u8] {
        self.current.as_ref().expect("Iterator not valid").value()
    }
}
