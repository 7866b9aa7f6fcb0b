//! SSTable builder implementation.
//!
//! Builds a table file from a stream of strictly-ascending key-value pairs,
//! writing data blocks as they fill up and finishing with the filter block,
//! meta-index block, index block, and footer.

use crate::comparator::Comparator;
use crate::config::{CompressionType, Options};
use crate::error::{Error, Result};
use crate::file::WritableFile;
use crate::filter::FilterPolicy;
use crate::sstable::block::BlockBuilder;
use crate::sstable::filter_block::FilterBlockBuilder;
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::BLOCK_TRAILER_SIZE;
use crate::{coding, crc};
use std::cmp::Ordering;

/// SSTableBuilder assembles an SSTable onto an append-only sink.
///
/// Usage:
/// ```no_run
/// use lsmtable::sstable::SSTableBuilder;
/// use lsmtable::{FileSink, Options};
///
/// let sink = FileSink::create("table.sst").unwrap();
/// let mut builder = SSTableBuilder::new(Options::default(), sink);
/// builder.add(b"key1", b"value1").unwrap();
/// builder.add(b"key2", b"value2").unwrap();
/// builder.finish().unwrap();
/// ```
///
/// The first sink failure latches: later operations become no-ops returning
/// the same error, and `finish` reports it. Contract violations (keys out
/// of order, use after close) panic.
pub struct SSTableBuilder<W: WritableFile> {
    options: Options,
    file: W,
    offset: u64,
    status: Result<()>,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    last_key: Vec<u8>,
    num_entries: u64,
    closed: bool, // Either finish() or abandon() has been called
    filter_block: Option<FilterBlockBuilder>,

    // An index entry for a finished data block is not emitted until the
    // first key of the next block arrives: the gap lets the index store a
    // short separator between the two blocks instead of the block's full
    // last key. For a block boundary between "the quick brown fox" and
    // "the who", the index key can be just "the r".
    //
    // Invariant: pending_index_entry is true only if data_block is empty.
    pending_index_entry: bool,
    pending_handle: BlockHandle, // Handle to add to the index block

    compressed_output: Vec<u8>,
}

impl<W: WritableFile> SSTableBuilder<W> {
    /// Create a builder writing a table to `file`.
    ///
    /// The builder owns the sink exclusively until it is dropped.
    pub fn new(options: Options, file: W) -> Self {
        let mut filter_block =
            options.filter_policy.clone().map(FilterBlockBuilder::new);
        if let Some(fb) = &mut filter_block {
            fb.start_block(0);
        }

        Self {
            data_block: BlockBuilder::new(options.block_restart_interval),
            // Every index entry is its own restart so lookups binary-search
            // the whole index.
            index_block: BlockBuilder::new(1),
            options,
            file,
            offset: 0,
            status: Ok(()),
            last_key: Vec::new(),
            num_entries: 0,
            closed: false,
            filter_block,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            compressed_output: Vec::new(),
        }
    }

    /// Replace the builder's options mid-build.
    ///
    /// Fails if the comparator changes; most other fields hot-swap. A live
    /// data block picks up a new restart interval at its next restart.
    pub fn change_options(&mut self, options: Options) -> Result<()> {
        if options.comparator.name() != self.options.comparator.name() {
            return Err(Error::invalid_argument("changing comparator while building table"));
        }
        self.data_block.set_restart_interval(options.block_restart_interval);
        self.options = options;
        Ok(())
    }

    /// Add a key-value pair.
    ///
    /// `key` must compare greater than every previously added key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        assert!(!self.closed, "add after finish/abandon");
        if self.status.is_err() {
            return self.status.clone();
        }
        if self.num_entries > 0 {
            assert_eq!(
                self.options.comparator.compare(key, &self.last_key),
                Ordering::Greater,
                "keys must be added in strictly ascending order"
            );
        }

        if self.pending_index_entry {
            assert!(self.data_block.is_empty());
            // last_key still holds the previous block's last key; shorten it
            // to a separator below the new block's first key.
            self.options.comparator.find_shortest_separator(&mut self.last_key, key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&self.last_key, &handle_encoding);
            self.pending_index_entry = false;
        }

        if let Some(fb) = &mut self.filter_block {
            fb.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the current data block to the sink, if non-empty.
    pub fn flush(&mut self) -> Result<()> {
        assert!(!self.closed, "flush after finish/abandon");
        if self.status.is_err() {
            return self.status.clone();
        }
        if self.data_block.is_empty() {
            return Ok(());
        }
        assert!(!self.pending_index_entry, "data block written without an index entry");

        let result = Self::write_block(
            &mut self.file,
            &mut self.offset,
            self.options.compression,
            &mut self.data_block,
            &mut self.compressed_output,
        );
        self.data_block.reset();

        match result {
            Ok(handle) => {
                self.pending_handle = handle;
                self.pending_index_entry = true;
                if let Err(e) = self.file.flush() {
                    self.status = Err(e);
                }
            }
            Err(e) => self.status = Err(e),
        }

        // Re-align the filter builder on the offset the next block starts at.
        if let Some(fb) = &mut self.filter_block {
            fb.start_block(self.offset);
        }
        self.status.clone()
    }

    /// Finish the table: flush the last data block, then write the filter
    /// block, meta-index block, index block and footer.
    ///
    /// Returns the first error encountered during the build, if any. The
    /// builder is closed afterwards regardless.
    pub fn finish(&mut self) -> Result<()> {
        let _ = self.flush();
        assert!(!self.closed, "finish after finish/abandon");
        self.closed = true;

        // Write filter block.
        let mut filter_block_handle = BlockHandle::default();
        let mut wrote_filter = false;
        if self.status.is_ok() {
            if let Some(fb) = &mut self.filter_block {
                match Self::write_raw_block(
                    &mut self.file,
                    &mut self.offset,
                    fb.finish(),
                    CompressionType::None,
                ) {
                    Ok(handle) => {
                        filter_block_handle = handle;
                        wrote_filter = true;
                    }
                    Err(e) => self.status = Err(e),
                }
            }
        }

        // Write meta-index block: maps "filter.<policy name>" to the filter
        // block's handle.
        let mut meta_index_handle = BlockHandle::default();
        if self.status.is_ok() {
            let mut meta_index_block = BlockBuilder::new(self.options.block_restart_interval);
            if wrote_filter {
                let policy = self.options.filter_policy.as_ref().unwrap();
                let mut key = b"filter.".to_vec();
                key.extend_from_slice(policy.name().as_bytes());
                let mut handle_encoding = Vec::new();
                filter_block_handle.encode_to(&mut handle_encoding);
                meta_index_block.add(&key, &handle_encoding);
            }
            match Self::write_block(
                &mut self.file,
                &mut self.offset,
                self.options.compression,
                &mut meta_index_block,
                &mut self.compressed_output,
            ) {
                Ok(handle) => meta_index_handle = handle,
                Err(e) => self.status = Err(e),
            }
        }

        // Write index block. The last data block has no successor key, so
        // its index entry uses a short successor of its last key.
        let mut index_handle = BlockHandle::default();
        if self.status.is_ok() {
            if self.pending_index_entry {
                self.options.comparator.find_short_successor(&mut self.last_key);
                let mut handle_encoding = Vec::new();
                self.pending_handle.encode_to(&mut handle_encoding);
                self.index_block.add(&self.last_key, &handle_encoding);
                self.pending_index_entry = false;
            }
            match Self::write_block(
                &mut self.file,
                &mut self.offset,
                self.options.compression,
                &mut self.index_block,
                &mut self.compressed_output,
            ) {
                Ok(handle) => index_handle = handle,
                Err(e) => self.status = Err(e),
            }
        }

        // Write footer.
        if self.status.is_ok() {
            let footer = Footer::new(meta_index_handle, index_handle);
            let mut footer_encoding = Vec::new();
            footer.encode_to(&mut footer_encoding);
            match self.file.append(&footer_encoding) {
                Ok(()) => self.offset += footer_encoding.len() as u64,
                Err(e) => self.status = Err(e),
            }
        }

        self.status.clone()
    }

    /// Stop building without writing further bytes.
    ///
    /// The sink keeps whatever was already appended; removing the partial
    /// file is the caller's job.
    pub fn abandon(&mut self) {
        assert!(!self.closed, "abandon after finish/abandon");
        self.closed = true;
    }

    /// First error encountered, if any.
    pub fn status(&self) -> Result<()> {
        self.status.clone()
    }

    /// Number of entries added so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written to the sink so far; after a successful `finish`, the
    /// size of the table file.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// Consume the builder and hand back the sink, so the caller can sync
    /// and close it. Requires `finish` or `abandon` to have been called.
    pub fn into_file(self) -> W {
        assert!(self.closed, "into_file before finish/abandon");
        self.file
    }

    /// Finish a block, compress it if that pays, and write it with a trailer.
    fn write_block(
        file: &mut W,
        offset: &mut u64,
        compression: CompressionType,
        block: &mut BlockBuilder,
        compressed_output: &mut Vec<u8>,
    ) -> Result<BlockHandle> {
        let raw = block.finish();

        let (block_contents, block_type): (&[u8], CompressionType) = match compression {
            CompressionType::None => (raw, CompressionType::None),

            #[cfg(feature = "snappy")]
            CompressionType::Snappy => {
                match snap::raw::Encoder::new().compress_vec(raw) {
                    // Keep the compressed form only if it saves at least 12.5%.
                    Ok(compressed) if compressed.len() < raw.len() - raw.len() / 8 => {
                        *compressed_output = compressed;
                        (compressed_output.as_slice(), CompressionType::Snappy)
                    }
                    _ => (raw, CompressionType::None),
                }
            }

            // Snappy requested but not compiled in: store uncompressed.
            #[cfg(not(feature = "snappy"))]
            CompressionType::Snappy => (raw, CompressionType::None),
        };

        Self::write_raw_block(file, offset, block_contents, block_type)
    }

    /// Append `contents` plus its 5-byte trailer, advancing `offset`.
    fn write_raw_block(
        file: &mut W,
        offset: &mut u64,
        contents: &[u8],
        block_type: CompressionType,
    ) -> Result<BlockHandle> {
        let handle = BlockHandle::new(*offset, contents.len() as u64);
        file.append(contents)?;

        // Trailer: type byte, then the masked CRC32C of contents + type.
        let mut trailer = Vec::with_capacity(BLOCK_TRAILER_SIZE);
        trailer.push(block_type as u8);
        let checksum = crc::extend(crc::value(contents), &trailer[..1]);
        coding::put_fixed32(&mut trailer, crc::mask(checksum));
        file.append(&trailer)?;

        *offset += (contents.len() + BLOCK_TRAILER_SIZE) as u64;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::BloomFilterPolicy;
    use std::sync::Arc;

    fn plain_options() -> Options {
        Options::default().compression(CompressionType::None)
    }

    #[test]
    fn test_builder_empty_table() {
        let mut builder = SSTableBuilder::new(plain_options(), Vec::new());
        assert_eq!(builder.num_entries(), 0);
        builder.finish().unwrap();

        // Meta-index block (8 + 5) + index block (8 + 5) + footer.
        assert_eq!(builder.file_size(), 8 + 5 + 8 + 5 + 48);
    }

    #[test]
    fn test_builder_tracks_sink_length() {
        let mut builder = SSTableBuilder::new(plain_options(), Vec::new());
        for i in 0..100u32 {
            let key = format!("key{:08}", i);
            builder.add(key.as_bytes(), b"value").unwrap();
        }
        builder.finish().unwrap();
        // offset accounting must agree with the bytes actually appended.
        assert_eq!(builder.file_size(), builder.file.len() as u64);
    }

    #[test]
    #[should_panic(expected = "strictly ascending")]
    fn test_builder_rejects_unsorted_keys() {
        let mut builder = SSTableBuilder::new(plain_options(), Vec::new());
        builder.add(b"b", b"2").unwrap();
        builder.add(b"a", b"1").unwrap();
    }

    #[test]
    #[should_panic(expected = "strictly ascending")]
    fn test_builder_rejects_duplicate_keys() {
        let mut builder = SSTableBuilder::new(plain_options(), Vec::new());
        builder.add(b"a", b"1").unwrap();
        builder.add(b"a", b"2").unwrap();
    }

    #[test]
    #[should_panic(expected = "add after finish")]
    fn test_builder_rejects_add_after_finish() {
        let mut builder = SSTableBuilder::new(plain_options(), Vec::new());
        builder.add(b"a", b"1").unwrap();
        builder.finish().unwrap();
        let _ = builder.add(b"b", b"2");
    }

    #[test]
    fn test_abandon_writes_no_footer() {
        let mut builder = SSTableBuilder::new(plain_options(), Vec::new());
        builder.add(b"a", b"1").unwrap();
        builder.abandon();
        // Nothing was flushed, so nothing reached the sink.
        assert_eq!(builder.file_size(), 0);
        assert!(builder.file.is_empty());
    }

    #[test]
    fn test_change_options_rejects_comparator_swap() {
        struct ReverseComparator;
        impl Comparator for ReverseComparator {
            fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
                b.cmp(a)
            }
            fn name(&self) -> &'static str {
                "test.ReverseComparator"
            }
            fn find_shortest_separator(&self, _start: &mut Vec<u8>, _limit: &[u8]) {}
            fn find_short_successor(&self, _key: &mut Vec<u8>) {}
        }

        let mut builder = SSTableBuilder::new(plain_options(), Vec::new());
        builder.add(b"a", b"1").unwrap();

        let swapped = Options::default().comparator(Arc::new(ReverseComparator));
        assert!(builder.change_options(swapped).is_err());

        // Non-comparator fields hot-swap.
        let resized = plain_options().block_size(1 << 20).block_restart_interval(4);
        builder.change_options(resized).unwrap();
        builder.add(b"b", b"2").unwrap();
        builder.finish().unwrap();
    }

    #[test]
    fn test_filter_builder_follows_block_offsets() {
        let mut options = plain_options().block_size(64);
        options.filter_policy = Some(Arc::new(BloomFilterPolicy::new(10)));

        let mut builder = SSTableBuilder::new(options, Vec::new());
        for i in 0..100u32 {
            let key = format!("key{:08}", i);
            builder.add(key.as_bytes(), b"some value payload").unwrap();
        }
        builder.finish().unwrap();
        assert!(builder.num_entries() == 100);
        assert_eq!(builder.file_size(), builder.file.len() as u64);
    }

    /// A sink that starts failing after a given number of appends.
    struct FlakySink {
        written: Vec<u8>,
        appends_left: usize,
    }

    impl WritableFile for FlakySink {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            if self.appends_left == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.appends_left -= 1;
            self.written.extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_error_latches() {
        let sink = FlakySink { written: Vec::new(), appends_left: 1 };
        let mut builder =
            SSTableBuilder::new(plain_options().block_size(32), sink);

        // Fill enough entries to force a block flush; the trailer append
        // fails and the error latches.
        let mut saw_error = false;
        for i in 0..100u32 {
            let key = format!("key{:08}", i);
            if builder.add(key.as_bytes(), b"value").is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
        assert!(builder.status().is_err());
        // The block payload made it out before the trailer append failed.
        assert!(!builder.file.written.is_empty());

        // finish() is safe to call and reports the latched error.
        let err = builder.finish().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
