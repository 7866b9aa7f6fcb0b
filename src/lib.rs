//! # lsmtable - Immutable Sorted Table Writer
//!
//! The SSTable layer of an LSM-tree storage engine: a byte-exact writer
//! that serializes a strictly-ascending stream of key-value pairs into a
//! single self-describing, random-access file, plus the decoders a reader
//! needs to get them back out.
//!
//! ## Architecture
//!
//! The writer is built from a few cooperating pieces:
//!
//! - **BlockBuilder**: prefix-compresses keys within a block, with restart
//!   points for O(1) intra-block seeks
//! - **FilterBlockBuilder**: bloom filters indexed by data-block file offset
//! - **SSTableBuilder**: interleaves data blocks, the filter block, a
//!   meta-index, an index block and a fixed 48-byte footer
//! - **SSTableReader**: verifies trailers and serves lookups and scans
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use lsmtable::sstable::{SSTableBuilder, SSTableReader};
//! use lsmtable::{FileSink, Options};
//!
//! # fn main() -> Result<(), lsmtable::Error> {
//! // Write a table.
//! let sink = FileSink::create("example.sst")?;
//! let mut builder = SSTableBuilder::new(Options::default(), sink);
//! builder.add(b"key1", b"value1")?;
//! builder.add(b"key2", b"value2")?;
//! builder.finish()?;
//!
//! // Read it back.
//! let reader = SSTableReader::open(Options::default(), "example.sst")?;
//! if let Some(value) = reader.get(b"key1")? {
//!     println!("Found: {:?}", value);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod coding;
pub mod comparator;
pub mod config;
pub mod crc;
pub mod error;
pub mod file;
pub mod filter;
pub mod sstable;

// Re-exports
pub use comparator::{BytewiseComparator, Comparator};
pub use config::{CompressionType, Options};
pub use error::{Error, Result};
pub use file::{FileSink, WritableFile};
pub use filter::{BloomFilterPolicy, FilterPolicy};
pub use sstable::{SSTableBuilder, SSTableReader};
