//! SSTable (Sorted String Table) implementation.
//!
//! An SSTable is an immutable, sorted file of key-value pairs designed for
//! one sequential write pass and efficient random reads.
//!
//! ## File Format
//!
//! ```text
//! [Data Block 1 | trailer]
//! [Data Block 2 | trailer]
//! ...
//! [Data Block N | trailer]
//! [Filter Block | trailer]     // optional, only with a filter policy
//! [Meta Index Block | trailer] // maps "filter.<name>" to the filter block
//! [Index Block | trailer]      // maps separator keys to data blocks
//! [Footer: 48B]                // points to meta index + index blocks
//! ```
//!
//! Every block carries a 5-byte trailer: a compression-type byte followed
//! by a masked CRC32C of the payload plus that byte. Block handles address
//! payload bytes only, excluding the trailer.
//!
//! ## Block Format
//!
//! Data, meta-index and index blocks share the restart-prefix encoding
//! implemented in [`block`]. The filter block has its own layout, described
//! in [`filter_block`].

pub mod block;
pub mod builder;
pub mod filter_block;
pub mod footer;
pub mod reader;

pub use block::{Block, BlockBuilder, BlockIterator};
pub use builder::SSTableBuilder;
pub use filter_block::{FilterBlockBuilder, FilterBlockReader};
pub use footer::{BlockHandle, Footer};
pub use reader::SSTableReader;

/// Size of the per-block trailer: 1 type byte + 4 checksum bytes.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Footer size in bytes (fixed).
pub const FOOTER_SIZE: usize = 48;

/// Magic number closing every table file.
pub const TABLE_MAGIC_NUMBER: u64 = 0xdb4775248b80fb57;

/// Log2 of the byte span covered by one filter segment (2KB windows).
pub const FILTER_BASE_LG: u8 = 11;
