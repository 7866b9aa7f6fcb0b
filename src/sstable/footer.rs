//! Block handles and the table footer.
//!
//! The footer is a fixed-size (48 bytes) structure at the end of a table
//! file holding the handles of the meta-index block and the index block,
//! each zero-padded to its maximum varint width, followed by an 8-byte
//! magic number.

use crate::coding::{get_fixed64, get_varint64, put_fixed64, put_varint64};
use crate::error::{Error, Result};
use crate::sstable::{FOOTER_SIZE, TABLE_MAGIC_NUMBER};

/// A pointer to a block payload within the table file.
///
/// `size` counts payload bytes only; the 5-byte trailer that follows every
/// block on disk is not included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHandle {
    offset: u64,
    size: u64,
}

impl BlockHandle {
    /// Maximum encoded length of a handle: two full-width varint64s.
    pub const MAX_ENCODED_LENGTH: usize = 10 + 10;

    /// Create a new BlockHandle.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// File offset of the block payload.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the block payload in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append the varint encoding of this handle to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    /// Decode a handle from the front of `data`.
    ///
    /// Returns the handle and the number of bytes consumed.
    pub fn decode_from(data: &[u8]) -> Result<(Self, usize)> {
        let (offset, n) =
            get_varint64(data).ok_or_else(|| Error::corruption("bad block handle"))?;
        let (size, m) =
            get_varint64(&data[n..]).ok_or_else(|| Error::corruption("bad block handle"))?;
        Ok((Self { offset, size }, n + m))
    }
}

/// The last 48 bytes of a table file.
///
/// Format:
/// ```text
/// [meta_index_handle + index_handle, zero-padded to 40 bytes]
/// [magic: 8 bytes, little-endian]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    meta_index_handle: BlockHandle,
    index_handle: BlockHandle,
}

impl Footer {
    /// Create a new Footer.
    pub fn new(meta_index_handle: BlockHandle, index_handle: BlockHandle) -> Self {
        Self { meta_index_handle, index_handle }
    }

    /// Handle of the meta-index block.
    pub fn meta_index_handle(&self) -> BlockHandle {
        self.meta_index_handle
    }

    /// Handle of the index block.
    pub fn index_handle(&self) -> BlockHandle {
        self.index_handle
    }

    /// Append the 48-byte footer encoding to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        let original_size = dst.len();
        self.meta_index_handle.encode_to(dst);
        self.index_handle.encode_to(dst);
        dst.resize(original_size + 2 * BlockHandle::MAX_ENCODED_LENGTH, 0);
        put_fixed64(dst, TABLE_MAGIC_NUMBER);
        debug_assert_eq!(dst.len(), original_size + FOOTER_SIZE);
    }

    /// Decode a footer from exactly 48 bytes.
    pub fn decode_from(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Error::corruption(format!(
                "Footer size mismatch: expected {}, got {}",
                FOOTER_SIZE,
                data.len()
            )));
        }

        let magic = get_fixed64(&data[FOOTER_SIZE - 8..]);
        if magic != TABLE_MAGIC_NUMBER {
            return Err(Error::corruption(format!(
                "Invalid table magic number: expected {:#x}, got {:#x}",
                TABLE_MAGIC_NUMBER, magic
            )));
        }

        let (meta_index_handle, n) = BlockHandle::decode_from(&data[..FOOTER_SIZE - 8])?;
        let (index_handle, _) = BlockHandle::decode_from(&data[n..FOOTER_SIZE - 8])?;

        Ok(Self { meta_index_handle, index_handle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_handle_encode_decode() {
        let handle = BlockHandle::new(1234, 5678);
        let mut encoded = Vec::new();
        handle.encode_to(&mut encoded);

        let (decoded, consumed) = BlockHandle::decode_from(&encoded).unwrap();
        assert_eq!(decoded, handle);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_block_handle_varint_width() {
        let mut encoded = Vec::new();
        BlockHandle::new(0, 0).encode_to(&mut encoded);
        assert_eq!(encoded.len(), 2);

        encoded.clear();
        BlockHandle::new(u64::MAX, u64::MAX).encode_to(&mut encoded);
        assert_eq!(encoded.len(), BlockHandle::MAX_ENCODED_LENGTH);
    }

    #[test]
    fn test_block_handle_truncated() {
        let mut encoded = Vec::new();
        BlockHandle::new(1 << 40, 1 << 40).encode_to(&mut encoded);
        assert!(BlockHandle::decode_from(&encoded[..3]).is_err());
    }

    #[test]
    fn test_footer_encode_decode() {
        let footer = Footer::new(BlockHandle::new(1000, 100), BlockHandle::new(2000, 200));

        let mut encoded = Vec::new();
        footer.encode_to(&mut encoded);
        assert_eq!(encoded.len(), FOOTER_SIZE);

        let decoded = Footer::decode_from(&encoded).unwrap();
        assert_eq!(decoded, footer);
    }

    #[test]
    fn test_footer_magic_number() {
        let footer = Footer::new(BlockHandle::new(0, 0), BlockHandle::new(0, 0));
        let mut encoded = Vec::new();
        footer.encode_to(&mut encoded);

        let magic = u64::from_le_bytes(encoded[40..48].try_into().unwrap());
        assert_eq!(magic, TABLE_MAGIC_NUMBER);
        // Unused handle bytes are zero-padded.
        assert!(encoded[4..40].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_footer_invalid_magic() {
        let mut data = vec![0u8; FOOTER_SIZE];
        data[40..48].copy_from_slice(&0x1234567890abcdefu64.to_le_bytes());

        let result = Footer::decode_from(&data);
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_footer_wrong_length() {
        assert!(Footer::decode_from(&[0u8; 47]).is_err());
        assert!(Footer::decode_from(&[0u8; 49]).is_err());
    }

    #[test]
    fn test_footer_large_handles() {
        let footer =
            Footer::new(BlockHandle::new(u64::MAX / 2, 1 << 40), BlockHandle::new(1 << 50, 77));
        let mut encoded = Vec::new();
        footer.encode_to(&mut encoded);
        assert_eq!(encoded.len(), FOOTER_SIZE);
        assert_eq!(Footer::decode_from(&encoded).unwrap(), footer);
    }
}
