//! Masked CRC32C checksums for block trailers.
//!
//! Block trailers store a *masked* CRC32C of the block payload plus its
//! compression-type byte. The mask rotates the CRC and adds a constant so
//! that computing the CRC of a string that itself contains embedded CRCs
//! does not degenerate.

const MASK_DELTA: u32 = 0xa282ead8;

/// CRC32C of `data`.
pub fn value(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Extend `init` (the CRC32C of some string A) to be the CRC32C of A ++ data.
pub fn extend(init: u32, data: &[u8]) -> u32 {
    crc32c::crc32c_append(init, data)
}

/// Return a masked representation of `crc` suitable for storage.
pub fn mask(crc: u32) -> u32 {
    // Rotate right by 15 bits and add a constant.
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Return the crc whose masked representation is `masked`.
pub fn unmask(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}
