//! Variable-length and fixed-width integer encoding.
//!
//! Varints store 7 bits per byte, least-significant group first, with the
//! high bit of each byte set when more bytes follow. A u32 takes at most
//! 5 bytes, a u64 at most 10. Fixed-width integers are little-endian.

use bytes::BufMut;

/// Maximum encoded length of a varint32.
pub const MAX_VARINT32_LENGTH: usize = 5;

/// Maximum encoded length of a varint64.
pub const MAX_VARINT64_LENGTH: usize = 10;

/// Append a varint32 to `dst`.
pub fn put_varint32<B: BufMut>(dst: &mut B, v: u32) {
    put_varint64(dst, v as u64);
}

/// Append a varint64 to `dst`.
pub fn put_varint64<B: BufMut>(dst: &mut B, mut v: u64) {
    while v >= 0x80 {
        dst.put_u8((v as u8) | 0x80);
        v >>= 7;
    }
    dst.put_u8(v as u8);
}

/// Append a little-endian u32 to `dst`.
pub fn put_fixed32<B: BufMut>(dst: &mut B, v: u32) {
    dst.put_u32_le(v);
}

/// Append a little-endian u64 to `dst`.
pub fn put_fixed64<B: BufMut>(dst: &mut B, v: u64) {
    dst.put_u64_le(v);
}

/// Decode a varint32 from the front of `data`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// input is truncated or the value overflows 32 bits.
pub fn get_varint32(data: &[u8]) -> Option<(u32, usize)> {
    let (v, n) = get_varint64(data)?;
    if v > u32::MAX as u64 {
        return None;
    }
    Some((v as u32, n))
}

/// Decode a varint64 from the front of `data`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// input is truncated or longer than 10 bytes.
pub fn get_varint64(data: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT64_LENGTH) {
        result |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
    }
    None
}

/// Decode a little-endian u32 from the front of `data`.
pub fn get_fixed32(data: &[u8]) -> u32 {
    u32::from_le_bytes(data[..4].try_into().unwrap())
}

/// Decode a little-endian u64 from the front of `data`.
pub fn get_fixed64(data: &[u8]) -> u64 {
    u64::from_le_bytes(data[..8].try_into().unwrap())
}

/// Number of bytes `v` occupies when varint-encoded.
pub fn varint_length(mut v: u64) -> usize {
    let mut len = 1;
    while v >= 0x80 {
        v >>= 7;
        len += 1;
    }
    len
}
