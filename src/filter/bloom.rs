//! Bloom filter policy.
//!
//! A space-efficient probabilistic structure for set membership: false
//! positives are possible, false negatives are not. Each emitted filter
//! carries its own probe count in a trailing byte, so filters written with
//! different parameters remain readable.

use crate::filter::FilterPolicy;

const BLOOM_SEED: u32 = 0xbc9f1d34;

/// Bloom filter policy sized by a fixed number of bits per key.
///
/// # Example
/// ```
/// use lsmtable::filter::{BloomFilterPolicy, FilterPolicy};
///
/// let policy = BloomFilterPolicy::new(10);
/// let mut filter = Vec::new();
/// let keys: &[&[u8]] = &[b"key1", b"key2"];
/// policy.create_filter(keys, &mut filter);
///
/// assert!(policy.key_may_match(b"key1", &filter));
/// assert!(policy.key_may_match(b"key2", &filter));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    k: usize,
}

impl BloomFilterPolicy {
    /// Create a policy allocating `bits_per_key` filter bits per key.
    ///
    /// 10 bits per key yields a false positive rate of about 1%.
    pub fn new(bits_per_key: usize) -> Self {
        // Rounding down trades a little accuracy for cheaper probing.
        let k = ((bits_per_key as f64) * 0.69) as usize; // 0.69 =~ ln(2)
        let k = k.clamp(1, 30);
        Self { bits_per_key, k }
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "lsmtable.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        // Compute bloom filter size (in both bits and bytes).
        let mut bits = keys.len() * self.bits_per_key;

        // For small key counts the false positive rate would be very high;
        // enforce a minimum filter length.
        if bits < 64 {
            bits = 64;
        }

        let bytes = (bits + 7) / 8;
        let bits = bytes * 8;

        let init_size = dst.len();
        dst.resize(init_size + bytes, 0);
        dst.push(self.k as u8); // Remember # of probes in filter
        let array = &mut dst[init_size..init_size + bytes];

        for key in keys {
            // Use double-hashing to generate a sequence of hash values.
            let mut h = bloom_hash(key);
            let delta = h.rotate_right(17);
            for _ in 0..self.k {
                let bitpos = (h as usize) % bits;
                array[bitpos / 8] |= 1 << (bitpos % 8);
                h = h.wrapping_add(delta);
            }
        }
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        let len = filter.len();
        if len < 2 {
            return false;
        }

        let array = &filter[..len - 1];
        let bits = array.len() * 8;

        // Use the probe count encoded in the filter, not our own, so filters
        // written under different parameters decode correctly.
        let k = filter[len - 1] as usize;
        if k > 30 {
            // Reserved for potential new encodings. Treat as a match.
            return true;
        }

        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let bitpos = (h as usize) % bits;
            if array[bitpos / 8] & (1 << (bitpos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}

fn bloom_hash(key: &[u8]) -> u32 {
    hash32(key, BLOOM_SEED)
}

/// Seeded 32-bit hash over a byte string.
fn hash32(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0xc6a4a793;
    const R: u32 = 24;

    let mut h = seed ^ (data.len() as u32).wrapping_mul(M);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let w = u32::from_le_bytes(chunk.try_into().unwrap());
        h = h.wrapping_add(w);
        h = h.wrapping_mul(M);
        h ^= h >> 16;
    }

    let rest = chunks.remainder();
    if rest.len() >= 3 {
        h = h.wrapping_add((rest[2] as u32) << 16);
    }
    if rest.len() >= 2 {
        h = h.wrapping_add((rest[1] as u32) << 8);
    }
    if !rest.is_empty() {
        h = h.wrapping_add(rest[0] as u32);
        h = h.wrapping_mul(M);
        h ^= h >> R;
    }
    h
}
