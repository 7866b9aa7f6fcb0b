//! Filter policies for tables.
//!
//! A filter policy builds a small probabilistic summary over the keys of a
//! data block range. Readers probe the summary before touching the block:
//! a negative answer is definitive, a positive answer may be wrong.

pub mod bloom;

pub use bloom::BloomFilterPolicy;

/// Builds and probes per-block-range key filters.
pub trait FilterPolicy: Send + Sync {
    /// The name of this policy.
    ///
    /// The meta-index entry for the filter block is keyed on it, so readers
    /// configured with a different policy will ignore the filter rather than
    /// misinterpret it. Change the name whenever the encoding changes
    /// incompatibly.
    fn name(&self) -> &'static str;

    /// Append a filter summarizing `keys` to `dst`.
    ///
    /// Keys may repeat. The filter bytes must be self-contained: `dst` may
    /// already hold earlier filters.
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>);

    /// Whether `key` may be in the set `filter` was built from.
    ///
    /// Must return true for every key passed to the `create_filter` call
    /// that produced `filter`; may return true for other keys.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}
