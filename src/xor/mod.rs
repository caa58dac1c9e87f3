//! Immutable filters built by peeling a 3-hypergraph.
//!
//! Every key is a hyperedge over three slots, one in each third of the table. Construction peels
//! the hypergraph and then assigns slot values in reverse peeling order such that for every key
//! `fingerprint(key) == slot[h0] ^ slot[h1] ^ slot[h2]`. A query recomputes the three slots and
//! the fingerprint and checks the xor.
//!
//! # Usage
//!
//! ```
//! use amq_filters::xor::{Xor8, XorFilter};
//!
//! let keys: Vec<u64> = (0..10_000).collect();
//!
//! let filter = Xor8::new(&keys).unwrap();
//! assert!(filter.may_contain(42));
//!
//! let filter = XorFilter::new(&keys, 12).unwrap();
//! assert!(filter.may_contain(42));
//! ```
//!
//! Keys must be distinct. Filters are immutable once built.

mod blocked;
mod builder;
mod codec;
mod core;
mod fixed;
mod packed;
mod probe;

pub use self::blocked::{Alignment, BlockedXor8, BlockedXor8Builder};
pub use self::builder::XorFilterBuilder;
pub use self::fixed::{Xor16, Xor8};
pub use self::packed::XorFilter;
pub use self::probe::{detect_cache_line_offset, ProbeConfig, CACHE_LINE_SIZE};

use crate::hash::reduce;

/// Slots are allocated at this multiple of the key count, which keeps peeling failures rare.
const LOAD_FACTOR: f64 = 1.23;
const EXTRA_SLOTS: usize = 3;

/// Construction aborts once a single slot collects this many keys.
pub(crate) const MAX_DEGREE: usize = 120;

/// Largest supported fingerprint width of the bit-packed filter.
pub const MAX_FINGERPRINT_BITS: usize = 32;

/// Returns the length of each of the three blocks for `key_count` keys.
pub(crate) fn block_length_for(key_count: usize) -> usize {
    let slot_count = EXTRA_SLOTS + (LOAD_FACTOR * key_count as f64).ceil() as usize;
    slot_count / 3
}

/// Returns one slot per block, carved from different 32-bit windows of `hash`.
#[inline]
pub(crate) fn slot_indices(hash: u64, block_length: usize) -> [usize; 3] {
    [
        reduce(hash as u32, block_length),
        block_length + reduce(hash.rotate_left(21) as u32, block_length),
        2 * block_length + reduce(hash.rotate_left(42) as u32, block_length),
    ]
}

#[inline]
pub(crate) fn fingerprint(hash: u64, mask: u64) -> u64 {
    (hash ^ (hash >> 32)) & mask
}

#[inline]
pub(crate) fn fingerprint_mask(fingerprint_bits: usize) -> u64 {
    if fingerprint_bits >= 64 {
        !0
    } else {
        (1 << fingerprint_bits) - 1
    }
}
