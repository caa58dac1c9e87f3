//! # amq-filters
//!
//! `amq-filters` contains approximate membership query filters over 64-bit keys. A filter is
//! built once from a set of distinct keys and answers "is this key possibly in the set?" with no
//! false negatives and a small, tunable false positive probability.
//!
//! The crate provides:
//!
//!  - [`XorFilter`](xor::XorFilter), [`Xor8`](xor::Xor8) and [`Xor16`](xor::Xor16), filters that
//!    store one fingerprint per slot of a peeled 3-hypergraph, with a compact serialized form.
//!  - [`BlockedXor8`](xor::BlockedXor8), an 8-bit xor filter that answers every query from a
//!    single cache line.
//!  - [`CuckooFilter`](cuckoo::CuckooFilter), [`Cuckoo8x4`](cuckoo::Cuckoo8x4) and
//!    [`Cuckoo16x4`](cuckoo::Cuckoo16x4), filters that store fingerprints in buckets of four
//!    entries.
//!  - [`BloomFilter`](bloom::BloomFilter), a plain Bloom filter for comparison.
//!
//! Every filter implements [`Filter`], and [`FilterType`] constructs any of them by name.
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! amq-filters = "*"
//! ```
//!
//! ```rust
//! use amq_filters::{Filter, FilterType};
//!
//! let keys: Vec<u64> = (0..10_000).map(|i| i * 7).collect();
//! let filter = FilterType::Xor8.construct(&keys, 0).unwrap();
//!
//! assert!(filter.may_contain(70));
//! assert!(filter.bits_per_key(keys.len()) < 10.0);
//! ```
//!
//! Keys that are not already well distributed 64-bit values can be hashed with
//! [`hash_item`](hash::hash_item) and a [`SipHasherBuilder`].
//!
//! ## References
//!
//!  - [Xor Filters: Faster and Smaller Than Bloom and Cuckoo Filters](https://arxiv.org/abs/1912.08258)
//!  > Graf, Thomas Mueller, and Daniel Lemire. 2020. “Xor Filters: Faster and Smaller Than Bloom and Cuckoo Filters.” *ACM J. Exp. Algorithmics* 25. doi:[10.1145/3376122](https://doi.org/10.1145/3376122).
//!  - [Cuckoo Filter: Practically Better Than Bloom](https://dl.acm.org/citation.cfm?id=2674994)
//!  > Fan, Bin, Dave G. Andersen, Michael Kaminsky, and Michael D. Mitzenmacher. 2014. “Cuckoo Filter: Practically Better Than Bloom.” In *Proceedings of the 10th Acm International on Conference on Emerging Networking Experiments and Technologies*, 75–88. CoNEXT ’14. New York, NY, USA: ACM. doi:[10.1145/2674005.2674994](https://doi.org/10.1145/2674005.2674994).
//!  - [Less hashing, same performance: Building a better Bloom filter](https://dl.acm.org/citation.cfm?id=1400125)
//!  > Kirsch, Adam, and Michael Mitzenmacher. 2008. “Less Hashing, Same Performance: Building a Better Bloom Filter.” *Random Struct. Algorithms* 33 (2). New York, NY, USA: John Wiley & Sons, Inc.: 187–218. doi:[10.1002/rsa.v33:2](https://doi.org/10.1002/rsa.v33:2).

#![warn(missing_docs)]

pub mod bit_buffer;
pub mod bit_store;
pub mod bloom;
pub mod catalog;
pub mod cuckoo;
pub mod error;
pub mod hash;
pub mod xor;

pub use crate::catalog::FilterType;
pub use crate::error::{Error, Result};
pub use crate::hash::SipHasherBuilder;

/// An immutable approximate membership filter over 64-bit keys.
///
/// Implementations never report a key they were built from as absent.
pub trait Filter: Send + Sync {
    /// Returns `true` if `key` may be in the set, and `false` if it is definitely not.
    fn may_contain(&self, key: u64) -> bool;

    /// Returns the number of bits the filter uses to store its table.
    fn bit_count(&self) -> usize;

    /// Returns the number of bits used per key for a filter built from `key_count` keys.
    fn bits_per_key(&self, key_count: usize) -> f64 {
        self.bit_count() as f64 / key_count as f64
    }
}
