//! Plain Bloom filter over 64-bit keys.

use crate::bit_store::BitStore;
use crate::error::{Error, Result};
use crate::hash::{mix64, reduce};
use crate::Filter;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

const MIN_BIT_COUNT: usize = 64;

/// A Bloom filter built from a batch of keys.
///
/// `K` bit positions per key are derived from one mixed hash by double hashing, with `K` chosen
/// for the configured bits per key.
///
/// # Examples
///
/// ```
/// use amq_filters::bloom::BloomFilter;
/// use amq_filters::Filter;
///
/// let keys: Vec<u64> = (0..1_000).collect();
/// let filter = BloomFilter::new(&keys, 10).unwrap();
///
/// assert!(keys.iter().all(|key| filter.may_contain(*key)));
/// assert_eq!(filter.hasher_count(), 7);
/// assert_eq!(filter.bit_count(), 10_000);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct BloomFilter {
    bits: BitStore,
    hasher_count: usize,
}

impl BloomFilter {
    fn get_hasher_count(bits_per_key: usize) -> usize {
        ((bits_per_key as f64) * 2f64.ln()).ceil() as usize
    }

    /// Builds a filter from `keys` with `bits_per_key` bits per key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `bits_per_key` is 0.
    pub fn new(keys: &[u64], bits_per_key: usize) -> Result<Self> {
        if bits_per_key == 0 {
            return Err(Error::InvalidArgument(
                "a bloom filter needs at least one bit per key".to_string(),
            ));
        }
        let mut filter = BloomFilter {
            bits: BitStore::new(std::cmp::max(MIN_BIT_COUNT, keys.len() * bits_per_key)),
            hasher_count: Self::get_hasher_count(bits_per_key),
        };
        for key in keys {
            filter.insert(*key);
        }
        Ok(filter)
    }

    #[inline]
    fn positions(&self, key: u64) -> impl Iterator<Item = usize> {
        let hash = mix64(key);
        let a = (hash >> 32) as u32;
        let b = hash as u32 | 1;
        let len = self.bits.len();
        (0..self.hasher_count as u32)
            .map(move |i| reduce(a.wrapping_add(i.wrapping_mul(b)), len))
    }

    fn insert(&mut self, key: u64) {
        for position in self.positions(key) {
            self.bits.set_bit(position);
        }
    }

    /// Returns `true` if `key` may be in the set. There are no false negatives.
    pub fn may_contain(&self, key: u64) -> bool {
        self.positions(key).all(|position| self.bits.get_bit(position))
    }

    /// Returns the number of hash functions used by the bloom filter.
    pub fn hasher_count(&self) -> usize {
        self.hasher_count
    }

    /// Returns the estimated false positive probability from the fraction of set bits.
    pub fn estimated_fpp(&self) -> f64 {
        let single_fpp = self.bits.count_ones() as f64 / self.bits.len() as f64;
        single_fpp.powi(self.hasher_count as i32)
    }
}

impl Filter for BloomFilter {
    fn may_contain(&self, key: u64) -> bool {
        BloomFilter::may_contain(self, key)
    }

    fn bit_count(&self) -> usize {
        self.bits.len()
    }
}
