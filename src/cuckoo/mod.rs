//! Filters built by cuckoo hashing fingerprints into buckets of a few entries.
//!
//! Every key has a primary bucket and an alternate bucket, and its fingerprint is stored in one
//! of them. When both are full, a random entry of the current bucket is evicted to its own
//! alternate bucket, and so on, until an empty entry turns up or the eviction budget runs out.
//!
//! The alternate bucket depends only on the bucket and the fingerprint, so an evicted
//! fingerprint can be moved without knowing its key:
//!
//! ```
//! use amq_filters::cuckoo::alternate_bucket;
//!
//! let bucket_count = 1_000;
//! let other = alternate_bucket(17, 0xAB, bucket_count);
//! assert_ne!(other, 17);
//! assert_eq!(alternate_bucket(other, 0xAB, bucket_count), 17);
//! ```
//!
//! Filters are built once from a batch of keys and are read-only afterwards.

mod builder;
mod cuckoo_filter;
mod fixed;

pub use self::builder::CuckooFilterBuilder;
pub use self::cuckoo_filter::CuckooFilter;
pub use self::fixed::{Cuckoo16x4, Cuckoo8x4};

use crate::error::{Error, Result};
use crate::hash::{mix64, reduce};
use log::warn;
use rand::Rng;
use rand_xorshift::XorShiftRng;

const DEFAULT_ENTRIES_PER_BUCKET: usize = 4;
const DEFAULT_FINGERPRINT_BITS: usize = 8;
const DEFAULT_LOAD_FACTOR: f64 = 0.94;
/// Eviction budget of the fixed-width filters.
const DEFAULT_MAX_KICKS: usize = 1_000;
/// Eviction budget of the bit-packed filter, which runs at a higher effective load.
const DEFAULT_MAX_KICKS_PACKED: usize = 10_000;

const FINGERPRINT_MULTIPLIER: u32 = 0x5bd1_e995;

/// Returns the other bucket of the pair that `bucket` forms with `fingerprint`.
///
/// The mapping is `bucket -> (-bucket - r) mod bucket_count` for an odd offset `r` derived from
/// the fingerprint alone. Applying it twice returns `bucket`, and because `bucket_count` is even
/// the result always differs from `bucket`.
///
/// # Panics
///
/// Panics in debug builds if `bucket_count` is odd or `bucket >= bucket_count`.
#[inline]
pub fn alternate_bucket(bucket: usize, fingerprint: u64, bucket_count: usize) -> usize {
    debug_assert!(bucket_count % 2 == 0 && bucket < bucket_count);
    let mixed = (fingerprint as u32).wrapping_mul(FINGERPRINT_MULTIPLIER);
    let offset = (reduce(mixed, bucket_count / 2) << 1) + 1;
    let sum = bucket + offset;
    if sum <= bucket_count {
        bucket_count - sum
    } else {
        2 * bucket_count - sum
    }
}

/// Returns the even number of buckets that holds `key_count` keys at `load_factor`, plus about
/// `sqrt` of that many spare buckets. Small tables therefore run well below `load_factor`.
pub(crate) fn bucket_count_for(
    key_count: usize,
    entries_per_bucket: usize,
    load_factor: f64,
) -> usize {
    let buckets = (key_count as f64 / entries_per_bucket as f64 / load_factor).ceil() as usize;
    let buckets = buckets + (buckets as f64).sqrt().ceil() as usize;
    std::cmp::max(2, buckets + (buckets & 1))
}

/// Returns the fingerprint and primary bucket of `key`.
///
/// The fingerprint comes from the low bits of the hash and the bucket from the high 32 bits, so
/// the two are independent. A zero fingerprint marks an empty entry and is replaced by 1.
#[inline]
pub(crate) fn locate(key: u64, fingerprint_bits: usize, bucket_count: usize) -> (u64, usize) {
    let hash = mix64(key);
    let fingerprint = std::cmp::max(hash & ((1 << fingerprint_bits) - 1), 1);
    (fingerprint, reduce((hash >> 32) as u32, bucket_count))
}

/// Bucket storage shared by the eviction loop.
pub(crate) trait BucketTable {
    fn bucket_count(&self) -> usize;

    fn entries_per_bucket(&self) -> usize;

    /// Returns the fingerprint in `entry` of `bucket`, or 0 if it is empty.
    fn entry(&self, bucket: usize, entry: usize) -> u64;

    fn bucket_contains(&self, bucket: usize, fingerprint: u64) -> bool;

    /// Stores `fingerprint` in the first empty entry of `bucket`. Returns `false` if it is full.
    fn try_insert(&mut self, bucket: usize, fingerprint: u64) -> bool;

    /// Replaces the fingerprint in `entry` of `bucket` and returns the old one.
    fn swap(&mut self, bucket: usize, entry: usize, fingerprint: u64) -> u64;
}

/// Inserts the fingerprint of every key, evicting entries for at most `max_kicks` rounds per key.
///
/// A fingerprint that is already present in its bucket pair is not stored again.
pub(crate) fn insert_all<T: BucketTable>(
    table: &mut T,
    keys: &[u64],
    fingerprint_bits: usize,
    max_kicks: usize,
    rng: &mut XorShiftRng,
) -> Result<()> {
    let bucket_count = table.bucket_count();
    let entries_per_bucket = table.entries_per_bucket();
    for &key in keys {
        let (mut fingerprint, primary) = locate(key, fingerprint_bits, bucket_count);
        let alternate = alternate_bucket(primary, fingerprint, bucket_count);
        if table.bucket_contains(primary, fingerprint)
            || table.bucket_contains(alternate, fingerprint)
            || table.try_insert(primary, fingerprint)
            || table.try_insert(alternate, fingerprint)
        {
            continue;
        }

        let mut bucket = if rng.gen::<bool>() { primary } else { alternate };
        let mut placed = false;
        for _ in 0..max_kicks {
            let entry = rng.gen_range(0, entries_per_bucket);
            fingerprint = table.swap(bucket, entry, fingerprint);
            bucket = alternate_bucket(bucket, fingerprint, bucket_count);
            if table.try_insert(bucket, fingerprint) {
                placed = true;
                break;
            }
        }
        if !placed {
            warn!(
                "cuckoo eviction gave up after {} rounds with {} keys in {} buckets",
                max_kicks,
                keys.len(),
                bucket_count,
            );
            return Err(Error::EvictionLimitExceeded(max_kicks));
        }
    }
    Ok(())
}
