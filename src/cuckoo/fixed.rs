use crate::cuckoo::{alternate_bucket, locate, BucketTable, CuckooFilterBuilder};
use crate::error::Result;
use crate::Filter;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

const ENTRIES_PER_BUCKET: usize = 4;

const BYTE_LANES_LOW: u64 = 0x0101_0101_0101_0101;
const BYTE_LANES_HIGH: u64 = 0x8080_8080_8080_8080;
const WORD_LANES_LOW: u64 = 0x0001_0001_0001_0001;
const WORD_LANES_HIGH: u64 = 0x8000_8000_8000_8000;

/// Returns a mask with the high bit of a byte set for bytes of `value` that may be zero. The
/// lowest flagged byte is always zero, and the mask is nonzero iff some byte is zero.
#[inline]
fn zero_bytes(value: u64) -> u64 {
    value.wrapping_sub(BYTE_LANES_LOW) & !value & BYTE_LANES_HIGH
}

/// The 16-bit lane version of [`zero_bytes`].
#[inline]
fn zero_words(value: u64) -> u64 {
    value.wrapping_sub(WORD_LANES_LOW) & !value & WORD_LANES_HIGH
}

/// A cuckoo filter with 4 one-byte entries per bucket, one `u32` per bucket.
///
/// A query broadcasts the fingerprint over both buckets and tests all 8 entries with a single
/// zero-byte check on a 64-bit word.
///
/// # Examples
///
/// ```
/// use amq_filters::cuckoo::Cuckoo8x4;
///
/// let keys: Vec<u64> = (0..10_000).collect();
/// let filter = Cuckoo8x4::new(&keys).unwrap();
///
/// assert!(keys.iter().all(|key| filter.may_contain(*key)));
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct Cuckoo8x4 {
    buckets: Vec<u32>,
}

impl Cuckoo8x4 {
    pub(super) fn with_buckets(bucket_count: usize) -> Self {
        Cuckoo8x4 {
            buckets: vec![0; bucket_count],
        }
    }

    /// Builds a filter from `keys` with the default builder.
    ///
    /// # Errors
    ///
    /// See [`CuckooFilterBuilder::build_8x4`].
    pub fn new(keys: &[u64]) -> Result<Self> {
        CuckooFilterBuilder::default().build_8x4(keys)
    }

    /// Returns `true` if `key` may be in the set. There are no false negatives.
    #[inline]
    pub fn may_contain(&self, key: u64) -> bool {
        let (fingerprint, bucket) = locate(key, 8, self.buckets.len());
        let alternate = alternate_bucket(bucket, fingerprint, self.buckets.len());
        let pair = u64::from(self.buckets[bucket]) | u64::from(self.buckets[alternate]) << 32;
        zero_bytes(pair ^ fingerprint.wrapping_mul(BYTE_LANES_LOW)) != 0
    }

    /// Returns the number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of occupied entries.
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.to_le_bytes().iter().filter(|byte| **byte != 0).count())
            .sum()
    }

    /// Returns `true` if no entry is occupied.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|bucket| *bucket == 0)
    }
}

impl BucketTable for Cuckoo8x4 {
    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn entries_per_bucket(&self) -> usize {
        ENTRIES_PER_BUCKET
    }

    #[inline]
    fn entry(&self, bucket: usize, entry: usize) -> u64 {
        u64::from(self.buckets[bucket] >> (entry * 8) & 0xFF)
    }

    #[inline]
    fn bucket_contains(&self, bucket: usize, fingerprint: u64) -> bool {
        let lanes = u64::from(self.buckets[bucket]) | 0xFFFF_FFFF_0000_0000;
        zero_bytes(lanes ^ fingerprint.wrapping_mul(BYTE_LANES_LOW & 0xFFFF_FFFF)) != 0
    }

    fn try_insert(&mut self, bucket: usize, fingerprint: u64) -> bool {
        let lanes = u64::from(self.buckets[bucket]) | 0xFFFF_FFFF_0000_0000;
        let empty = zero_bytes(lanes);
        if empty == 0 {
            return false;
        }
        let shift = empty.trailing_zeros() - 7;
        self.buckets[bucket] |= (fingerprint as u32) << shift;
        true
    }

    fn swap(&mut self, bucket: usize, entry: usize, fingerprint: u64) -> u64 {
        let shift = entry * 8;
        let evicted = self.entry(bucket, entry);
        self.buckets[bucket] =
            self.buckets[bucket] & !(0xFF << shift) | (fingerprint as u32) << shift;
        evicted
    }
}

impl Filter for Cuckoo8x4 {
    fn may_contain(&self, key: u64) -> bool {
        Cuckoo8x4::may_contain(self, key)
    }

    fn bit_count(&self) -> usize {
        self.buckets.len() * 32
    }
}

/// A cuckoo filter with 4 two-byte entries per bucket, one `u64` per bucket.
///
/// # Examples
///
/// ```
/// use amq_filters::cuckoo::Cuckoo16x4;
/// use amq_filters::Filter;
///
/// let keys: Vec<u64> = (0..10_000).collect();
/// let filter = Cuckoo16x4::new(&keys).unwrap();
///
/// assert!(keys.iter().all(|key| filter.may_contain(*key)));
/// assert_eq!(filter.bit_count(), filter.bucket_count() * 64);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct Cuckoo16x4 {
    buckets: Vec<u64>,
}

impl Cuckoo16x4 {
    pub(super) fn with_buckets(bucket_count: usize) -> Self {
        Cuckoo16x4 {
            buckets: vec![0; bucket_count],
        }
    }

    /// Builds a filter from `keys` with the default builder.
    ///
    /// # Errors
    ///
    /// See [`CuckooFilterBuilder::build_16x4`].
    pub fn new(keys: &[u64]) -> Result<Self> {
        CuckooFilterBuilder::default().build_16x4(keys)
    }

    /// Returns `true` if `key` may be in the set. There are no false negatives.
    #[inline]
    pub fn may_contain(&self, key: u64) -> bool {
        let (fingerprint, bucket) = locate(key, 16, self.buckets.len());
        self.bucket_contains(bucket, fingerprint)
            || self.bucket_contains(
                alternate_bucket(bucket, fingerprint, self.buckets.len()),
                fingerprint,
            )
    }

    /// Returns the number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of occupied entries.
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| (0..4).filter(|entry| bucket >> (entry * 16) & 0xFFFF != 0).count())
            .sum()
    }

    /// Returns `true` if no entry is occupied.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|bucket| *bucket == 0)
    }
}

impl BucketTable for Cuckoo16x4 {
    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn entries_per_bucket(&self) -> usize {
        ENTRIES_PER_BUCKET
    }

    #[inline]
    fn entry(&self, bucket: usize, entry: usize) -> u64 {
        self.buckets[bucket] >> (entry * 16) & 0xFFFF
    }

    #[inline]
    fn bucket_contains(&self, bucket: usize, fingerprint: u64) -> bool {
        zero_words(self.buckets[bucket] ^ fingerprint.wrapping_mul(WORD_LANES_LOW)) != 0
    }

    fn try_insert(&mut self, bucket: usize, fingerprint: u64) -> bool {
        let empty = zero_words(self.buckets[bucket]);
        if empty == 0 {
            return false;
        }
        let shift = empty.trailing_zeros() - 15;
        self.buckets[bucket] |= fingerprint << shift;
        true
    }

    fn swap(&mut self, bucket: usize, entry: usize, fingerprint: u64) -> u64 {
        let shift = entry * 16;
        let evicted = self.entry(bucket, entry);
        self.buckets[bucket] = self.buckets[bucket] & !(0xFFFF << shift) | fingerprint << shift;
        evicted
    }
}

impl Filter for Cuckoo16x4 {
    fn may_contain(&self, key: u64) -> bool {
        Cuckoo16x4::may_contain(self, key)
    }

    fn bit_count(&self) -> usize {
        self.buckets.len() * 64
    }
}

#[cfg(test)]
mod tests {
    use super::{zero_bytes, zero_words, Cuckoo16x4, Cuckoo8x4};
    use crate::cuckoo::{BucketTable, CuckooFilterBuilder};
    use crate::hash::tests::{disjoint_keys, random_keys};
    use crate::Filter;

    #[test]
    fn test_zero_lanes() {
        assert_eq!(zero_bytes(0x0101_0101_0101_0101), 0);
        assert_ne!(zero_bytes(0x0101_0101_0100_0101), 0);
        assert_eq!(zero_bytes(0xFF01_0203_0405_0607).trailing_zeros(), 64);
        // 0x0100: the borrow from the zero byte flags the byte above it too.
        assert_eq!(zero_bytes(0xFFFF_FFFF_FFFF_0100).trailing_zeros(), 7);
        assert_eq!(zero_words(0x0001_0001_0001_0001), 0);
        assert_eq!(zero_words(0x0001_0000_0001_0001).trailing_zeros(), 47);
    }

    #[test]
    fn test_8x4_bucket_ops() {
        let mut filter = Cuckoo8x4::with_buckets(2);
        for fingerprint in 1..=4 {
            assert!(filter.try_insert(1, fingerprint));
        }
        assert!(!filter.try_insert(1, 5));
        assert!((1..=4).all(|fingerprint| filter.bucket_contains(1, fingerprint)));
        assert!(!filter.bucket_contains(1, 5));
        assert!(!filter.bucket_contains(0, 1));
        assert_eq!(filter.swap(1, 2, 0xEE), 3);
        assert_eq!(filter.entry(1, 2), 0xEE);
        assert_eq!(filter.buckets[1], 0x04EE_0201);
        assert_eq!(filter.len(), 4);
    }

    #[test]
    fn test_16x4_bucket_ops() {
        let mut filter = Cuckoo16x4::with_buckets(2);
        for fingerprint in &[0x100, 0x1, 0xFFFF, 0x8000] {
            assert!(filter.try_insert(0, *fingerprint));
        }
        assert!(!filter.try_insert(0, 7));
        assert!(filter.bucket_contains(0, 0xFFFF));
        assert!(!filter.bucket_contains(0, 0xFF));
        assert_eq!(filter.swap(0, 0, 0x1234), 0x100);
        assert_eq!(filter.entry(0, 0), 0x1234);
        assert_eq!(filter.buckets[0], 0x8000_FFFF_0001_1234);
    }

    #[test]
    fn test_matches_packed_filter() {
        // Same evictions with the same seed give identical entries.
        let keys = random_keys(80, 5_000);
        let builder = CuckooFilterBuilder::default().max_kicks(1_000).seed(3);
        let packed = builder.clone().fingerprint_bits(8).build(&keys).unwrap();
        let fixed = builder.build_8x4(&keys).unwrap();
        assert_eq!(packed.bucket_count(), fixed.bucket_count());
        for bucket in 0..fixed.bucket_count() {
            for entry in 0..4 {
                assert_eq!(packed.entry(bucket, entry), fixed.entry(bucket, entry));
            }
        }

        let packed = builder.clone().fingerprint_bits(16).build(&keys).unwrap();
        let fixed = builder.build_16x4(&keys).unwrap();
        for bucket in 0..fixed.bucket_count() {
            for entry in 0..4 {
                assert_eq!(packed.entry(bucket, entry), fixed.entry(bucket, entry));
            }
        }
    }

    #[test]
    fn test_no_false_negatives() {
        let keys = random_keys(81, 50_000);
        let filter = Cuckoo8x4::new(&keys).unwrap();
        assert!(keys.iter().all(|key| filter.may_contain(*key)));
        let filter = Cuckoo16x4::new(&keys).unwrap();
        assert!(keys.iter().all(|key| filter.may_contain(*key)));
    }

    #[test]
    fn test_false_positive_rate() {
        let keys = random_keys(82, 20_000);
        let probes = disjoint_keys(83, 100_000, &keys);

        let filter = Cuckoo8x4::new(&keys).unwrap();
        let hits = probes.iter().filter(|key| filter.may_contain(**key)).count();
        assert!(hits < 4_000, "hits {}", hits);
        assert!(filter.bits_per_key(keys.len()) < 9.0);

        let filter = Cuckoo16x4::new(&keys).unwrap();
        let hits = probes.iter().filter(|key| filter.may_contain(**key)).count();
        assert!(hits < 50, "hits {}", hits);
    }

    #[test]
    fn test_empty() {
        let filter = Cuckoo8x4::new(&[]).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.may_contain(0));
        let filter = Cuckoo16x4::new(&[]).unwrap();
        assert!(filter.is_empty());
        assert_eq!(filter.len(), 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_ser_de() {
        let keys = random_keys(84, 1_000);
        let filter = Cuckoo8x4::new(&keys).unwrap();

        let serialized_filter = bincode::serialize(&filter).unwrap();
        let de_filter: Cuckoo8x4 = bincode::deserialize(&serialized_filter).unwrap();

        assert_eq!(filter, de_filter);
    }
}
