use crate::bit_store::BitStore;
use crate::cuckoo::{alternate_bucket, locate, BucketTable, CuckooFilterBuilder};
use crate::error::Result;
use crate::Filter;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// A cuckoo filter with fingerprints of any width from 1 to 32 bits, packed without padding.
///
/// The table has an even number of buckets, each holding `entries_per_bucket` fingerprints. A
/// query checks the `2 * entries_per_bucket` entries of the key's two buckets, so the false
/// positive probability is about `2 * entries_per_bucket * load_factor / 2^fingerprint_bits`.
///
/// # Examples
///
/// ```
/// use amq_filters::cuckoo::CuckooFilter;
/// use amq_filters::Filter;
///
/// let keys: Vec<u64> = (0..1_000).collect();
/// let filter = CuckooFilter::new(&keys, 12).unwrap();
///
/// assert!(filter.may_contain(42));
/// assert_eq!(filter.fingerprint_bits(), 12);
/// assert_eq!(filter.entries_per_bucket(), 4);
/// assert_eq!(filter.bit_count(), filter.bucket_count() * 4 * 12);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct CuckooFilter {
    store: BitStore,
    bucket_count: usize,
    entries_per_bucket: usize,
    fingerprint_bits: usize,
}

impl CuckooFilter {
    pub(super) fn with_buckets(
        bucket_count: usize,
        entries_per_bucket: usize,
        fingerprint_bits: usize,
    ) -> Self {
        CuckooFilter {
            store: BitStore::new(bucket_count * entries_per_bucket * fingerprint_bits),
            bucket_count,
            entries_per_bucket,
            fingerprint_bits,
        }
    }

    /// Creates a builder.
    pub fn builder() -> CuckooFilterBuilder {
        CuckooFilterBuilder::default()
    }

    /// Builds a filter with 4 entries per bucket from `keys`.
    ///
    /// # Errors
    ///
    /// See [`CuckooFilterBuilder::build`].
    pub fn new(keys: &[u64], fingerprint_bits: usize) -> Result<Self> {
        Self::builder().fingerprint_bits(fingerprint_bits).build(keys)
    }

    #[inline]
    fn bit_offset(&self, bucket: usize, entry: usize) -> usize {
        (bucket * self.entries_per_bucket + entry) * self.fingerprint_bits
    }

    /// Returns `true` if `key` may be in the set. There are no false negatives.
    pub fn may_contain(&self, key: u64) -> bool {
        let (fingerprint, bucket) = locate(key, self.fingerprint_bits, self.bucket_count);
        self.bucket_contains(bucket, fingerprint)
            || self.bucket_contains(
                alternate_bucket(bucket, fingerprint, self.bucket_count),
                fingerprint,
            )
    }

    /// Returns the number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Returns the number of entries in each bucket.
    pub fn entries_per_bucket(&self) -> usize {
        self.entries_per_bucket
    }

    /// Returns the fingerprint width in bits.
    pub fn fingerprint_bits(&self) -> usize {
        self.fingerprint_bits
    }

    /// Returns the number of occupied entries. Keys whose fingerprint was already present in
    /// their bucket pair share an entry.
    pub fn len(&self) -> usize {
        (0..self.bucket_count)
            .map(|bucket| {
                (0..self.entries_per_bucket)
                    .filter(|entry| self.entry(bucket, *entry) != 0)
                    .count()
            })
            .sum()
    }

    /// Returns `true` if no entry is occupied.
    pub fn is_empty(&self) -> bool {
        self.store.count_ones() == 0
    }

    /// Returns the fraction of occupied entries.
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / (self.bucket_count * self.entries_per_bucket) as f64
    }
}

impl BucketTable for CuckooFilter {
    fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    fn entries_per_bucket(&self) -> usize {
        self.entries_per_bucket
    }

    #[inline]
    fn entry(&self, bucket: usize, entry: usize) -> u64 {
        self.store
            .read(self.bit_offset(bucket, entry), self.fingerprint_bits)
    }

    #[inline]
    fn bucket_contains(&self, bucket: usize, fingerprint: u64) -> bool {
        (0..self.entries_per_bucket).any(|entry| self.entry(bucket, entry) == fingerprint)
    }

    fn try_insert(&mut self, bucket: usize, fingerprint: u64) -> bool {
        match (0..self.entries_per_bucket).find(|entry| self.entry(bucket, *entry) == 0) {
            Some(entry) => {
                let bit_offset = self.bit_offset(bucket, entry);
                self.store.write(bit_offset, fingerprint, self.fingerprint_bits);
                true
            }
            None => false,
        }
    }

    fn swap(&mut self, bucket: usize, entry: usize, fingerprint: u64) -> u64 {
        let bit_offset = self.bit_offset(bucket, entry);
        let evicted = self.store.read(bit_offset, self.fingerprint_bits);
        self.store
            .replace(bit_offset, fingerprint, self.fingerprint_bits);
        evicted
    }
}

impl Filter for CuckooFilter {
    fn may_contain(&self, key: u64) -> bool {
        CuckooFilter::may_contain(self, key)
    }

    fn bit_count(&self) -> usize {
        self.bucket_count * self.entries_per_bucket * self.fingerprint_bits
    }
}
