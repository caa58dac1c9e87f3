use crate::error::Result;
use crate::xor::core::XorCore;
use crate::xor::XorFilterBuilder;
use crate::Filter;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// An xor filter with one byte per slot.
///
/// Uses about 9.84 bits per key for a false positive probability of about 0.39%.
///
/// # Examples
///
/// ```
/// use amq_filters::xor::Xor8;
///
/// let keys: Vec<u64> = (0..10_000).collect();
/// let filter = Xor8::new(&keys).unwrap();
///
/// assert!(keys.iter().all(|key| filter.may_contain(*key)));
/// assert_eq!(filter.len(), filter.fingerprints().len());
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct Xor8 {
    pub(super) core: XorCore<Vec<u8>>,
}

impl Xor8 {
    /// Builds a filter from distinct `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if `keys` holds a duplicate and
    /// [`crate::Error::DegenerateSlot`] for a degenerate key set.
    pub fn new(keys: &[u64]) -> Result<Self> {
        XorFilterBuilder::default().build_xor8(keys)
    }

    /// Returns `true` if `key` may be in the set. There are no false negatives.
    #[inline]
    pub fn may_contain(&self, key: u64) -> bool {
        self.core.may_contain(key)
    }

    /// Answers a batch of queries. The result for each key equals [`Xor8::may_contain`].
    pub fn may_contain_batch(&self, keys: &[u64]) -> Vec<bool> {
        self.core.may_contain_batch(keys)
    }

    /// Returns the slot table.
    pub fn fingerprints(&self) -> &[u8] {
        &self.core.slots
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.core.slot_count()
    }

    /// Always `false`: even a filter of no keys has three slots.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the hash index the filter was built with.
    pub fn hash_index(&self) -> u64 {
        self.core.hash_index
    }
}

impl Filter for Xor8 {
    fn may_contain(&self, key: u64) -> bool {
        self.core.may_contain(key)
    }

    fn bit_count(&self) -> usize {
        self.core.bit_count()
    }
}

/// An xor filter with two bytes per slot.
///
/// Uses about 19.7 bits per key for a false positive probability of about 0.0015%.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct Xor16 {
    pub(super) core: XorCore<Vec<u16>>,
}

impl Xor16 {
    /// Builds a filter from distinct `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if `keys` holds a duplicate and
    /// [`crate::Error::DegenerateSlot`] for a degenerate key set.
    pub fn new(keys: &[u64]) -> Result<Self> {
        XorFilterBuilder::default().build_xor16(keys)
    }

    /// Returns `true` if `key` may be in the set. There are no false negatives.
    #[inline]
    pub fn may_contain(&self, key: u64) -> bool {
        self.core.may_contain(key)
    }

    /// Answers a batch of queries. The result for each key equals [`Xor16::may_contain`].
    pub fn may_contain_batch(&self, keys: &[u64]) -> Vec<bool> {
        self.core.may_contain_batch(keys)
    }

    /// Returns the slot table.
    pub fn fingerprints(&self) -> &[u16] {
        &self.core.slots
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.core.slot_count()
    }

    /// Always `false`: even a filter of no keys has three slots.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the hash index the filter was built with.
    pub fn hash_index(&self) -> u64 {
        self.core.hash_index
    }
}

impl Filter for Xor16 {
    fn may_contain(&self, key: u64) -> bool {
        self.core.may_contain(key)
    }

    fn bit_count(&self) -> usize {
        self.core.bit_count()
    }
}

#[cfg(test)]
mod tests {
    use super::{Xor16, Xor8};
    use crate::hash::tests::{disjoint_keys, random_keys};
    use crate::xor::XorFilter;
    use crate::Filter;

    #[test]
    fn test_xor8() {
        let keys: Vec<u64> = (1..=10_000).collect();
        let filter = Xor8::new(&keys).unwrap();

        assert!(keys.iter().all(|key| filter.may_contain(*key)));
        assert_eq!(filter.len(), 3 * 4101);
        assert_eq!(filter.bit_count(), 8 * 3 * 4101);
        assert!(!filter.is_empty());

        let probes = disjoint_keys(30, 100_000, &keys);
        let hits = probes.iter().filter(|key| filter.may_contain(**key)).count();
        assert!(hits < 3 * 100_000 / 256, "hits {}", hits);
    }

    #[test]
    fn test_xor16() {
        let keys = random_keys(31, 10_000);
        let filter = Xor16::new(&keys).unwrap();

        assert!(keys.iter().all(|key| filter.may_contain(*key)));
        assert_eq!(filter.fingerprints().len(), filter.len());

        let probes = disjoint_keys(32, 100_000, &keys);
        let hits = filter.may_contain_batch(&probes).into_iter().filter(|hit| *hit).count();
        assert!(hits < 10, "hits {}", hits);
    }

    #[test]
    fn test_matches_packed_filter() {
        // Same hash index and geometry give bit-identical tables.
        let keys = random_keys(33, 3_000);
        let xor8 = Xor8::new(&keys).unwrap();
        let packed = XorFilter::new(&keys, 8).unwrap();
        assert_eq!(xor8.hash_index(), packed.hash_index());
        for (index, value) in xor8.fingerprints().iter().enumerate() {
            assert_eq!(u64::from(*value), packed.slot(index));
        }

        let xor16 = Xor16::new(&keys).unwrap();
        let packed = XorFilter::new(&keys, 16).unwrap();
        for (index, value) in xor16.fingerprints().iter().enumerate() {
            assert_eq!(u64::from(*value), packed.slot(index));
        }
    }

    #[test]
    fn test_empty() {
        let filter = Xor8::new(&[]).unwrap();
        assert_eq!(filter.fingerprints(), &[0, 0, 0]);
        // Every fingerprint that happens to be zero is a false positive.
        let hits = (0..10_000u64).filter(|key| filter.may_contain(*key)).count();
        assert!(hits < 100);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_ser_de() {
        let keys = random_keys(34, 1_000);
        let filter = Xor16::new(&keys).unwrap();

        let serialized_filter = bincode::serialize(&filter).unwrap();
        let de_filter: Xor16 = bincode::deserialize(&serialized_filter).unwrap();

        assert_eq!(filter, de_filter);
    }
}
