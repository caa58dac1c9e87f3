use crate::bit_store::BitStore;
use crate::error::Result;
use crate::xor::core::{SlotTable, XorCore};
use crate::xor::XorFilterBuilder;
use crate::Filter;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Slots of a fixed bit width packed back to back in a [`BitStore`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub(crate) struct PackedSlots {
    store: BitStore,
    width: usize,
}

impl PackedSlots {
    /// Reads slot `index` through the generic bit reader.
    #[inline]
    pub(crate) fn read_generic(&self, index: usize) -> u64 {
        self.store.read(index * self.width, self.width)
    }
}

impl SlotTable for PackedSlots {
    fn with_slots(slot_count: usize, fingerprint_bits: usize) -> Self {
        PackedSlots {
            store: BitStore::new(slot_count * fingerprint_bits),
            width: fingerprint_bits,
        }
    }

    /// Widths of 8, 16 and 32 bits never straddle a word and are extracted with a single shift
    /// and mask.
    #[inline]
    fn slot(&self, index: usize) -> u64 {
        let words = self.store.words();
        match self.width {
            8 => (words[index >> 3] >> ((index & 7) << 3)) & 0xFF,
            16 => (words[index >> 2] >> ((index & 3) << 4)) & 0xFFFF,
            32 => (words[index >> 1] >> ((index & 1) << 5)) & 0xFFFF_FFFF,
            _ => self.read_generic(index),
        }
    }

    fn assign(&mut self, index: usize, value: u64) {
        self.store.write(index * self.width, value, self.width);
    }
}

/// An xor filter with fingerprints of any width from 1 to 32 bits, packed without padding.
///
/// The table holds `3 + ceil(1.23 * n)` slots (rounded down to a multiple of three) of
/// `fingerprint_bits` bits, so it takes about `1.23 * fingerprint_bits` bits per key for a false
/// positive probability of about `2^-fingerprint_bits`.
///
/// # Examples
///
/// ```
/// use amq_filters::xor::XorFilter;
/// use amq_filters::Filter;
///
/// let keys: Vec<u64> = (0..1_000).collect();
/// let filter = XorFilter::new(&keys, 10).unwrap();
///
/// assert!(filter.may_contain(999));
/// assert_eq!(filter.fingerprint_bits(), 10);
/// assert_eq!(filter.bit_count(), filter.slot_count() * 10);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct XorFilter {
    pub(super) core: XorCore<PackedSlots>,
}

impl XorFilter {
    /// Creates a builder for bit-packed xor filters.
    pub fn builder() -> XorFilterBuilder {
        XorFilterBuilder::default()
    }

    /// Builds a filter from distinct `keys` with `fingerprint_bits`-bit fingerprints.
    ///
    /// # Errors
    ///
    /// See [`XorFilterBuilder::build`].
    pub fn new(keys: &[u64], fingerprint_bits: usize) -> Result<Self> {
        Self::builder().fingerprint_bits(fingerprint_bits).build(keys)
    }

    pub(super) fn from_parts(
        hash_index: u64,
        block_length: usize,
        fingerprint_bits: usize,
        slots: Vec<u64>,
    ) -> Self {
        let mut packed = PackedSlots::with_slots(3 * block_length, fingerprint_bits);
        for (index, value) in slots.into_iter().enumerate() {
            if value != 0 {
                packed.assign(index, value);
            }
        }
        XorFilter {
            core: XorCore {
                hash_index,
                block_length,
                fingerprint_bits,
                slots: packed,
            },
        }
    }

    /// Returns `true` if `key` may be in the set. There are no false negatives.
    #[inline]
    pub fn may_contain(&self, key: u64) -> bool {
        self.core.may_contain(key)
    }

    /// Answers a batch of queries. The result for each key equals [`XorFilter::may_contain`].
    ///
    /// # Examples
    ///
    /// ```
    /// use amq_filters::xor::XorFilter;
    ///
    /// let keys: Vec<u64> = (0..100).collect();
    /// let filter = XorFilter::new(&keys, 16).unwrap();
    ///
    /// assert!(filter.may_contain_batch(&keys).into_iter().all(|found| found));
    /// ```
    pub fn may_contain_batch(&self, keys: &[u64]) -> Vec<bool> {
        self.core.may_contain_batch(keys)
    }

    /// Returns the value of slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.slot_count()`.
    pub fn slot(&self, index: usize) -> u64 {
        assert!(index < self.slot_count());
        self.core.slots.slot(index)
    }

    /// Returns the number of slots.
    pub fn slot_count(&self) -> usize {
        self.core.slot_count()
    }

    /// Returns the number of slots in each of the three blocks.
    pub fn block_length(&self) -> usize {
        self.core.block_length
    }

    /// Returns the hash index the filter was built with.
    pub fn hash_index(&self) -> u64 {
        self.core.hash_index
    }

    /// Returns the fingerprint width in bits.
    pub fn fingerprint_bits(&self) -> usize {
        self.core.fingerprint_bits
    }
}

impl Filter for XorFilter {
    fn may_contain(&self, key: u64) -> bool {
        self.core.may_contain(key)
    }

    fn bit_count(&self) -> usize {
        self.core.bit_count()
    }
}

#[cfg(test)]
mod tests {
    use super::XorFilter;
    use crate::hash::hash64;
    use crate::hash::tests::{disjoint_keys, random_keys};
    use crate::xor::core::SlotTable;
    use crate::xor::{fingerprint, fingerprint_mask, slot_indices};
    use crate::Filter;

    #[test]
    fn test_no_false_negatives() {
        for bits in &[1, 4, 7, 8, 13, 16, 20, 32] {
            let keys = random_keys(*bits as u64, 3_000);
            let filter = XorFilter::new(&keys, *bits).unwrap();
            assert!(keys.iter().all(|key| filter.may_contain(*key)), "width {}", bits);
        }
    }

    #[test]
    fn test_xor_invariant() {
        let keys = random_keys(20, 5_000);
        let filter = XorFilter::new(&keys, 11).unwrap();
        let mask = fingerprint_mask(11);
        for key in &keys {
            let hash = hash64(*key, filter.hash_index());
            let [h0, h1, h2] = slot_indices(hash, filter.block_length());
            assert_eq!(
                fingerprint(hash, mask),
                filter.slot(h0) ^ filter.slot(h1) ^ filter.slot(h2),
            );
        }
    }

    #[test]
    fn test_fast_paths_match_generic_reader() {
        for bits in &[8, 16, 32] {
            let keys = random_keys(21, 2_000);
            let filter = XorFilter::new(&keys, *bits).unwrap();
            let slots = &filter.core.slots;
            for index in 0..filter.slot_count() {
                assert_eq!(slots.slot(index), slots.read_generic(index));
            }
        }
    }

    #[test]
    fn test_sizes() {
        let keys: Vec<u64> = (0..10_000).collect();
        let filter = XorFilter::new(&keys, 12).unwrap();
        assert_eq!(filter.block_length(), 4101);
        assert_eq!(filter.slot_count(), 12303);
        assert_eq!(filter.bit_count(), 12303 * 12);
        assert!(filter.bits_per_key(keys.len()) < 1.24 * 12.0);
    }

    #[test]
    fn test_false_positive_rate() {
        // Expected rate 1/256; no trial may exceed three times that, and the average stays
        // within 5%.
        let expected = 1.0 / 256.0;
        let mut total_rate = 0.0;
        let trials = 100;
        for trial in 0..trials {
            let keys = random_keys(1_000 + trial, 10_000);
            let filter = XorFilter::new(&keys, 8).unwrap();
            let probes = disjoint_keys(2_000 + trial, 100_000, &keys);
            let hits = filter.may_contain_batch(&probes).into_iter().filter(|hit| *hit).count();
            let rate = hits as f64 / probes.len() as f64;
            assert!(rate < 3.0 * expected, "trial {} rate {}", trial, rate);
            total_rate += rate;
        }
        let average = total_rate / trials as f64;
        assert!(average < 1.05 * expected, "average rate {}", average);
    }

    #[test]
    fn test_empty() {
        let filter = XorFilter::new(&[], 8).unwrap();
        assert_eq!(filter.slot_count(), 3);
        assert!((0..3).all(|index| filter.slot(index) == 0));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_ser_de() {
        let keys = random_keys(22, 1_000);
        let filter = XorFilter::new(&keys, 9).unwrap();

        let serialized_filter = bincode::serialize(&filter).unwrap();
        let de_filter: XorFilter = bincode::deserialize(&serialized_filter).unwrap();

        assert_eq!(filter, de_filter);
        assert!(keys.iter().all(|key| de_filter.may_contain(*key)));
    }
}
