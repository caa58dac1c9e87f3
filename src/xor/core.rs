use crate::hash::hash64;
use crate::xor::{fingerprint, fingerprint_mask, slot_indices};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Number of keys whose slots are computed before any table value is loaded.
pub(crate) const BATCH_SIZE: usize = 32;

/// Storage for the slot values of an xor filter.
pub(crate) trait SlotTable {
    /// Allocates `slot_count` zeroed slots of `fingerprint_bits` bits each.
    fn with_slots(slot_count: usize, fingerprint_bits: usize) -> Self;

    fn slot(&self, index: usize) -> u64;

    /// Stores `value` into a slot that is still zero.
    fn assign(&mut self, index: usize, value: u64);
}

impl SlotTable for Vec<u8> {
    fn with_slots(slot_count: usize, _fingerprint_bits: usize) -> Self {
        vec![0; slot_count]
    }

    #[inline]
    fn slot(&self, index: usize) -> u64 {
        u64::from(self[index])
    }

    fn assign(&mut self, index: usize, value: u64) {
        debug_assert_eq!(self[index], 0);
        self[index] = value as u8;
    }
}

impl SlotTable for Vec<u16> {
    fn with_slots(slot_count: usize, _fingerprint_bits: usize) -> Self {
        vec![0; slot_count]
    }

    #[inline]
    fn slot(&self, index: usize) -> u64 {
        u64::from(self[index])
    }

    fn assign(&mut self, index: usize, value: u64) {
        debug_assert_eq!(self[index], 0);
        self[index] = value as u16;
    }
}

#[derive(Clone, Copy, Default)]
struct Location {
    slots: [usize; 3],
    fingerprint: u64,
}

/// Table, geometry and hash index shared by all xor filter variants.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub(crate) struct XorCore<S> {
    pub(crate) hash_index: u64,
    pub(crate) block_length: usize,
    pub(crate) fingerprint_bits: usize,
    pub(crate) slots: S,
}

impl<S: SlotTable> XorCore<S> {
    #[inline]
    fn locate(&self, key: u64) -> Location {
        let hash = hash64(key, self.hash_index);
        Location {
            slots: slot_indices(hash, self.block_length),
            fingerprint: fingerprint(hash, fingerprint_mask(self.fingerprint_bits)),
        }
    }

    #[inline]
    fn matches(&self, location: &Location) -> bool {
        let [h0, h1, h2] = location.slots;
        (location.fingerprint ^ self.slots.slot(h0) ^ self.slots.slot(h1) ^ self.slots.slot(h2))
            == 0
    }

    #[inline]
    pub(crate) fn may_contain(&self, key: u64) -> bool {
        self.matches(&self.locate(key))
    }

    /// Answers `keys` in two passes per batch: all slot indices and fingerprints first, then
    /// the table loads.
    pub(crate) fn may_contain_batch(&self, keys: &[u64]) -> Vec<bool> {
        let mut results = Vec::with_capacity(keys.len());
        let mut locations = [Location::default(); BATCH_SIZE];
        for chunk in keys.chunks(BATCH_SIZE) {
            for (location, key) in locations.iter_mut().zip(chunk) {
                *location = self.locate(*key);
            }
            results.extend(
                locations[..chunk.len()]
                    .iter()
                    .map(|location| self.matches(location)),
            );
        }
        results
    }

    #[inline]
    pub(crate) fn slot_count(&self) -> usize {
        3 * self.block_length
    }

    pub(crate) fn bit_count(&self) -> usize {
        self.slot_count() * self.fingerprint_bits
    }
}
