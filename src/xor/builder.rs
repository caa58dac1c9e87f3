use crate::error::{Error, Result};
use crate::hash::hash64;
use crate::xor::core::{SlotTable, XorCore};
use crate::xor::{
    block_length_for, fingerprint, fingerprint_mask, slot_indices, Xor16, Xor8, XorFilter,
    MAX_DEGREE, MAX_FINGERPRINT_BITS,
};
use log::debug;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

const DEFAULT_FINGERPRINT_BITS: usize = 8;

/// A key together with the slot it was peeled from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PeeledKey {
    pub(crate) key: u64,
    pub(crate) slot: usize,
}

/// Outcome of one peeling attempt.
pub(crate) enum Peeling {
    /// Every key was peeled. Keys are in peeling order; assignment walks them in reverse.
    Complete(Vec<PeeledKey>),
    /// A core with no degree-one slot remained after `peeled` keys.
    Stalled { peeled: usize },
}

/// Peels the hypergraph of `keys` under `hash_index`.
///
/// Each slot tracks its degree and the xor of the keys mapped to it, so a slot of degree one
/// yields its only key directly. `keys` are treated as opaque 64-bit values; they are hashed
/// with `hash64(key, hash_index)`.
///
/// # Errors
///
/// Returns [`Error::DegenerateSlot`] as soon as any slot exceeds `MAX_DEGREE` keys.
pub(crate) fn peel(keys: &[u64], block_length: usize, hash_index: u64) -> Result<Peeling> {
    let slot_count = 3 * block_length;
    let mut degrees = vec![0u8; slot_count];
    let mut xor_keys = vec![0u64; slot_count];

    for &key in keys {
        for slot in slot_indices(hash64(key, hash_index), block_length).iter() {
            let degree = &mut degrees[*slot];
            *degree += 1;
            if usize::from(*degree) > MAX_DEGREE {
                return Err(Error::DegenerateSlot {
                    slot: *slot,
                    degree: usize::from(*degree),
                });
            }
            xor_keys[*slot] ^= key;
        }
    }

    let mut alone: Vec<usize> = (0..slot_count).filter(|slot| degrees[*slot] == 1).collect();
    let mut order = Vec::with_capacity(keys.len());
    while let Some(slot) = alone.pop() {
        if degrees[slot] != 1 {
            continue;
        }
        let key = xor_keys[slot];
        order.push(PeeledKey { key, slot });
        for other in slot_indices(hash64(key, hash_index), block_length).iter() {
            degrees[*other] -= 1;
            xor_keys[*other] ^= key;
            if degrees[*other] == 1 {
                alone.push(*other);
            }
        }
    }

    if order.len() == keys.len() {
        Ok(Peeling::Complete(order))
    } else {
        Ok(Peeling::Stalled {
            peeled: order.len(),
        })
    }
}

/// Assigns slot values in reverse peeling order.
///
/// When a key is assigned, the slot it was peeled from is still zero and no key assigned later
/// touches it, so `fingerprint(key) == slot[h0] ^ slot[h1] ^ slot[h2]` holds for every key.
pub(crate) fn assign<S: SlotTable>(
    slots: &mut S,
    order: &[PeeledKey],
    block_length: usize,
    hash_index: u64,
    fingerprint_bits: usize,
) {
    let mask = fingerprint_mask(fingerprint_bits);
    for peeled in order.iter().rev() {
        let hash = hash64(peeled.key, hash_index);
        let [h0, h1, h2] = slot_indices(hash, block_length);
        let value = fingerprint(hash, mask) ^ slots.slot(h0) ^ slots.slot(h1) ^ slots.slot(h2);
        slots.assign(peeled.slot, value);
    }
}

/// Builder for xor filters.
///
/// Construction retries with the next hash index whenever peeling stalls. Retries are unbounded
/// unless [`XorFilterBuilder::max_attempts`] is set; the expected number of attempts is barely
/// above one.
///
/// # Examples
///
/// ```
/// use amq_filters::xor::XorFilterBuilder;
///
/// let keys: Vec<u64> = (0..10_000).collect();
/// let filter = XorFilterBuilder::default()
///     .fingerprint_bits(10)
///     .hash_index(7)
///     .build(&keys)
///     .unwrap();
///
/// assert!(filter.may_contain(9_999));
/// assert!(filter.hash_index() >= 7);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct XorFilterBuilder {
    fingerprint_bits: usize,
    hash_index: u64,
    max_attempts: Option<u32>,
}

impl Default for XorFilterBuilder {
    fn default() -> Self {
        XorFilterBuilder {
            fingerprint_bits: DEFAULT_FINGERPRINT_BITS,
            hash_index: 0,
            max_attempts: None,
        }
    }
}

impl XorFilterBuilder {
    /// Sets the fingerprint width of [`XorFilter`]s built by [`XorFilterBuilder::build`]. The
    /// false positive probability is about `2^-fingerprint_bits`.
    pub fn fingerprint_bits(mut self, fingerprint_bits: usize) -> Self {
        self.fingerprint_bits = fingerprint_bits;
        self
    }

    /// Sets the hash index of the first construction attempt.
    pub fn hash_index(mut self, hash_index: u64) -> Self {
        self.hash_index = hash_index;
        self
    }

    /// Bounds the number of construction attempts.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is 0.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        assert!(max_attempts > 0, "max_attempts must be at least 1");
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Builds a bit-packed [`XorFilter`] with the configured fingerprint width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the fingerprint width is not in `1..=32` or `keys`
    /// holds a duplicate, [`Error::DegenerateSlot`] for a degenerate key set and
    /// [`Error::AttemptsExhausted`] if a bound on the attempts was set and reached.
    pub fn build(&self, keys: &[u64]) -> Result<XorFilter> {
        if self.fingerprint_bits == 0 || self.fingerprint_bits > MAX_FINGERPRINT_BITS {
            return Err(Error::InvalidArgument(format!(
                "fingerprint width must be between 1 and {}, got {}",
                MAX_FINGERPRINT_BITS, self.fingerprint_bits
            )));
        }
        Ok(XorFilter {
            core: self.build_core(keys, self.fingerprint_bits)?,
        })
    }

    /// Builds an [`Xor8`] filter. The configured fingerprint width is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `keys` holds a duplicate, and otherwise fails like
    /// [`XorFilterBuilder::build`].
    pub fn build_xor8(&self, keys: &[u64]) -> Result<Xor8> {
        Ok(Xor8 {
            core: self.build_core(keys, 8)?,
        })
    }

    /// Builds an [`Xor16`] filter. The configured fingerprint width is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `keys` holds a duplicate, and otherwise fails like
    /// [`XorFilterBuilder::build`].
    pub fn build_xor16(&self, keys: &[u64]) -> Result<Xor16> {
        Ok(Xor16 {
            core: self.build_core(keys, 16)?,
        })
    }

    pub(crate) fn build_core<S: SlotTable>(
        &self,
        keys: &[u64],
        fingerprint_bits: usize,
    ) -> Result<XorCore<S>> {
        let block_length = block_length_for(keys.len());
        let mut hash_index = self.hash_index;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match peel(keys, block_length, hash_index)? {
                Peeling::Complete(order) => {
                    let mut slots = S::with_slots(3 * block_length, fingerprint_bits);
                    assign(&mut slots, &order, block_length, hash_index, fingerprint_bits);
                    return Ok(XorCore {
                        hash_index,
                        block_length,
                        fingerprint_bits,
                        slots,
                    });
                }
                Peeling::Stalled { peeled } => {
                    // A duplicate key never peels, so duplicates are ruled out once.
                    if attempts == 1 {
                        check_distinct(keys)?;
                    }
                    if self.max_attempts.map_or(false, |max| attempts >= max) {
                        return Err(Error::AttemptsExhausted(attempts));
                    }
                    debug!(
                        "xor peeling stalled after {} of {} keys with hash index {}; retrying",
                        peeled,
                        keys.len(),
                        hash_index,
                    );
                    hash_index = hash_index.wrapping_add(1);
                }
            }
        }
    }
}

/// Returns [`Error::InvalidArgument`] naming the first duplicate in `keys`, if any.
pub(crate) fn check_distinct(keys: &[u64]) -> Result<()> {
    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    match sorted.windows(2).find(|pair| pair[0] == pair[1]) {
        Some(pair) => Err(Error::InvalidArgument(format!(
            "xor filter requires distinct keys, found {} twice",
            pair[0]
        ))),
        None => Ok(()),
    }
}
