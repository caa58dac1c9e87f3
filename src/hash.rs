//! Hash mixing and range reduction shared by every filter.
//!
//! All filters operate on 64-bit keys. A key is avalanched with [`mix64`] (optionally salted with
//! a per-filter hash index), and indices are carved out of distinct 32-bit windows of the mixed
//! hash with [`reduce`], so one hash evaluation yields every index a query needs.

use rand::Rng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use siphasher::sip::SipHasher;
use std::hash::{BuildHasher, Hash, Hasher};
use std::{cmp, fmt};

const MIX_C1: u64 = 0xbf58_476d_1ce4_e5b9;
const MIX_C2: u64 = 0x94d0_49bb_1331_11eb;
const SALT_MULTIPLIER: u64 = 0x9e37_79b9_7f4a_7c15;

/// Three-round xor-shift-multiply finalizer with full avalanche.
///
/// # Examples
///
/// ```
/// use amq_filters::hash::mix64;
///
/// assert_eq!(mix64(0), 0);
/// assert_ne!(mix64(1), mix64(2));
/// ```
#[inline]
pub fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(MIX_C1);
    x = (x ^ (x >> 27)).wrapping_mul(MIX_C2);
    x ^ (x >> 31)
}

/// Hashes `key` under the salt derived from `hash_index`.
///
/// Hash index 0 is the unsalted hash. Successive hash indices are spread over the whole 64-bit
/// space so that retrying with `hash_index + 1` does not just shift sequential keys by one.
#[inline]
pub fn hash64(key: u64, hash_index: u64) -> u64 {
    mix64(key.wrapping_add(hash_index.wrapping_mul(SALT_MULTIPLIER)))
}

/// Maps `hash` uniformly onto `0..n` with a multiply and a shift instead of a modulo.
///
/// # Examples
///
/// ```
/// use amq_filters::hash::reduce;
///
/// assert_eq!(reduce(0, 10), 0);
/// assert_eq!(reduce(u32::max_value(), 10), 9);
/// ```
#[inline]
pub fn reduce(hash: u32, n: usize) -> usize {
    ((u64::from(hash) * n as u64) >> 32) as usize
}

/// Hashes an arbitrary item to a 64-bit key with the given hash builder.
///
/// Filters only accept `u64` keys; this is the bridge for everything else.
///
/// # Examples
///
/// ```
/// use amq_filters::hash::{hash_item, SipHasherBuilder};
///
/// let hash_builder = SipHasherBuilder::from_seed(0, 0);
/// assert_eq!(hash_item(&hash_builder, "foo"), hash_item(&hash_builder, "foo"));
/// ```
pub fn hash_item<T>(hash_builder: &impl BuildHasher, item: &T) -> u64
where
    T: Hash + ?Sized,
{
    let mut hasher = hash_builder.build_hasher();
    item.hash(&mut hasher);
    hasher.finish()
}

/// A keyed SipHash builder used to derive keys from arbitrary items.
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy)]
pub struct SipHasherBuilder {
    k0: u64,
    k1: u64,
    hasher: SipHasher,
}

impl SipHasherBuilder {
    /// Constructs a new `SipHasherBuilder` that uses the thread-local RNG to seed itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use amq_filters::hash::SipHasherBuilder;
    ///
    /// let hash_builder = SipHasherBuilder::from_entropy();
    /// ```
    pub fn from_entropy() -> Self {
        let mut rng = rand::thread_rng();
        Self::from_seed(rng.gen(), rng.gen())
    }

    /// Constructs a new `SipHasherBuilder` that is seeded with the given keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use amq_filters::hash::SipHasherBuilder;
    ///
    /// let hash_builder = SipHasherBuilder::from_seed(0, 0);
    /// ```
    pub fn from_seed(k0: u64, k1: u64) -> Self {
        SipHasherBuilder {
            k0,
            k1,
            hasher: SipHasher::new_with_keys(k0, k1),
        }
    }
}

impl fmt::Debug for SipHasherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipHasherBuilder")
            .field("k0", &self.k0)
            .field("k1", &self.k1)
            .finish()
    }
}

impl cmp::PartialEq for SipHasherBuilder {
    fn eq(&self, other: &SipHasherBuilder) -> bool {
        self.k0 == other.k0 && self.k1 == other.k1
    }
}

impl BuildHasher for SipHasherBuilder {
    type Hasher = SipHasher;

    #[inline]
    fn build_hasher(&self) -> SipHasher {
        self.hasher
    }
}
