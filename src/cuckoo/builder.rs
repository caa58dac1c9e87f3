use crate::cuckoo::{
    bucket_count_for, insert_all, Cuckoo16x4, Cuckoo8x4, CuckooFilter, DEFAULT_ENTRIES_PER_BUCKET,
    DEFAULT_FINGERPRINT_BITS, DEFAULT_LOAD_FACTOR, DEFAULT_MAX_KICKS, DEFAULT_MAX_KICKS_PACKED,
};
use crate::error::{Error, Result};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Largest fingerprint width of the bit-packed filter. Wider fingerprints would overlap the
/// hash bits that pick the bucket.
const MAX_FINGERPRINT_BITS: usize = 32;

/// Builder for cuckoo filters.
///
/// Evictions pick entries with an `XorShiftRng`. Without a [`seed`](CuckooFilterBuilder::seed)
/// it is seeded from entropy, so two builds from the same keys may lay out entries differently.
///
/// # Examples
///
/// ```
/// use amq_filters::cuckoo::CuckooFilterBuilder;
///
/// let keys: Vec<u64> = (0..10_000).collect();
/// let filter = CuckooFilterBuilder::default()
///     .fingerprint_bits(12)
///     .entries_per_bucket(4)
///     .seed(0)
///     .build(&keys)
///     .unwrap();
///
/// assert!(keys.iter().all(|key| filter.may_contain(*key)));
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct CuckooFilterBuilder {
    fingerprint_bits: usize,
    entries_per_bucket: usize,
    load_factor: f64,
    max_kicks: Option<usize>,
    seed: Option<u64>,
}

impl Default for CuckooFilterBuilder {
    fn default() -> Self {
        CuckooFilterBuilder {
            fingerprint_bits: DEFAULT_FINGERPRINT_BITS,
            entries_per_bucket: DEFAULT_ENTRIES_PER_BUCKET,
            load_factor: DEFAULT_LOAD_FACTOR,
            max_kicks: None,
            seed: None,
        }
    }
}

impl CuckooFilterBuilder {
    /// Sets the fingerprint width of [`CuckooFilter`]s. Ignored by the fixed-width filters.
    pub fn fingerprint_bits(mut self, fingerprint_bits: usize) -> Self {
        self.fingerprint_bits = fingerprint_bits;
        self
    }

    /// Sets the number of entries per bucket of [`CuckooFilter`]s. Ignored by the fixed-width
    /// filters, which always have 4.
    pub fn entries_per_bucket(mut self, entries_per_bucket: usize) -> Self {
        self.entries_per_bucket = entries_per_bucket;
        self
    }

    /// Sets the fraction of entries expected to be occupied, which sizes the table. Small tables
    /// get about `sqrt` as many spare buckets on top.
    pub fn load_factor(mut self, load_factor: f64) -> Self {
        self.load_factor = load_factor;
        self
    }

    /// Sets the number of evictions a single insertion may perform. Defaults to 10000 for
    /// [`CuckooFilter`] and 1000 for the fixed-width filters.
    pub fn max_kicks(mut self, max_kicks: usize) -> Self {
        self.max_kicks = Some(max_kicks);
        self
    }

    /// Seeds the eviction RNG.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self) -> XorShiftRng {
        match self.seed {
            Some(seed) => XorShiftRng::seed_from_u64(seed),
            None => XorShiftRng::from_entropy(),
        }
    }

    fn check_load_factor(&self) -> Result<()> {
        if self.load_factor > 0.0 && self.load_factor <= 1.0 {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "load factor must be in (0, 1], got {}",
                self.load_factor
            )))
        }
    }

    /// Builds a bit-packed [`CuckooFilter`] from `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the fingerprint width is not in `1..=32`, there are
    /// no entries per bucket or the load factor is not in `(0, 1]`, and
    /// [`Error::EvictionLimitExceeded`] if a key could not be placed.
    pub fn build(&self, keys: &[u64]) -> Result<CuckooFilter> {
        if self.fingerprint_bits == 0 || self.fingerprint_bits > MAX_FINGERPRINT_BITS {
            return Err(Error::InvalidArgument(format!(
                "fingerprint width must be between 1 and {}, got {}",
                MAX_FINGERPRINT_BITS, self.fingerprint_bits
            )));
        }
        if self.entries_per_bucket == 0 {
            return Err(Error::InvalidArgument(
                "a bucket needs at least one entry".to_string(),
            ));
        }
        self.check_load_factor()?;

        let bucket_count = bucket_count_for(keys.len(), self.entries_per_bucket, self.load_factor);
        let mut filter =
            CuckooFilter::with_buckets(bucket_count, self.entries_per_bucket, self.fingerprint_bits);
        insert_all(
            &mut filter,
            keys,
            self.fingerprint_bits,
            self.max_kicks.unwrap_or(DEFAULT_MAX_KICKS_PACKED),
            &mut self.rng(),
        )?;
        Ok(filter)
    }

    /// Builds a [`Cuckoo8x4`] filter from `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a load factor outside `(0, 1]` and
    /// [`Error::EvictionLimitExceeded`] if a key could not be placed.
    pub fn build_8x4(&self, keys: &[u64]) -> Result<Cuckoo8x4> {
        self.check_load_factor()?;
        let mut filter = Cuckoo8x4::with_buckets(bucket_count_for(keys.len(), 4, self.load_factor));
        insert_all(
            &mut filter,
            keys,
            8,
            self.max_kicks.unwrap_or(DEFAULT_MAX_KICKS),
            &mut self.rng(),
        )?;
        Ok(filter)
    }

    /// Builds a [`Cuckoo16x4`] filter from `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a load factor outside `(0, 1]` and
    /// [`Error::EvictionLimitExceeded`] if a key could not be placed.
    pub fn build_16x4(&self, keys: &[u64]) -> Result<Cuckoo16x4> {
        self.check_load_factor()?;
        let mut filter =
            Cuckoo16x4::with_buckets(bucket_count_for(keys.len(), 4, self.load_factor));
        insert_all(
            &mut filter,
            keys,
            16,
            self.max_kicks.unwrap_or(DEFAULT_MAX_KICKS),
            &mut self.rng(),
        )?;
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::CuckooFilterBuilder;
    use crate::error::Error;
    use crate::hash::tests::random_keys;

    #[test]
    fn test_invalid_arguments() {
        let keys: Vec<u64> = (0..10).collect();
        for builder in &[
            CuckooFilterBuilder::default().fingerprint_bits(0),
            CuckooFilterBuilder::default().fingerprint_bits(33),
            CuckooFilterBuilder::default().entries_per_bucket(0),
            CuckooFilterBuilder::default().load_factor(0.0),
            CuckooFilterBuilder::default().load_factor(1.5),
        ] {
            assert!(matches!(builder.build(&keys), Err(Error::InvalidArgument(_))));
        }
        assert!(matches!(
            CuckooFilterBuilder::default().load_factor(-1.0).build_8x4(&keys),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_eviction_limit_exceeded() {
        // Single-entry buckets cannot get anywhere near full.
        let keys = random_keys(60, 1_000);
        let result = CuckooFilterBuilder::default()
            .entries_per_bucket(1)
            .load_factor(1.0)
            .max_kicks(10)
            .seed(0)
            .build(&keys);
        assert_eq!(result.unwrap_err(), Error::EvictionLimitExceeded(10));
    }

    #[test]
    fn test_overloaded_fixed_filters_fail() {
        let keys = random_keys(61, 1_000);
        let builder = CuckooFilterBuilder::default().load_factor(1.0).max_kicks(0).seed(1);
        // Near full occupancy without evictions some key finds both buckets full.
        assert!(matches!(builder.build_8x4(&keys), Err(Error::EvictionLimitExceeded(0))));
        assert!(matches!(builder.build_16x4(&keys), Err(Error::EvictionLimitExceeded(0))));
    }

    #[test]
    fn test_seeded_builds_are_deterministic() {
        let keys = random_keys(62, 5_000);
        let builder = CuckooFilterBuilder::default().fingerprint_bits(10).seed(7);
        assert_eq!(builder.build(&keys).unwrap(), builder.build(&keys).unwrap());
        assert_eq!(builder.build_8x4(&keys).unwrap(), builder.build_8x4(&keys).unwrap());
    }
}
