//! Registry of every filter variant by name.

use crate::bloom::BloomFilter;
use crate::cuckoo::{Cuckoo16x4, Cuckoo8x4, CuckooFilter};
use crate::error::{Error, Result};
use crate::xor::{Xor16, Xor8, XorFilter};
use crate::Filter;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of filter variants that can be constructed by name.
///
/// # Examples
///
/// ```
/// use amq_filters::catalog::FilterType;
///
/// let keys: Vec<u64> = (0..1_000).collect();
/// for filter_type in FilterType::ALL.iter() {
///     let filter = filter_type.construct(&keys, 10).unwrap();
///     assert!(filter.may_contain(7), "{}", filter_type);
/// }
///
/// let filter_type: FilterType = "CUCKOO16_4".parse().unwrap();
/// assert_eq!(filter_type, FilterType::Cuckoo16x4);
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub enum FilterType {
    /// [`Xor8`]; the setting is ignored.
    Xor8,
    /// [`Xor16`]; the setting is ignored.
    Xor16,
    /// [`XorFilter`]; the setting is the fingerprint width.
    Xor,
    /// [`BloomFilter`]; the setting is the number of bits per key.
    Bloom,
    /// [`CuckooFilter`] with 4 entries per bucket; the setting is the fingerprint width.
    Cuckoo,
    /// [`Cuckoo8x4`]; the setting is ignored.
    Cuckoo8x4,
    /// [`Cuckoo16x4`]; the setting is ignored.
    Cuckoo16x4,
}

impl FilterType {
    /// Every variant, in registry order.
    pub const ALL: [FilterType; 7] = [
        FilterType::Xor8,
        FilterType::Xor16,
        FilterType::Xor,
        FilterType::Bloom,
        FilterType::Cuckoo,
        FilterType::Cuckoo8x4,
        FilterType::Cuckoo16x4,
    ];

    /// Returns the registry name.
    pub fn name(self) -> &'static str {
        match self {
            FilterType::Xor8 => "XOR8",
            FilterType::Xor16 => "XOR16",
            FilterType::Xor => "XOR",
            FilterType::Bloom => "BLOOM",
            FilterType::Cuckoo => "CUCKOO",
            FilterType::Cuckoo8x4 => "CUCKOO8_4",
            FilterType::Cuckoo16x4 => "CUCKOO16_4",
        }
    }

    /// Builds a filter of this type from distinct `keys`.
    ///
    /// # Errors
    ///
    /// Forwards the construction error of the chosen filter, including
    /// [`Error::InvalidArgument`] for a setting the filter cannot use or, from the xor filters,
    /// for duplicate keys.
    pub fn construct(self, keys: &[u64], setting: usize) -> Result<Box<dyn Filter>> {
        Ok(match self {
            FilterType::Xor8 => Box::new(Xor8::new(keys)?),
            FilterType::Xor16 => Box::new(Xor16::new(keys)?),
            FilterType::Xor => Box::new(XorFilter::new(keys, setting)?),
            FilterType::Bloom => Box::new(BloomFilter::new(keys, setting)?),
            FilterType::Cuckoo => Box::new(CuckooFilter::new(keys, setting)?),
            FilterType::Cuckoo8x4 => Box::new(Cuckoo8x4::new(keys)?),
            FilterType::Cuckoo16x4 => Box::new(Cuckoo16x4::new(keys)?),
        })
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterType {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        FilterType::ALL
            .iter()
            .copied()
            .find(|filter_type| filter_type.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown filter type {:?}", name)))
    }
}
