//! Errors reported while constructing or decoding filters.

use thiserror::Error;

/// A specialized `Result` type for filter construction and decoding.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or decoding a filter.
///
/// Queries never fail; only construction and decoding return errors.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// A parameter such as the fingerprint width or the registry setting is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single slot of an xor filter collected far more keys than any sane hash allows. This
    /// points at a degenerate key set (e.g. massive duplication) or a broken hash function and is
    /// never retried.
    #[error("slot {slot} reached degree {degree}; the key set is degenerate or the hash is broken")]
    DegenerateSlot {
        /// Index of the offending slot.
        slot: usize,
        /// Degree the slot reached when construction was aborted.
        degree: usize,
    },

    /// A cuckoo filter insertion ran out of eviction rounds. The table is over capacity; use a
    /// lower load factor or a larger table.
    #[error("no empty entry found after {0} evictions; the cuckoo table is over capacity")]
    EvictionLimitExceeded(usize),

    /// A bounded xor filter construction failed to peel within the configured attempts.
    #[error("xor filter construction gave up after {0} attempts")]
    AttemptsExhausted(u32),

    /// The serialized input ended before the filter was fully decoded.
    #[error("serialized filter is truncated at bit {0}")]
    Truncated(usize),

    /// The serialized input is structurally invalid.
    #[error("corrupt serialized filter: {0}")]
    Corrupt(String),
}
