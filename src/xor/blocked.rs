use crate::error::{Error, Result};
use crate::hash::{hash64, reduce};
use crate::xor::builder::{assign, check_distinct, peel, Peeling};
use crate::xor::core::SlotTable;
use crate::xor::probe::{detect_cache_line_offset, ProbeConfig, CACHE_LINE_SIZE};
use crate::xor::{fingerprint, slot_indices};
use crate::Filter;
use log::{debug, warn};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use std::sync::atomic::AtomicU8;

/// Fingerprint slots per block. The first byte of a block holds its hash index.
const BLOCK_SLOTS: usize = CACHE_LINE_SIZE - 1;
const BLOCK_SLOT_LENGTH: usize = BLOCK_SLOTS / 3;
/// Most keys a block may hold; 63 slots peel reliably up to about this load.
const MAX_BLOCK_KEYS: usize = 50;
const INITIAL_KEYS_PER_BLOCK: usize = 64;
const BLOCK_HASH_INDICES: u64 = 256;

/// Placement of the first block relative to the start of the allocation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub enum Alignment {
    /// Start the first block at this byte offset (taken modulo 64).
    Fixed(usize),
    /// Align blocks to the allocation address.
    Address,
    /// Locate cache lines with the timing probe, falling back to offset 0 if it finds no signal.
    Probe(ProbeConfig),
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::Fixed(0)
    }
}

#[inline]
fn block_of(hash: u64, block_count: usize) -> usize {
    reduce((hash >> 32) as u32, block_count)
}

/// Splits the hashes of `keys` into blocks, shrinking the keys per block until no block is
/// overloaded. Returns the hashes grouped by block.
fn partition(keys: &[u64], seed: u64) -> Result<Vec<Vec<u64>>> {
    let hashes: Vec<u64> = keys.iter().map(|key| hash64(*key, seed)).collect();
    let mut max_load = (0, 0);
    for keys_per_block in (1..=INITIAL_KEYS_PER_BLOCK).rev() {
        let block_count = std::cmp::max(1, (keys.len() + keys_per_block - 1) / keys_per_block);
        let mut loads = vec![0usize; block_count];
        for hash in &hashes {
            loads[block_of(*hash, block_count)] += 1;
        }
        max_load = loads
            .iter()
            .enumerate()
            .map(|(block, load)| (block, *load))
            .max_by_key(|(_, load)| *load)
            .unwrap_or((0, 0));
        if max_load.1 <= MAX_BLOCK_KEYS {
            let mut blocks: Vec<Vec<u64>> =
                loads.iter().map(|load| Vec::with_capacity(*load)).collect();
            for hash in hashes {
                blocks[block_of(hash, block_count)].push(hash);
            }
            return Ok(blocks);
        }
        debug!(
            "{} keys per block overloads block {} with {} keys; shrinking",
            keys_per_block, max_load.0, max_load.1,
        );
    }
    Err(Error::DegenerateSlot {
        slot: max_load.0,
        degree: max_load.1,
    })
}

/// Builds one block: its hash index followed by 63 slots. Returns `None` if no hash index peels.
fn build_block(hashes: &[u64]) -> Result<Option<[u8; CACHE_LINE_SIZE]>> {
    for hash_index in 0..BLOCK_HASH_INDICES {
        if let Peeling::Complete(order) = peel(hashes, BLOCK_SLOT_LENGTH, hash_index)? {
            let mut slots = <Vec<u8> as SlotTable>::with_slots(BLOCK_SLOTS, 8);
            assign(&mut slots, &order, BLOCK_SLOT_LENGTH, hash_index, 8);
            let mut block = [0u8; CACHE_LINE_SIZE];
            block[0] = hash_index as u8;
            block[1..].copy_from_slice(&slots);
            return Ok(Some(block));
        }
    }
    Ok(None)
}

/// Allocates `len` zeroed bytes and finds the cache line offset with the timing probe.
fn probed_layout(len: usize, config: &ProbeConfig) -> (Vec<u8>, usize) {
    let buffer: Vec<AtomicU8> = (0..std::cmp::max(len, CACHE_LINE_SIZE + 8))
        .map(|_| AtomicU8::new(0))
        .collect();
    let probed_address = buffer.as_ptr() as usize;
    let offset = detect_cache_line_offset(&buffer, config);

    // Usually collected in place; the offset is rebased if the bytes moved.
    let mut data: Vec<u8> = buffer.into_iter().map(|_| 0).collect();
    data.truncate(len);
    match offset {
        Some(offset) => {
            let address = data.as_ptr() as usize;
            let offset = (offset + probed_address % CACHE_LINE_SIZE + CACHE_LINE_SIZE
                - address % CACHE_LINE_SIZE)
                % CACHE_LINE_SIZE;
            (data, offset)
        }
        None => {
            warn!("cache line probe found no clean signal; assuming offset 0");
            (data, 0)
        }
    }
}

/// Builder for [`BlockedXor8`] filters.
///
/// # Examples
///
/// ```
/// use amq_filters::xor::{Alignment, BlockedXor8Builder};
///
/// let keys: Vec<u64> = (0..10_000).collect();
/// let filter = BlockedXor8Builder::default()
///     .alignment(Alignment::Address)
///     .seed(3)
///     .build(&keys)
///     .unwrap();
///
/// assert!(keys.iter().all(|key| filter.may_contain(*key)));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct BlockedXor8Builder {
    alignment: Alignment,
    seed: u64,
}

impl BlockedXor8Builder {
    /// Sets how blocks are placed relative to cache lines. Defaults to `Alignment::Fixed(0)`.
    pub fn alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Sets the seed of the hash that assigns keys to blocks.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builds a filter from distinct `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `keys` holds a duplicate, and
    /// [`Error::DegenerateSlot`] if keys cannot be spread so that every block holds at most 50 of
    /// them, which only happens for degenerate input.
    pub fn build(&self, keys: &[u64]) -> Result<BlockedXor8> {
        let mut seed = self.seed;
        let blocks = 'partitioning: loop {
            let partition = partition(keys, seed)?;
            let mut blocks = Vec::with_capacity(partition.len());
            for (block, hashes) in partition.iter().enumerate() {
                match build_block(hashes)? {
                    Some(built) => blocks.push(built),
                    None => {
                        // A block holding a duplicate key never peels.
                        if seed == self.seed {
                            check_distinct(keys)?;
                        }
                        debug!(
                            "block {} with {} keys did not peel under seed {}; repartitioning",
                            block,
                            hashes.len(),
                            seed,
                        );
                        seed = seed.wrapping_add(1);
                        continue 'partitioning;
                    }
                }
            }
            break blocks;
        };

        let len = blocks.len() * CACHE_LINE_SIZE + CACHE_LINE_SIZE - 1;
        let (mut data, offset) = match &self.alignment {
            Alignment::Fixed(offset) => (vec![0; len], offset % CACHE_LINE_SIZE),
            Alignment::Address => {
                let data = vec![0; len];
                let offset = data.as_ptr().align_offset(CACHE_LINE_SIZE);
                (data, if offset < CACHE_LINE_SIZE { offset } else { 0 })
            }
            Alignment::Probe(config) => probed_layout(len, config),
        };
        debug!(
            "blocked xor8 filter: {} blocks for {} keys at offset {}",
            blocks.len(),
            keys.len(),
            offset,
        );
        for (index, block) in blocks.iter().enumerate() {
            let start = offset + index * CACHE_LINE_SIZE;
            data[start..start + CACHE_LINE_SIZE].copy_from_slice(block);
        }

        Ok(BlockedXor8 {
            data,
            offset,
            block_count: blocks.len(),
            seed,
        })
    }
}

/// An 8-bit xor filter split into independent 64-byte blocks.
///
/// Every key is routed to one block, and each block is a tiny xor filter with its own hash index
/// in its first byte and 63 one-byte slots. When blocks line up with cache lines a query touches
/// a single line.
///
/// # Examples
///
/// ```
/// use amq_filters::xor::BlockedXor8;
/// use amq_filters::Filter;
///
/// let keys: Vec<u64> = (0..10_000).collect();
/// let filter = BlockedXor8::new(&keys).unwrap();
///
/// assert!(filter.may_contain(1_234));
/// assert_eq!(filter.bit_count(), filter.block_count() * 512);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct BlockedXor8 {
    data: Vec<u8>,
    offset: usize,
    block_count: usize,
    seed: u64,
}

impl BlockedXor8 {
    /// Builds a filter from distinct `keys` with the default builder.
    ///
    /// # Errors
    ///
    /// See [`BlockedXor8Builder::build`].
    pub fn new(keys: &[u64]) -> Result<Self> {
        Self::builder().build(keys)
    }

    /// Creates a builder.
    pub fn builder() -> BlockedXor8Builder {
        BlockedXor8Builder::default()
    }

    /// Returns `true` if `key` may be in the set. There are no false negatives.
    #[inline]
    pub fn may_contain(&self, key: u64) -> bool {
        let hash = hash64(key, self.seed);
        let start = self.offset + block_of(hash, self.block_count) * CACHE_LINE_SIZE;
        let block = &self.data[start..start + CACHE_LINE_SIZE];
        let hash = hash64(hash, u64::from(block[0]));
        let [h0, h1, h2] = slot_indices(hash, BLOCK_SLOT_LENGTH);
        let slots = &block[1..];
        (fingerprint(hash, 0xFF) as u8 ^ slots[h0] ^ slots[h1] ^ slots[h2]) == 0
    }

    /// Returns the number of 64-byte blocks.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Returns the byte offset of the first block in the allocation.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the seed keys were assigned to blocks with. It is the builder's seed unless a
    /// block forced a repartition.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Filter for BlockedXor8 {
    fn may_contain(&self, key: u64) -> bool {
        BlockedXor8::may_contain(self, key)
    }

    fn bit_count(&self) -> usize {
        self.block_count * CACHE_LINE_SIZE * 8
    }
}
