//! Compact serialized form of the bit-packed [`XorFilter`].
//!
//! Layout, as one bit stream:
//!
//! 1. Elias-Delta codes of `slot_count + 1`, `fingerprint_bits`, `hash_index + 1` and
//!    `nonzero_count + 1`.
//! 2. The nonzero slot values in table order, `fingerprint_bits` bits each.
//! 3. A range-coded bitmap with one zero/nonzero flag per slot, followed by the coder's bytes
//!    8 bits at a time.
//!
//! About a fifth of the slots are never assigned, and the first block holds more of them than
//! the last, so each block codes its flags with its own fixed probability of a zero slot.

use crate::bit_buffer::BitBuffer;
use crate::error::{Error, Result};
use crate::xor::{XorFilter, MAX_FINGERPRINT_BITS};

const PROBABILITY_BITS: u32 = 11;
const TOP: u32 = 1 << 24;

/// Probability of a zero slot in each block, out of `1 << PROBABILITY_BITS`.
const ZERO_PROBABILITIES: [u32; 3] = [532, 389, 225];

/// Binary range encoder with fixed probabilities.
struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u64,
    bytes: Vec<u8>,
}

impl RangeEncoder {
    fn new() -> Self {
        RangeEncoder {
            low: 0,
            range: u32::max_value(),
            cache: 0,
            cache_size: 1,
            bytes: Vec::new(),
        }
    }

    fn encode(&mut self, bit: bool, zero_probability: u32) {
        let bound = (self.range >> PROBABILITY_BITS) * zero_probability;
        if bit {
            self.low += u64::from(bound);
            self.range -= bound;
        } else {
            self.range = bound;
        }
        while self.range < TOP {
            self.range <<= 8;
            self.shift_low();
        }
    }

    /// Emits the top byte of `low`, holding back runs of `0xFF` until a carry is resolved.
    fn shift_low(&mut self) {
        if self.low < 0xFF00_0000 || self.low >> 32 != 0 {
            let carry = (self.low >> 32) as u8;
            let mut byte = self.cache;
            loop {
                self.bytes.push(byte.wrapping_add(carry));
                byte = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << 8;
    }

    fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.bytes
    }
}

/// Decoder for [`RangeEncoder`] output, pulling bytes from a [`BitBuffer`].
struct RangeDecoder<'a> {
    buffer: &'a mut BitBuffer,
    range: u32,
    code: u32,
}

impl<'a> RangeDecoder<'a> {
    fn new(buffer: &'a mut BitBuffer) -> Result<Self> {
        let position = buffer.position();
        if buffer.read_bits(8)? != 0 {
            return Err(Error::Corrupt(format!(
                "range coder stream at bit {} does not start with a zero byte",
                position
            )));
        }
        let mut code = 0;
        for _ in 0..4 {
            code = (code << 8) | buffer.read_bits(8)? as u32;
        }
        Ok(RangeDecoder {
            buffer,
            range: u32::max_value(),
            code,
        })
    }

    fn decode(&mut self, zero_probability: u32) -> Result<bool> {
        let bound = (self.range >> PROBABILITY_BITS) * zero_probability;
        let bit = if self.code < bound {
            self.range = bound;
            false
        } else {
            self.code -= bound;
            self.range -= bound;
            true
        };
        while self.range < TOP {
            self.range <<= 8;
            self.code = (self.code << 8) | self.buffer.read_bits(8)? as u32;
        }
        Ok(bit)
    }
}

fn zero_probability(index: usize, block_length: usize) -> u32 {
    ZERO_PROBABILITIES[std::cmp::min(index / block_length, 2)]
}

impl XorFilter {
    /// Serializes the filter into its compact form.
    ///
    /// Nonzero slots are stored verbatim and the positions of zero slots cost less than a bit
    /// each, so the result is smaller than the in-memory table.
    ///
    /// # Panics
    ///
    /// Panics if the hash index is `u64::max_value()`, which the format cannot represent.
    ///
    /// # Examples
    ///
    /// ```
    /// use amq_filters::xor::XorFilter;
    ///
    /// let keys: Vec<u64> = (0..1_000).collect();
    /// let filter = XorFilter::new(&keys, 8).unwrap();
    ///
    /// let bytes = filter.to_bytes();
    /// assert!(bytes.len() * 8 < filter.slot_count() * 8);
    ///
    /// let decoded = XorFilter::from_bytes(&bytes).unwrap();
    /// assert_eq!(decoded, filter);
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        assert!(
            self.hash_index() < u64::max_value(),
            "hash index {} cannot be serialized",
            self.hash_index()
        );
        let slot_count = self.slot_count();
        let fingerprint_bits = self.fingerprint_bits();
        let values: Vec<u64> = (0..slot_count).map(|index| self.slot(index)).collect();
        let nonzero_count = values.iter().filter(|value| **value != 0).count();

        let mut buffer = BitBuffer::new();
        buffer.write_elias_delta(slot_count as u64 + 1);
        buffer.write_elias_delta(fingerprint_bits as u64);
        buffer.write_elias_delta(self.hash_index() + 1);
        buffer.write_elias_delta(nonzero_count as u64 + 1);
        for value in values.iter().filter(|value| **value != 0) {
            buffer.write_bits(*value, fingerprint_bits);
        }

        let mut encoder = RangeEncoder::new();
        for (index, value) in values.iter().enumerate() {
            encoder.encode(*value != 0, zero_probability(index, self.block_length()));
        }
        for byte in encoder.finish() {
            buffer.write_bits(u64::from(byte), 8);
        }
        buffer.to_bytes()
    }

    /// Decodes a filter written by [`XorFilter::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if `bytes` ends early and [`Error::Corrupt`] if the header is
    /// inconsistent, the bitmap disagrees with the nonzero count or data trails the filter.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buffer = BitBuffer::from_bytes(bytes);

        let slot_count = buffer.read_elias_delta()? - 1;
        if slot_count == 0 || slot_count % 3 != 0 {
            return Err(Error::Corrupt(format!(
                "slot count {} is not a positive multiple of 3",
                slot_count
            )));
        }
        let fingerprint_bits = buffer.read_elias_delta()?;
        if fingerprint_bits > MAX_FINGERPRINT_BITS as u64 {
            return Err(Error::Corrupt(format!(
                "fingerprint width {} exceeds {}",
                fingerprint_bits, MAX_FINGERPRINT_BITS
            )));
        }
        let fingerprint_bits = fingerprint_bits as usize;
        let hash_index = buffer.read_elias_delta()? - 1;
        let nonzero_count = buffer.read_elias_delta()? - 1;
        if nonzero_count > slot_count {
            return Err(Error::Corrupt(format!(
                "{} nonzero slots in a table of {}",
                nonzero_count, slot_count
            )));
        }

        let mut nonzero_values = Vec::new();
        for _ in 0..nonzero_count {
            let value = buffer.read_bits(fingerprint_bits)?;
            if value == 0 {
                return Err(Error::Corrupt("zero value in the nonzero slot list".to_string()));
            }
            nonzero_values.push(value);
        }

        let block_length = (slot_count / 3) as usize;
        let mut values = Vec::new();
        let mut remaining = nonzero_values.into_iter();
        {
            let mut decoder = RangeDecoder::new(&mut buffer)?;
            for index in 0..slot_count as usize {
                if decoder.decode(zero_probability(index, block_length))? {
                    let value = remaining.next().ok_or_else(|| {
                        Error::Corrupt(format!(
                            "bitmap marks more than {} nonzero slots",
                            nonzero_count
                        ))
                    })?;
                    values.push(value);
                } else {
                    values.push(0);
                }
            }
        }
        if remaining.next().is_some() {
            return Err(Error::Corrupt(format!(
                "bitmap marks fewer than {} nonzero slots",
                nonzero_count
            )));
        }
        if buffer.len() - buffer.position() >= 8 {
            return Err(Error::Corrupt(format!(
                "{} trailing bits after the filter",
                buffer.len() - buffer.position()
            )));
        }

        Ok(XorFilter::from_parts(
            hash_index,
            block_length,
            fingerprint_bits,
            values,
        ))
    }
}
