//! Growable bit stream used by the serialized filter formats.

use crate::bit_store::{BitStore, MAX_WIDTH};
use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// An append-only bit writer with an independent read cursor.
///
/// Values are appended at the end of the stream and read back in the same order. The stream
/// converts to and from bytes; bit `i` of the stream is bit `i % 8` of byte `i / 8`.
///
/// # Examples
///
/// ```
/// use amq_filters::bit_buffer::BitBuffer;
///
/// let mut buffer = BitBuffer::new();
/// buffer.write_bits(0b101, 3);
/// buffer.write_elias_delta(1000);
///
/// let mut buffer = BitBuffer::from_bytes(&buffer.to_bytes());
/// assert_eq!(buffer.read_bits(3).unwrap(), 0b101);
/// assert_eq!(buffer.read_elias_delta().unwrap(), 1000);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BitBuffer {
    store: BitStore,
    len: usize,
    position: usize,
}

impl BitBuffer {
    /// Constructs a new, empty `BitBuffer`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a `BitBuffer` positioned at the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut padded = bytes.to_vec();
        padded.resize((bytes.len() + 7) / 8 * 8, 0);
        let mut words = vec![0u64; padded.len() / 8];
        LittleEndian::read_u64_into(&padded, &mut words);
        BitBuffer {
            store: BitStore::from_words(words),
            len: bytes.len() * 8,
            position: 0,
        }
    }

    /// Returns the written bits as bytes. The final byte is zero padded.
    pub fn to_bytes(&self) -> Vec<u8> {
        let words = self.store.words();
        let mut bytes = vec![0u8; words.len() * 8];
        LittleEndian::write_u64_into(words, &mut bytes);
        bytes.truncate((self.len + 7) / 8);
        bytes
    }

    /// Appends the low `width` bits of `value`.
    ///
    /// # Panics
    ///
    /// Panics if `width` is greater than 64.
    pub fn write_bits(&mut self, value: u64, width: usize) {
        assert!(width <= MAX_WIDTH);
        if width == 0 {
            return;
        }
        let value = if width == MAX_WIDTH {
            value
        } else {
            value & ((1 << width) - 1)
        };
        if self.len + width > self.store.len() {
            self.store
                .grow(std::cmp::max(self.len + width, self.store.len() * 2));
        }
        self.store.write(self.len, value, width);
        self.len += width;
    }

    /// Appends a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u64, 1);
    }

    /// Reads the next `width` bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if fewer than `width` bits remain.
    pub fn read_bits(&mut self, width: usize) -> Result<u64> {
        assert!(width <= MAX_WIDTH);
        if width == 0 {
            return Ok(0);
        }
        if self.position + width > self.len {
            return Err(Error::Truncated(self.position));
        }
        let value = self.store.read(self.position, width);
        self.position += width;
        Ok(value)
    }

    /// Reads the next bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Appends `value` as an Elias-Delta code. Small values take few bits: 1 takes one bit, 1000
    /// takes 16.
    ///
    /// # Panics
    ///
    /// Panics if `value` is 0, which has no Elias-Delta code.
    pub fn write_elias_delta(&mut self, value: u64) {
        assert!(value > 0, "elias-delta codes start at 1");
        let value_bits = 64 - value.leading_zeros() as usize;
        let length_bits = 64 - (value_bits as u64).leading_zeros() as usize;
        self.write_bits(0, length_bits - 1);
        for i in (0..length_bits).rev() {
            self.write_bit((value_bits >> i) & 1 == 1);
        }
        for i in (0..value_bits - 1).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Reads an Elias-Delta code written by [`BitBuffer::write_elias_delta`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if the stream ends inside the code and [`Error::Corrupt`] if
    /// the code describes a value wider than 64 bits.
    pub fn read_elias_delta(&mut self) -> Result<u64> {
        let start = self.position;
        let mut zeros = 0;
        while !self.read_bit()? {
            zeros += 1;
            if zeros > 6 {
                return Err(Error::Corrupt(format!(
                    "elias-delta length prefix too long at bit {}",
                    start
                )));
            }
        }
        let mut value_bits = 1usize;
        for _ in 0..zeros {
            value_bits = (value_bits << 1) | self.read_bit()? as usize;
        }
        if value_bits > 64 {
            return Err(Error::Corrupt(format!(
                "elias-delta value at bit {} has {} bits",
                start, value_bits
            )));
        }
        let mut value = 1u64;
        for _ in 0..value_bits - 1 {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value)
    }

    /// Returns the number of bits written.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bits have been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the read cursor.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the read cursor to `position`.
    pub fn seek(&mut self, position: usize) {
        assert!(position <= self.len);
        self.position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::BitBuffer;
    use crate::error::Error;

    #[test]
    fn test_write_read_bits() {
        let mut buffer = BitBuffer::new();
        assert!(buffer.is_empty());
        for i in 0..100u64 {
            buffer.write_bits(i, (i % 13 + 7) as usize);
        }
        buffer.write_bits(!0, 64);
        for i in 0..100u64 {
            assert_eq!(buffer.read_bits((i % 13 + 7) as usize).unwrap(), i);
        }
        assert_eq!(buffer.read_bits(64).unwrap(), !0);
        assert_eq!(buffer.position(), buffer.len());
        assert_eq!(buffer.read_bits(1), Err(Error::Truncated(buffer.len())));
    }

    #[test]
    fn test_write_bits_masks_value() {
        let mut buffer = BitBuffer::new();
        buffer.write_bits(0xFF, 4);
        buffer.write_bits(0, 4);
        assert_eq!(buffer.read_bits(8).unwrap(), 0x0F);
    }

    #[test]
    fn test_elias_delta_lengths() {
        let mut buffer = BitBuffer::new();
        buffer.write_elias_delta(1);
        assert_eq!(buffer.len(), 1);
        buffer.write_elias_delta(2);
        assert_eq!(buffer.len(), 5);
        buffer.write_elias_delta(1000);
        assert_eq!(buffer.len(), 21);
        buffer.write_elias_delta(u64::max_value());
        for expected in &[1, 2, 1000, u64::max_value()] {
            assert_eq!(buffer.read_elias_delta().unwrap(), *expected);
        }
    }

    #[test]
    fn test_elias_delta_truncated() {
        let mut buffer = BitBuffer::new();
        buffer.write_elias_delta(1 << 40);
        let bytes = buffer.to_bytes();
        let mut truncated = BitBuffer::from_bytes(&bytes[..2]);
        assert!(matches!(truncated.read_elias_delta(), Err(Error::Truncated(_))));
    }

    #[test]
    fn test_elias_delta_corrupt() {
        let mut buffer = BitBuffer::from_bytes(&[0, 0]);
        assert!(matches!(buffer.read_elias_delta(), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_bytes() {
        let mut buffer = BitBuffer::new();
        buffer.write_bits(0x1, 1);
        buffer.write_bits(0x2A, 7);
        buffer.write_bits(0x3, 2);
        let bytes = buffer.to_bytes();
        assert_eq!(bytes, vec![0x55, 0x03]);

        let mut buffer = BitBuffer::from_bytes(&bytes);
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.read_bits(1).unwrap(), 1);
        assert_eq!(buffer.read_bits(7).unwrap(), 0x2A);
        assert_eq!(buffer.read_bits(2).unwrap(), 0x3);
        buffer.seek(0);
        assert_eq!(buffer.read_bits(8).unwrap(), 0x55);
    }
}
