//! Fixed-size, bit-addressed storage for packed fixed-width values.

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

const WORD_BIT_COUNT: usize = 64;

/// The widest value a single read or write can move.
pub const MAX_WIDTH: usize = 64;

#[inline]
fn mask(width: usize) -> u64 {
    if width == WORD_BIT_COUNT {
        !0
    } else {
        (1 << width) - 1
    }
}

/// A bit array backed by a `Vec<u64>` with random access at any bit offset.
///
/// Values of 1 to 64 bits can be stored at arbitrary bit offsets, possibly straddling two words.
/// `write` ORs the value in and therefore requires the target bits to be zero; callers that want
/// to overwrite use [`BitStore::replace`], or [`BitStore::clear`] followed by `write`.
///
/// # Examples
///
/// ```
/// use amq_filters::bit_store::BitStore;
///
/// let mut store = BitStore::new(100);
///
/// store.write(60, 0b1011, 4);
/// store.write(64, 0x1F, 5);
/// assert_eq!(store.read(60, 4), 0b1011);
/// assert_eq!(store.read(64, 5), 0x1F);
///
/// store.replace(60, 0b0110, 4);
/// assert_eq!(store.read(60, 4), 0b0110);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct BitStore {
    words: Vec<u64>,
    bit_len: usize,
}

impl BitStore {
    fn get_word_count(bit_len: usize) -> usize {
        (bit_len + WORD_BIT_COUNT - 1) / WORD_BIT_COUNT
    }

    /// Constructs a new, zeroed `BitStore` holding `bit_len` bits.
    ///
    /// # Examples
    ///
    /// ```
    /// use amq_filters::bit_store::BitStore;
    ///
    /// let store = BitStore::new(130);
    /// assert_eq!(store.len(), 130);
    /// assert_eq!(store.words().len(), 3);
    /// ```
    pub fn new(bit_len: usize) -> Self {
        BitStore {
            words: vec![0; Self::get_word_count(bit_len)],
            bit_len,
        }
    }

    /// Constructs a `BitStore` from raw words. The store spans every bit of `words`.
    pub fn from_words(words: Vec<u64>) -> Self {
        let bit_len = words.len() * WORD_BIT_COUNT;
        BitStore { words, bit_len }
    }

    #[inline]
    fn check_range(&self, bit_offset: usize, width: usize) {
        assert!(width > 0 && width <= MAX_WIDTH, "unsupported width {}", width);
        assert!(
            bit_offset + width <= self.bit_len,
            "bit range {}..{} out of bounds for length {}",
            bit_offset,
            bit_offset + width,
            self.bit_len,
        );
    }

    /// Returns the `width`-bit value stored at `bit_offset`.
    ///
    /// # Panics
    ///
    /// Panics if `width` is 0 or greater than 64, or if the range is out of bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use amq_filters::bit_store::BitStore;
    ///
    /// let store = BitStore::new(64);
    /// assert_eq!(store.read(3, 7), 0);
    /// ```
    #[inline]
    pub fn read(&self, bit_offset: usize, width: usize) -> u64 {
        self.check_range(bit_offset, width);
        let index = bit_offset / WORD_BIT_COUNT;
        let shift = bit_offset % WORD_BIT_COUNT;
        let mut value = self.words[index] >> shift;
        if shift + width > WORD_BIT_COUNT {
            value |= self.words[index + 1] << (WORD_BIT_COUNT - shift);
        }
        value & mask(width)
    }

    /// Stores the `width`-bit `value` at `bit_offset`.
    ///
    /// The target bits must be zero; this is the precondition that lets a write be a pair of ORs.
    /// Every write is read back, and a write that does not read back as `value` panics in all
    /// builds.
    ///
    /// # Panics
    ///
    /// Panics if `width` is 0 or greater than 64, if the range is out of bounds, or if the write
    /// does not read back as `value`. In debug builds it panics earlier if `value` does not fit in
    /// `width` bits or the target was not zero.
    #[inline]
    pub fn write(&mut self, bit_offset: usize, value: u64, width: usize) {
        self.check_range(bit_offset, width);
        debug_assert_eq!(value & !mask(width), 0, "value does not fit in {} bits", width);
        debug_assert_eq!(
            self.read(bit_offset, width),
            0,
            "bit store write target at bit {} is not zeroed",
            bit_offset,
        );
        let index = bit_offset / WORD_BIT_COUNT;
        let shift = bit_offset % WORD_BIT_COUNT;
        self.words[index] |= value << shift;
        if shift + width > WORD_BIT_COUNT {
            self.words[index + 1] |= value >> (WORD_BIT_COUNT - shift);
        }
        assert_eq!(
            self.read(bit_offset, width),
            value,
            "bit store readback mismatch at bit {}",
            bit_offset,
        );
    }

    /// Zeroes the `width` bits at `bit_offset`.
    #[inline]
    pub fn clear(&mut self, bit_offset: usize, width: usize) {
        self.check_range(bit_offset, width);
        let index = bit_offset / WORD_BIT_COUNT;
        let shift = bit_offset % WORD_BIT_COUNT;
        self.words[index] &= !(mask(width) << shift);
        if shift + width > WORD_BIT_COUNT {
            self.words[index + 1] &= !(mask(width) >> (WORD_BIT_COUNT - shift));
        }
    }

    /// Overwrites the `width` bits at `bit_offset` with `value`, whatever they held before.
    ///
    /// # Examples
    ///
    /// ```
    /// use amq_filters::bit_store::BitStore;
    ///
    /// let mut store = BitStore::new(128);
    /// store.replace(62, 0xFF, 8);
    /// store.replace(62, 0x0F, 8);
    /// assert_eq!(store.read(62, 8), 0x0F);
    /// ```
    #[inline]
    pub fn replace(&mut self, bit_offset: usize, value: u64, width: usize) {
        self.clear(bit_offset, width);
        self.write(bit_offset, value & mask(width), width);
    }

    /// Returns the bit at `index`.
    #[inline]
    pub fn get_bit(&self, index: usize) -> bool {
        assert!(index < self.bit_len);
        self.words[index / WORD_BIT_COUNT] & (1 << (index % WORD_BIT_COUNT)) != 0
    }

    /// Sets the bit at `index` to one. Unlike `write`, the bit may already be set.
    #[inline]
    pub fn set_bit(&mut self, index: usize) {
        assert!(index < self.bit_len);
        self.words[index / WORD_BIT_COUNT] |= 1 << (index % WORD_BIT_COUNT);
    }

    /// Grows the store to `bit_len` bits. New bits are zero. Never shrinks.
    pub fn grow(&mut self, bit_len: usize) {
        if bit_len <= self.bit_len {
            return;
        }
        self.words.resize(Self::get_word_count(bit_len), 0);
        self.bit_len = bit_len;
    }

    /// Returns the number of addressable bits.
    pub fn len(&self) -> usize {
        self.bit_len
    }

    /// Returns `true` if the store holds no bits.
    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    /// Returns the number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Returns the backing words. Bit `i` lives in `words()[i / 64]` at position `i % 64`.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Returns the number of bits allocated, a multiple of 64.
    pub fn allocated_bits(&self) -> usize {
        self.words.len() * WORD_BIT_COUNT
    }
}

#[cfg(test)]
mod tests {
    use super::BitStore;

    #[test]
    fn test_new() {
        let store = BitStore::new(130);
        assert_eq!(store.len(), 130);
        assert!(!store.is_empty());
        assert_eq!(store.allocated_bits(), 192);
        assert_eq!(store.count_ones(), 0);
        assert!(BitStore::new(0).is_empty());
    }

    #[test]
    fn test_write_read_width_5() {
        let mut store = BitStore::new(5 * 40);
        for i in 0..40 {
            store.write(i * 5, (i % 32) as u64, 5);
        }
        for i in 0..40 {
            assert_eq!(store.read(i * 5, 5), (i % 32) as u64);
        }
    }

    #[test]
    fn test_write_read_straddling() {
        for width in &[1, 7, 13, 21, 33, 57, 63, 64] {
            let width = *width;
            let mut store = BitStore::new(width * 20 + 64);
            let value = if width == 64 { !0 } else { (1 << width) - 1 };
            for i in 0..20 {
                store.write(i * width + 3, value ^ (i as u64 & 1), width);
            }
            for i in 0..20 {
                assert_eq!(store.read(i * width + 3, width), value ^ (i as u64 & 1));
            }
            assert_eq!(store.read(0, 3), 0);
        }
    }

    #[test]
    fn test_clear_and_replace() {
        let mut store = BitStore::new(256);
        store.write(0, !0, 64);
        store.write(100, 0x3FFF, 14);
        store.clear(60, 8);
        assert_eq!(store.read(0, 60), (1 << 60) - 1);
        assert_eq!(store.read(60, 4), 0);
        store.replace(120, 0x5, 3);
        store.replace(100, 0x1234, 14);
        assert_eq!(store.read(100, 14), 0x1234);
        assert_eq!(store.read(120, 3), 0x5);
        store.replace(100, 0, 14);
        assert_eq!(store.read(100, 14), 0);
    }

    #[test]
    fn test_bits() {
        let mut store = BitStore::new(70);
        store.set_bit(3);
        store.set_bit(3);
        store.set_bit(69);
        assert!(store.get_bit(3));
        assert!(store.get_bit(69));
        assert!(!store.get_bit(4));
        assert_eq!(store.count_ones(), 2);
    }

    #[test]
    fn test_grow() {
        let mut store = BitStore::new(10);
        store.write(2, 0b11, 2);
        store.grow(200);
        assert_eq!(store.len(), 200);
        assert_eq!(store.read(2, 2), 0b11);
        store.write(150, 0xAB, 8);
        assert_eq!(store.read(150, 8), 0xAB);
        store.grow(20);
        assert_eq!(store.len(), 200);
    }

    #[test]
    fn test_from_words() {
        let store = BitStore::from_words(vec![0xFF, 1]);
        assert_eq!(store.len(), 128);
        assert_eq!(store.read(0, 8), 0xFF);
        assert_eq!(store.read(64, 1), 1);
    }

    #[test]
    #[should_panic]
    fn test_read_out_of_bounds() {
        let store = BitStore::new(10);
        store.read(5, 6);
    }

    #[test]
    #[should_panic]
    fn test_zero_width() {
        let store = BitStore::new(10);
        store.read(0, 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "not zeroed")]
    fn test_write_requires_zeroed_target() {
        let mut store = BitStore::new(64);
        store.write(0, 1, 4);
        store.write(0, 2, 4);
    }

    #[test]
    #[should_panic(expected = "bit store")]
    fn test_write_readback_mismatch() {
        let mut store = BitStore::new(64);
        store.write(0, 1, 4);
        store.write(0, 2, 4);
    }
}
