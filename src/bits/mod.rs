//! Sub-byte cursor over byte buffers (spec §4.1).
//!
//! [`BitSet`] is the bit-indexed value type every read/write boundary
//! passes through; [`reader::BitReader`] and [`writer::BitWriter`] are the
//! cursors built on top of it.

mod reader;
mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;

/// Byte order for multi-bit/multi-byte values.
///
/// See SPEC_FULL.md §C and spec design note (b): `LittleEndian` means
/// different things for [`BitSet::to_integer`] (full-width bit reflection)
/// than it does for [`reader::BitReader::get_integer`] (byte-granular swap,
/// the conventional meaning) — each call site documents which applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

/// Text charset for `String`/`StringTerminated` descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    Utf8,
    Latin1,
}

impl Charset {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Ascii | Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Charset::Ascii | Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Latin1 => text.chars().map(|c| c as u8).collect(),
        }
    }
}

/// A sparse, ascending set of bit indices.
///
/// Messages are frequently large with few set bits (event bitmaps); a
/// sorted index array is both compact and makes `reverse_bits`/`is_bit_set`
/// cheap without committing to a dense layout (spec §4.1 rationale).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    indices: Vec<u64>,
}

impl BitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `BitSet` from a byte array using stream bit order: index 0
    /// is the most-significant bit of the first byte (spec §4.1, "lowest
    /// index = first bit read").
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut indices = Vec::new();
        for (byte_idx, &b) in bytes.iter().enumerate() {
            for bit_idx in 0..8u64 {
                if (b >> (7 - bit_idx)) & 1 == 1 {
                    indices.push(byte_idx as u64 * 8 + bit_idx);
                }
            }
        }
        Self { indices }
    }

    pub fn set_bit(&mut self, idx: u64) {
        if let Err(pos) = self.indices.binary_search(&idx) {
            self.indices.insert(pos, idx);
        }
    }

    pub fn clear_bit(&mut self, idx: u64) {
        if let Ok(pos) = self.indices.binary_search(&idx) {
            self.indices.remove(pos);
        }
    }

    pub fn is_bit_set(&self, idx: u64) -> bool {
        self.indices.binary_search(&idx).is_ok()
    }

    pub fn set_indices(&self) -> &[u64] {
        &self.indices
    }

    fn highest_index(&self) -> Option<u64> {
        self.indices.last().copied()
    }

    /// Materializes the set as a byte array, stream bit order, sized to the
    /// smallest whole number of bytes that holds every set index.
    pub fn to_byte_array(&self) -> Vec<u8> {
        let bits = self.highest_index().map_or(0, |h| h + 1);
        self.to_byte_array_sized(bits)
    }

    /// Materializes exactly `size_bits` bits (rounded up to a byte) as a
    /// byte array in stream bit order.
    pub fn to_byte_array_sized(&self, size_bits: u64) -> Vec<u8> {
        let byte_len = size_bits.div_ceil(8) as usize;
        let mut bytes = vec![0u8; byte_len];
        for &idx in &self.indices {
            if idx >= size_bits {
                continue;
            }
            let byte_idx = (idx / 8) as usize;
            let bit_idx = idx % 8;
            bytes[byte_idx] |= 1 << (7 - bit_idx);
        }
        bytes
    }

    /// Reverses bit order across the window `[0, size)`; bits at or beyond
    /// `size` are left untouched. An involution: `reverse_bits(n)` applied
    /// twice is the identity on that window (spec §8, "Bit order" property).
    pub fn reverse_bits(&self, size: u64) -> Self {
        let mut indices: Vec<u64> = self
            .indices
            .iter()
            .map(|&idx| if idx < size { size - 1 - idx } else { idx })
            .collect();
        indices.sort_unstable();
        Self { indices }
    }

    /// Converts the `[0, size)` window to an unsigned integer.
    ///
    /// `BigEndian` reads the window positionally, index 0 as the most
    /// significant bit. `LittleEndian` first reflects the whole window
    /// (see [`Self::reverse_bits`]) and then reads positionally — this is
    /// the "bitset" codec's little-endian semantics (spec §4.4: "if
    /// byte_order = little-endian, reverses bit order over size"), distinct
    /// from the byte-granular little-endian `BitReader::get_integer` uses
    /// for the `Integer` descriptor (spec design note b).
    pub fn to_integer(&self, size: u64, order: ByteOrder) -> u128 {
        let source = match order {
            ByteOrder::BigEndian => self.clone(),
            ByteOrder::LittleEndian => self.reverse_bits(size),
        };
        let mut value: u128 = 0;
        for &idx in &source.indices {
            if idx >= size {
                continue;
            }
            value |= 1u128 << (size - 1 - idx);
        }
        value
    }

    pub fn from_integer(value: u128, size: u64, order: ByteOrder) -> Self {
        let mut indices = Vec::new();
        for bit in 0..size {
            if (value >> bit) & 1 == 1 {
                indices.push(size - 1 - bit);
            }
        }
        let set = Self { indices };
        match order {
            ByteOrder::BigEndian => set,
            ByteOrder::LittleEndian => set.reverse_bits(size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_bits_matches_spec_scenario_1() {
        assert_eq!(
            BitSet::from_bytes(&[0x10]).reverse_bits(8),
            BitSet::from_bytes(&[0x08])
        );
        assert_eq!(
            BitSet::from_bytes(&[0x16]).reverse_bits(8),
            BitSet::from_bytes(&[0x68])
        );
        assert_eq!(
            BitSet::from_bytes(&[0xE7]).reverse_bits(8),
            BitSet::from_bytes(&[0xE7])
        );
    }

    #[test]
    fn reverse_bits_is_an_involution() {
        let bs = BitSet::from_bytes(&[0x4d, 0x9a]);
        assert_eq!(bs.reverse_bits(16).reverse_bits(16), bs);
    }

    #[test]
    fn to_byte_array_round_trips_from_bytes() {
        let bytes = [0xDE, 0xAD, 0xBE, 0xEF];
        let bs = BitSet::from_bytes(&bytes);
        assert_eq!(bs.to_byte_array_sized(32), bytes);
    }

    #[test]
    fn to_integer_big_endian_is_positional() {
        let bs = BitSet::from_bytes(&[0x00, 0x10]);
        assert_eq!(bs.to_integer(16, ByteOrder::BigEndian), 0x0010);
    }

    #[test]
    fn from_integer_round_trips_to_integer() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let bs = BitSet::from_integer(0x1234, 16, order);
            assert_eq!(bs.to_integer(16, order), 0x1234);
        }
    }
}
