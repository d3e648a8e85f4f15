//! LSb-first bit packing in the Vorbis bitstream order.

/// Bit writer producing Vorbis packets.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit: u32,
}

impl BitWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `count` bits of `value`, least significant bit first.
    pub fn write(&mut self, value: u32, count: u32) -> &mut Self {
        for i in 0..count {
            if self.bit == 0 {
                self.bytes.push(0);
            }
            let last = self.bytes.len() - 1;
            #[allow(clippy::cast_possible_truncation)]
            {
                self.bytes[last] |= (((value >> i) & 1) as u8) << self.bit;
            }
            self.bit = (self.bit + 1) % 8;
        }
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write(u32::from(value), 1)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        for &byte in bytes {
            self.write(u32::from(byte), 8);
        }
        self
    }

    /// Appends a Huffman codeword, most significant bit first.
    pub fn write_codeword(&mut self, codeword: u32, length: u32) -> &mut Self {
        for i in (0..length).rev() {
            self.write((codeword >> i) & 1, 1);
        }
        self
    }

    /// Number of bits written.
    #[must_use]
    pub fn len_bits(&self) -> usize {
        match self.bit {
            0 => self.bytes.len() * 8,
            bit => (self.bytes.len() - 1) * 8 + bit as usize,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Packs an integer into the 32-bit float format of codebook headers.
///
/// # Panics
///
/// * If `value` does not fit the 21-bit mantissa
#[must_use]
pub fn float32_pack(value: i32) -> u32 {
    assert!(value.unsigned_abs() < 1 << 21, "{value} exceeds the mantissa");

    let sign = if value < 0 { 0x8000_0000 } else { 0 };
    sign | (788 << 21) | value.unsigned_abs()
}

/// Number of bits needed to represent `value`.
#[must_use]
pub const fn ilog(value: u32) -> u32 {
    u32::BITS - value.leading_zeros()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn packs_values_lsb_first() {
        let mut bits = BitWriter::new();
        bits.write(0, 1).write(1, 1).write(0b100, 3).write(0b101, 3);

        assert_eq!(bits.as_bytes(), &[0b1011_0010]);
        assert_eq!(bits.len_bits(), 8);
    }

    #[test_log::test]
    fn codewords_are_written_msb_first() {
        let mut bits = BitWriter::new();
        bits.write_codeword(0b110, 3);

        assert_eq!(bits.as_bytes(), &[0b011]);
        assert_eq!(bits.len_bits(), 3);
    }

    #[test_log::test]
    fn packs_integer_floats() {
        assert_eq!(float32_pack(16), (788 << 21) | 16);
        assert_eq!(float32_pack(-128), 0x8000_0000 | (788 << 21) | 128);
    }

    #[test_log::test]
    fn ilog_counts_bits() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(7), 3);
        assert_eq!(ilog(256), 9);
    }
}
