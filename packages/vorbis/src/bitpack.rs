//! Vorbis bit unpacking.
//!
//! Vorbis packs values LSb-first: the first bit read from a packet is the
//! least significant bit of the first byte, and multi-bit values are
//! assembled from the low bits upwards.

/// Signals that a read ran past the end of the packet.
///
/// Headers treat this as corruption, audio packets treat it as a nominal
/// truncation (floors become unused, remaining residue values stay zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfPacket;

/// LSb-first bit reader over a single packet.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte: usize,
    bit: u32,
}

impl<'a> BitReader<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte: 0,
            bit: 0,
        }
    }

    /// Bits left before the end of the packet.
    #[must_use]
    pub const fn remaining_bits(&self) -> usize {
        if self.byte >= self.data.len() {
            0
        } else {
            (self.data.len() - self.byte) * 8 - self.bit as usize
        }
    }

    /// Number of bytes touched so far, counting a partially read byte as
    /// consumed.
    #[must_use]
    pub const fn bytes_consumed(&self) -> usize {
        if self.bit == 0 {
            self.byte
        } else {
            self.byte + 1
        }
    }

    /// Reads `count` bits (at most 32) as an unsigned value.
    ///
    /// # Errors
    ///
    /// * `EndOfPacket` - if fewer than `count` bits remain. The reader is left
    ///   exhausted so every following read fails as well.
    pub fn read(&mut self, count: u32) -> Result<u32, EndOfPacket> {
        debug_assert!(count <= 32);

        if count == 0 {
            return Ok(0);
        }

        if self.remaining_bits() < count as usize {
            self.byte = self.data.len();
            self.bit = 0;
            return Err(EndOfPacket);
        }

        let mut value = 0_u64;
        let mut filled = 0;

        while filled < count {
            let available = 8 - self.bit;
            let take = available.min(count - filled);
            let bits = (u64::from(self.data[self.byte]) >> self.bit) & ((1_u64 << take) - 1);

            value |= bits << filled;
            filled += take;
            self.bit += take;

            if self.bit == 8 {
                self.bit = 0;
                self.byte += 1;
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        Ok(value as u32)
    }

    /// Reads a single flag bit.
    ///
    /// # Errors
    ///
    /// * `EndOfPacket` - if the packet is exhausted
    pub fn read_bool(&mut self) -> Result<bool, EndOfPacket> {
        Ok(self.read(1)? == 1)
    }

    /// Reads an 8-bit value.
    ///
    /// # Errors
    ///
    /// * `EndOfPacket` - if the packet is exhausted
    pub fn read_u8(&mut self) -> Result<u8, EndOfPacket> {
        #[allow(clippy::cast_possible_truncation)]
        Ok(self.read(8)? as u8)
    }

    /// Reads `count` (at most 32) bits as a `usize`.
    ///
    /// # Errors
    ///
    /// * `EndOfPacket` - if the packet is exhausted
    pub fn read_usize(&mut self, count: u32) -> Result<usize, EndOfPacket> {
        Ok(self.read(count)? as usize)
    }
}

/// Number of bits needed to represent `value`, Vorbis I `ilog`. Zero and
/// negative values yield zero.
#[must_use]
pub const fn ilog(value: i64) -> u32 {
    if value <= 0 {
        0
    } else {
        64 - value.leading_zeros()
    }
}

/// Decodes the Vorbis 32-bit packed float format used by codebook headers.
#[must_use]
pub fn float32_unpack(packed: u32) -> f32 {
    let mantissa = f64::from(packed & 0x001F_FFFF);
    let exponent = (packed & 0x7FE0_0000) >> 21;
    let mantissa = if packed & 0x8000_0000 == 0 {
        mantissa
    } else {
        -mantissa
    };

    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    let value = mantissa * 2_f64.powi(exponent as i32 - 788);

    #[allow(clippy::cast_possible_truncation)]
    let value = value as f32;
    value
}

/// Largest integer `r` such that `r.pow(dimensions) <= entries`.
#[must_use]
pub fn lookup1_values(entries: u32, dimensions: u16) -> u32 {
    if dimensions == 0 {
        return 0;
    }

    let fits = |r: u64| -> bool {
        let mut acc = 1_u64;
        for _ in 0..dimensions {
            acc = acc.saturating_mul(r);
            if acc > u64::from(entries) {
                return false;
            }
        }
        true
    };

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let mut r = f64::from(entries).powf(1.0 / f64::from(dimensions)).floor() as u64;

    while r > 0 && !fits(r) {
        r -= 1;
    }
    while fits(r + 1) {
        r += 1;
    }

    #[allow(clippy::cast_possible_truncation)]
    let r = r as u32;
    r
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn reads_lsb_first_within_a_byte() {
        let data = [0b1011_0010];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read(1), Ok(0));
        assert_eq!(reader.read(1), Ok(1));
        assert_eq!(reader.read(3), Ok(0b100));
        assert_eq!(reader.read(3), Ok(0b101));
        assert_eq!(reader.remaining_bits(), 0);
    }

    #[test]
    fn reads_values_spanning_bytes() {
        let data = [0xFF, 0x01, 0x80];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read(4), Ok(0xF));
        assert_eq!(reader.read(8), Ok(0x1F));
        assert_eq!(reader.read(12), Ok(0x800));
    }

    #[test]
    fn reads_full_32_bit_values() {
        let data = 0xDEAD_BEEF_u32.to_le_bytes();
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read(32), Ok(0xDEAD_BEEF));
    }

    #[test]
    fn end_of_packet_exhausts_reader() {
        let data = [0xAB];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read(4), Ok(0xB));
        assert_eq!(reader.read(5), Err(EndOfPacket));
        assert_eq!(reader.read(1), Err(EndOfPacket));
        assert_eq!(reader.remaining_bits(), 0);
    }

    #[test]
    fn bytes_consumed_rounds_partial_bytes_up() {
        let data = [0, 0, 0];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.bytes_consumed(), 0);
        reader.read(9).unwrap();
        assert_eq!(reader.bytes_consumed(), 2);
        reader.read(7).unwrap();
        assert_eq!(reader.bytes_consumed(), 2);
    }

    #[test]
    fn ilog_matches_reference_values() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(2), 2);
        assert_eq!(ilog(3), 2);
        assert_eq!(ilog(4), 3);
        assert_eq!(ilog(7), 3);
        assert_eq!(ilog(-1111), 0);
    }

    #[test]
    fn float32_unpack_decodes_integers_and_fractions() {
        assert!((float32_unpack((788 << 21) | 1) - 1.0).abs() < f32::EPSILON);
        assert!((float32_unpack(0x8000_0000 | (788 << 21) | 128) + 128.0).abs() < f32::EPSILON);
        assert!((float32_unpack((787 << 21) | 1) - 0.5).abs() < f32::EPSILON);
        assert!(float32_unpack(0).abs() < f32::EPSILON);
    }

    #[test]
    fn lookup1_values_finds_integer_root() {
        assert_eq!(lookup1_values(256, 2), 16);
        assert_eq!(lookup1_values(255, 2), 15);
        assert_eq!(lookup1_values(81, 4), 3);
        assert_eq!(lookup1_values(80, 4), 2);
        assert_eq!(lookup1_values(7, 1), 7);
    }
}
