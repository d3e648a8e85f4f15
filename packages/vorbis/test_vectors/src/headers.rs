//! Header packets for the synthetic codec configuration.
//!
//! Every stream shares one setup layout:
//!
//! * book 0: 128 scalar entries of 7 bits, floor 1 post values
//! * book 1: 2 scalar entries of 1 bit, floor masterbook and residue classbook
//! * book 2: 256 two-dimensional entries, coarse residue steps of 16 in
//!   `[-128, 112]`
//! * book 3: 256 two-dimensional entries, fine residue values in `[-8, 7]`
//! * one flat floor 1 with multiplier 2 and posts at 0, 256, 768 and 1024
//! * one residue of the configured type with 32-value partitions
//! * one mapping, optionally coupling channel 0 with channel 1
//! * mode 0 for short blocks and mode 1 for long blocks

use crate::{
    EncoderConfig,
    bits::{BitWriter, float32_pack, ilog},
};

pub const SHORT_BLOCK_SIZE: usize = 256;
pub const LONG_BLOCK_SIZE: usize = 2048;

/// Residue partition length.
pub const PARTITION_SIZE: usize = 32;

pub(crate) const FLOOR_POST_BOOK: u32 = 0;
pub(crate) const FLAG_BOOK: u32 = 1;
pub(crate) const COARSE_BOOK: u32 = 2;
pub(crate) const FINE_BOOK: u32 = 3;

/// Bits of a floor 1 Y value with multiplier 2.
pub(crate) const FLOOR_Y_BITS: u32 = 7;

const CODEBOOK_SYNC: u32 = 0x0056_4342;

fn common_header(bits: &mut BitWriter, packet_type: u8) {
    bits.write(u32::from(packet_type), 8).write_bytes(b"vorbis");
}

/// Identification header for `channels` channels at `sample_rate`.
#[must_use]
pub fn identification(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut bits = BitWriter::new();
    common_header(&mut bits, 1);

    bits.write(0, 32)
        .write(u32::from(channels), 8)
        .write(sample_rate, 32)
        .write(0, 32)
        .write(0, 32)
        .write(0, 32)
        .write(SHORT_BLOCK_SIZE.trailing_zeros(), 4)
        .write(LONG_BLOCK_SIZE.trailing_zeros(), 4)
        .write_bool(true);

    bits.into_bytes()
}

/// Comment header with `vendor` and `KEY=value` comments.
#[must_use]
pub fn comment(vendor: &str, comments: &[String]) -> Vec<u8> {
    let mut bits = BitWriter::new();
    common_header(&mut bits, 3);

    #[allow(clippy::cast_possible_truncation)]
    let write_string = |bits: &mut BitWriter, value: &str| {
        bits.write(value.len() as u32, 32).write_bytes(value.as_bytes());
    };

    write_string(&mut bits, vendor);
    #[allow(clippy::cast_possible_truncation)]
    let count = comments.len() as u32;
    bits.write(count, 32);
    for comment in comments {
        write_string(&mut bits, comment);
    }
    bits.write_bool(true);

    bits.into_bytes()
}

fn codebook_header(bits: &mut BitWriter, dimensions: u32, entries: u32) {
    bits.write(CODEBOOK_SYNC, 24)
        .write(dimensions, 16)
        .write(entries, 24);
}

/// Ordered codebook whose entries all share one codeword length.
fn uniform_ordered_lengths(bits: &mut BitWriter, entries: u32, length: u32) {
    bits.write_bool(true)
        .write(length - 1, 5)
        .write(entries, ilog(entries));
}

/// Lookup type 1 table over 16 multiplicands `minimum + i * delta`.
fn lookup1_table(bits: &mut BitWriter, minimum: i32, delta: i32) {
    bits.write(1, 4)
        .write(float32_pack(minimum), 32)
        .write(float32_pack(delta), 32)
        .write(3, 4)
        .write_bool(false);

    for multiplicand in 0..16 {
        bits.write(multiplicand, 4);
    }
}

fn codebooks(bits: &mut BitWriter) {
    bits.write(3, 8);

    // Floor post values.
    codebook_header(bits, 1, 128);
    uniform_ordered_lengths(bits, 128, 7);
    bits.write(0, 4);

    // Flags, unordered and dense.
    codebook_header(bits, 1, 2);
    bits.write_bool(false).write_bool(false).write(0, 5).write(0, 5);
    bits.write(0, 4);

    // Coarse residue pairs.
    codebook_header(bits, 2, 256);
    uniform_ordered_lengths(bits, 256, 8);
    lookup1_table(bits, -128, 16);

    // Fine residue pairs, sparse with every entry present.
    codebook_header(bits, 2, 256);
    bits.write_bool(false).write_bool(true);
    for _ in 0..256 {
        bits.write_bool(true).write(7, 5);
    }
    lookup1_table(bits, -8, 1);
}

fn floor(bits: &mut BitWriter) {
    bits.write(1, 16);

    // One partition of class 0.
    bits.write(1, 5).write(0, 4);

    // Class 0: two posts, one subclass bit, masterbook 1, subclass books
    // none and 0.
    bits.write(1, 3)
        .write(1, 2)
        .write(FLAG_BOOK, 8)
        .write(0, 8)
        .write(FLOOR_POST_BOOK + 1, 8);

    // Multiplier 2, range bits 10.
    bits.write(1, 2).write(10, 4);
    bits.write(256, 10).write(768, 10);
}

fn residue(bits: &mut BitWriter, config: &EncoderConfig, channels: u8) {
    let half = LONG_BLOCK_SIZE / 2;
    let end = if config.residue.is_coupled() {
        half * usize::from(channels)
    } else {
        half
    };

    #[allow(clippy::cast_possible_truncation)]
    let (end, partition_size) = (end as u32, PARTITION_SIZE as u32);

    bits.write(config.residue.residue_type(), 16)
        .write(0, 24)
        .write(end, 24)
        .write(partition_size - 1, 24)
        .write(1, 6)
        .write(FLAG_BOOK, 8);

    // Class 0 codes nothing, class 1 runs coarse then fine passes.
    bits.write(0, 3).write_bool(false);
    bits.write(0b011, 3).write_bool(false);
    bits.write(COARSE_BOOK, 8).write(FINE_BOOK, 8);
}

fn mapping(bits: &mut BitWriter, config: &EncoderConfig, channels: u8) {
    bits.write(0, 16).write_bool(false);

    if config.coupling {
        let width = ilog(u32::from(channels) - 1);
        bits.write_bool(true).write(0, 8).write(0, width).write(1, width);
    } else {
        bits.write_bool(false);
    }

    bits.write(0, 2);
    bits.write(0, 8).write(0, 8).write(0, 8);
}

/// Setup header for `channels` channels.
#[must_use]
pub fn setup(config: &EncoderConfig, channels: u8) -> Vec<u8> {
    let mut bits = BitWriter::new();
    common_header(&mut bits, 5);

    codebooks(&mut bits);

    // Time domain transforms.
    bits.write(0, 6).write(0, 16);

    bits.write(0, 6);
    floor(&mut bits);

    bits.write(0, 6);
    residue(&mut bits, config, channels);

    bits.write(0, 6);
    mapping(&mut bits, config, channels);

    bits.write(1, 6);
    for block_flag in [false, true] {
        bits.write_bool(block_flag).write(0, 16).write(0, 16).write(0, 8);
    }

    bits.write_bool(true);

    bits.into_bytes()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn identification_header_is_thirty_bytes() {
        let header = identification(2, 48_000);

        assert_eq!(header.len(), 30);
        assert_eq!(header[0], 1);
        assert_eq!(&header[1..7], b"vorbis");
        assert_eq!(header[11], 2);
        assert_eq!(u32::from_le_bytes([header[12], header[13], header[14], header[15]]), 48_000);
        assert_eq!(header[28], 0xB8);
        assert_eq!(header[29], 1);
    }

    #[test_log::test]
    fn comment_header_carries_vendor_and_comments() {
        let header = comment("vendor", &["TITLE=tone".to_string()]);

        assert_eq!(header[0], 3);
        assert_eq!(&header[11..17], b"vendor");
        assert_eq!(u32::from_le_bytes([header[17], header[18], header[19], header[20]]), 1);
        assert_eq!(&header[25..35], b"TITLE=tone");
        assert_eq!(header.last(), Some(&1));
    }

    #[test_log::test]
    fn setup_header_starts_with_magic_and_book_count() {
        let header = setup(&EncoderConfig::default(), 1);

        assert_eq!(header[0], 5);
        assert_eq!(&header[1..7], b"vorbis");
        assert_eq!(header[7], 3);
        assert_eq!(&header[8..11], &[0x42, 0x43, 0x56]);
    }
}
