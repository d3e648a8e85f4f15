//! Codebooks: Huffman entry decoding and vector quantisation lookup.
//!
//! Codeword lengths are read from the setup header and turned into a binary
//! decode tree. Books with a value mapping (lookup type 1 or 2) also carry a
//! table of the VQ vector for every entry, unpacked once at setup time.

use log::trace;

use crate::{
    bitpack::{BitReader, EndOfPacket, float32_unpack, ilog, lookup1_values},
    error::{Error, Result},
};

const CODEBOOK_SYNC: u32 = 0x0056_4342;

/// Upper bound on unpacked VQ table elements accepted from a header.
const MAX_LOOKUP_ELEMENTS: usize = 1 << 24;

const EMPTY: i32 = 0;

/// Binary decode tree. Children are node indices (positive), leaves are
/// `-(entry + 1)`, and `EMPTY` marks an unassigned branch. Node 0 is the root
/// and is never referenced as a child.
#[derive(Debug, Clone)]
struct HuffmanTree {
    nodes: Vec<[i32; 2]>,
}

impl HuffmanTree {
    fn build(lengths: &[u8]) -> Result<Self> {
        let codewords = assign_codewords(lengths)?;
        let mut nodes = vec![[EMPTY; 2]];

        for (entry, (&length, &codeword)) in lengths.iter().zip(codewords.iter()).enumerate() {
            if length == 0 {
                continue;
            }

            let mut node = 0_usize;
            for depth in (0..u32::from(length)).rev() {
                let bit = ((codeword >> depth) & 1) as usize;
                let child = nodes[node][bit];

                if depth == 0 {
                    if child != EMPTY {
                        return Err(Error::header("codebook codewords overlap"));
                    }
                    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                    {
                        nodes[node][bit] = -(entry as i32) - 1;
                    }
                } else if child == EMPTY {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                    let next = nodes.len() as i32;
                    nodes.push([EMPTY; 2]);
                    nodes[node][bit] = next;
                    node = next as usize;
                } else if child < 0 {
                    return Err(Error::header("codebook codeword is a prefix of another"));
                } else {
                    #[allow(clippy::cast_sign_loss)]
                    {
                        node = child as usize;
                    }
                }
            }
        }

        Ok(Self { nodes })
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> std::result::Result<u32, EndOfPacket> {
        let mut node = 0_usize;

        loop {
            let bit = reader.read(1)? as usize;
            let child = self.nodes[node][bit];

            if child < 0 {
                #[allow(clippy::cast_sign_loss)]
                return Ok((-(child + 1)) as u32);
            }
            if child == EMPTY {
                // Undecodable codewords end the packet, matching the
                // reference decoder.
                return Err(EndOfPacket);
            }

            #[allow(clippy::cast_sign_loss)]
            {
                node = child as usize;
            }
        }
    }
}

/// Assigns codewords in entry order, each entry taking the lowest free
/// codeword of its length.
///
/// Rejects over-specified trees, and under-specified trees unless exactly one
/// entry is used.
fn assign_codewords(lengths: &[u8]) -> Result<Vec<u32>> {
    let mut marker = [0_u32; 33];
    let mut codewords = vec![0_u32; lengths.len()];
    let mut used = 0_usize;

    for (i, &length) in lengths.iter().enumerate() {
        if length == 0 {
            continue;
        }
        used += 1;

        let length = usize::from(length);
        let mut entry = marker[length];
        if length < 32 && (entry >> length) != 0 {
            return Err(Error::header("codebook lengths over-specify the tree"));
        }
        codewords[i] = entry;

        for j in (1..=length).rev() {
            if marker[j] & 1 == 1 {
                if j == 1 {
                    marker[1] += 1;
                } else {
                    marker[j] = marker[j - 1] << 1;
                }
                break;
            }
            marker[j] += 1;
        }

        for j in (length + 1)..33 {
            if (marker[j] >> 1) == entry {
                entry = marker[j];
                marker[j] = marker[j - 1] << 1;
            } else {
                break;
            }
        }
    }

    if used != 1 {
        for (i, &mark) in marker.iter().enumerate().skip(1) {
            let mask = u32::MAX >> (32 - i);
            if mark & mask != 0 {
                return Err(Error::header("codebook lengths under-specify the tree"));
            }
        }
    }

    Ok(codewords)
}

#[derive(Debug, Clone)]
enum EntryDecoder {
    Tree(HuffmanTree),
    /// A book with one used entry decodes it from a single bit.
    Single(u32),
}

/// A parsed codebook.
#[derive(Debug, Clone)]
pub struct Codebook {
    dimensions: usize,
    entries: usize,
    decoder: EntryDecoder,
    lookup: Option<Vec<f32>>,
}

impl Codebook {
    /// Reads one codebook from the setup header.
    ///
    /// # Errors
    ///
    /// * `MalformedHeader` - bad sync pattern, inconsistent lengths, an invalid
    ///   Huffman tree, unknown lookup type, or a truncated header
    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        if reader.read(24)? != CODEBOOK_SYNC {
            return Err(Error::header("codebook sync pattern mismatch"));
        }

        let dimensions = reader.read_usize(16)?;
        let entries = reader.read_usize(24)?;

        if dimensions == 0 && entries > 0 {
            return Err(Error::header("codebook has zero dimensions"));
        }

        let lengths = read_lengths(reader, entries)?;
        let used: Vec<usize> = (0..entries).filter(|&i| lengths[i] > 0).collect();

        let decoder = if used.len() == 1 {
            #[allow(clippy::cast_possible_truncation)]
            EntryDecoder::Single(used[0] as u32)
        } else {
            EntryDecoder::Tree(HuffmanTree::build(&lengths)?)
        };

        let lookup = read_lookup(reader, dimensions, entries)?;

        trace!(
            "Codebook: dimensions={dimensions} entries={entries} used={} lookup={}",
            used.len(),
            lookup.is_some()
        );

        Ok(Self {
            dimensions,
            entries,
            decoder,
            lookup,
        })
    }

    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[must_use]
    pub const fn entries(&self) -> usize {
        self.entries
    }

    /// Whether the book carries VQ values.
    #[must_use]
    pub const fn has_lookup(&self) -> bool {
        self.lookup.is_some()
    }

    /// Decodes one entry number.
    ///
    /// # Errors
    ///
    /// * `EndOfPacket` - if the packet ends inside the codeword or the bits do
    ///   not form a codeword of this book
    pub fn decode_scalar(&self, reader: &mut BitReader<'_>) -> std::result::Result<u32, EndOfPacket> {
        match &self.decoder {
            EntryDecoder::Tree(tree) => tree.decode(reader),
            EntryDecoder::Single(entry) => {
                reader.read(1)?;
                Ok(*entry)
            }
        }
    }

    /// Decodes one entry and returns its VQ vector of `dimensions` values.
    ///
    /// # Errors
    ///
    /// * `EndOfPacket` - as for [`Self::decode_scalar`], or if the book has no
    ///   value mapping
    pub fn decode_vector(
        &self,
        reader: &mut BitReader<'_>,
    ) -> std::result::Result<&[f32], EndOfPacket> {
        let entry = self.decode_scalar(reader)? as usize;
        let lookup = self.lookup.as_deref().ok_or(EndOfPacket)?;
        let start = entry * self.dimensions;

        Ok(&lookup[start..start + self.dimensions])
    }
}

fn read_lengths(reader: &mut BitReader<'_>, entries: usize) -> Result<Vec<u8>> {
    let ordered = reader.read_bool()?;

    if ordered {
        let mut lengths = vec![0_u8; entries];
        let mut current_entry = 0_usize;
        let mut current_length = reader.read(5)? + 1;

        while current_entry < entries {
            if current_length > 32 {
                return Err(Error::header("ordered codebook length exceeds 32 bits"));
            }

            #[allow(clippy::cast_possible_wrap)]
            let number = reader.read_usize(ilog((entries - current_entry) as i64))?;
            if current_entry + number > entries {
                return Err(Error::header("ordered codebook overruns its entry count"));
            }

            #[allow(clippy::cast_possible_truncation)]
            lengths[current_entry..current_entry + number].fill(current_length as u8);
            current_entry += number;
            current_length += 1;
        }

        return Ok(lengths);
    }

    let sparse = reader.read_bool()?;
    let minimum_bits = if sparse { 1 } else { 5 };
    if entries.saturating_mul(minimum_bits) > reader.remaining_bits() {
        return Err(Error::header("codebook entry count exceeds header"));
    }

    let mut lengths = vec![0_u8; entries];
    for length in &mut lengths {
        if !sparse || reader.read_bool()? {
            #[allow(clippy::cast_possible_truncation)]
            {
                *length = reader.read(5)? as u8 + 1;
            }
        }
    }

    Ok(lengths)
}

fn read_lookup(
    reader: &mut BitReader<'_>,
    dimensions: usize,
    entries: usize,
) -> Result<Option<Vec<f32>>> {
    let lookup_type = reader.read(4)?;

    match lookup_type {
        0 => return Ok(None),
        1 | 2 => {}
        other => return Err(Error::header(format!("unknown codebook lookup type {other}"))),
    }

    let minimum = float32_unpack(reader.read(32)?);
    let delta = float32_unpack(reader.read(32)?);
    let value_bits = reader.read(4)? + 1;
    let sequence_p = reader.read_bool()?;

    #[allow(clippy::cast_possible_truncation)]
    let lookup_values = if lookup_type == 1 {
        lookup1_values(entries as u32, dimensions as u16) as usize
    } else {
        entries * dimensions
    };

    if lookup_values.saturating_mul(value_bits as usize) > reader.remaining_bits()
        || entries.saturating_mul(dimensions) > MAX_LOOKUP_ELEMENTS
    {
        return Err(Error::header("codebook lookup table exceeds header"));
    }

    let multiplicands = (0..lookup_values)
        .map(|_| reader.read(value_bits))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut table = Vec::with_capacity(entries * dimensions);

    for entry in 0..entries {
        let mut last = 0.0_f32;

        if lookup_type == 1 {
            let mut index_divisor = 1_usize;
            for _ in 0..dimensions {
                let offset = (entry / index_divisor) % lookup_values;
                #[allow(clippy::cast_precision_loss)]
                let value = (multiplicands[offset] as f32).mul_add(delta, minimum) + last;
                if sequence_p {
                    last = value;
                }
                table.push(value);
                index_divisor = index_divisor.saturating_mul(lookup_values);
            }
        } else {
            for &multiplicand in &multiplicands[entry * dimensions..(entry + 1) * dimensions] {
                #[allow(clippy::cast_precision_loss)]
                let value = (multiplicand as f32).mul_add(delta, minimum) + last;
                if sequence_p {
                    last = value;
                }
                table.push(value);
            }
        }
    }

    Ok(Some(table))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::bitpack::testing::BitWriter as Bits;

    fn header(bits: &mut Bits, dimensions: u32, entries: u32) {
        bits.put(CODEBOOK_SYNC, 24).put(dimensions, 16).put(entries, 24);
    }

    #[test]
    fn codewords_follow_entry_order() {
        let codewords = assign_codewords(&[2, 4, 4, 4, 4, 2, 3, 3]).unwrap();
        assert_eq!(
            codewords,
            vec![0b00, 0b0100, 0b0101, 0b0110, 0b0111, 0b10, 0b110, 0b111]
        );
    }

    #[test]
    fn rejects_over_and_under_specified_trees() {
        assert!(assign_codewords(&[1, 1, 1]).is_err());
        assert!(assign_codewords(&[1, 2]).is_err());
        assert!(assign_codewords(&[0, 3, 0]).is_ok());
    }

    #[test]
    fn decodes_scalar_entries_from_unordered_book() {
        let mut bits = Bits::default();
        header(&mut bits, 1, 4);
        bits.put(0, 1).put(0, 1);
        for length in [1, 2, 3, 3] {
            bits.put(length - 1, 5);
        }
        bits.put(0, 4);
        bits.codeword(0b110, 3).codeword(0b0, 1).codeword(0b10, 2).codeword(0b111, 3);

        let mut reader = BitReader::new(&bits.bytes());
        let book = Codebook::read(&mut reader).unwrap();

        assert_eq!(book.entries(), 4);
        assert!(!book.has_lookup());
        assert_eq!(book.decode_scalar(&mut reader), Ok(2));
        assert_eq!(book.decode_scalar(&mut reader), Ok(0));
        assert_eq!(book.decode_scalar(&mut reader), Ok(1));
        assert_eq!(book.decode_scalar(&mut reader), Ok(3));
    }

    #[test]
    fn decodes_ordered_lengths() {
        let mut bits = Bits::default();
        header(&mut bits, 1, 4);
        // ordered, start length 2, 4 entries of length 2
        bits.put(1, 1).put(1, 5).put(4, 3);
        bits.put(0, 4);

        let mut reader = BitReader::new(&bits.bytes());
        let book = Codebook::read(&mut reader).unwrap();

        let mut bits = Bits::default();
        bits.codeword(0b11, 2).codeword(0b01, 2);
        let mut reader = BitReader::new(&bits.bytes());
        assert_eq!(book.decode_scalar(&mut reader), Ok(3));
        assert_eq!(book.decode_scalar(&mut reader), Ok(1));
    }

    #[test]
    fn sparse_book_skips_unused_entries() {
        let mut bits = Bits::default();
        header(&mut bits, 1, 3);
        bits.put(0, 1).put(1, 1);
        bits.put(1, 1).put(0, 5);
        bits.put(0, 1);
        bits.put(1, 1).put(0, 5);
        bits.put(0, 4);

        let mut reader = BitReader::new(&bits.bytes());
        let book = Codebook::read(&mut reader).unwrap();

        let mut bits = Bits::default();
        bits.codeword(1, 1).codeword(0, 1);
        let mut reader = BitReader::new(&bits.bytes());
        assert_eq!(book.decode_scalar(&mut reader), Ok(2));
        assert_eq!(book.decode_scalar(&mut reader), Ok(0));
    }

    #[test]
    fn single_entry_book_consumes_one_bit() {
        let mut bits = Bits::default();
        header(&mut bits, 1, 2);
        bits.put(0, 1).put(1, 1);
        bits.put(0, 1);
        bits.put(1, 1).put(0, 5);
        bits.put(0, 4);

        let mut reader = BitReader::new(&bits.bytes());
        let book = Codebook::read(&mut reader).unwrap();

        let data = [0b10];
        let mut reader = BitReader::new(&data);
        assert_eq!(book.decode_scalar(&mut reader), Ok(1));
        assert_eq!(book.decode_scalar(&mut reader), Ok(1));
        assert_eq!(reader.remaining_bits(), 6);
    }

    #[test]
    fn lookup_type_1_spreads_entry_over_dimensions() {
        let mut bits = Bits::default();
        header(&mut bits, 2, 4);
        bits.put(0, 1).put(0, 1);
        for _ in 0..4 {
            bits.put(1, 5);
        }
        bits.put(1, 4);
        // minimum -1.0, delta 2.0, 1-bit values, no sequence
        bits.put(0x8000_0000 | (788 << 21) | 1, 32);
        bits.put((788 << 21) | 2, 32);
        bits.put(0, 4).put(0, 1);
        bits.put(0, 1).put(1, 1);

        let mut reader = BitReader::new(&bits.bytes());
        let book = Codebook::read(&mut reader).unwrap();

        let mut bits = Bits::default();
        bits.codeword(0b01, 2).codeword(0b10, 2);
        let mut reader = BitReader::new(&bits.bytes());
        assert_eq!(book.decode_vector(&mut reader).unwrap(), &[1.0, -1.0]);
        assert_eq!(book.decode_vector(&mut reader).unwrap(), &[-1.0, 1.0]);
    }

    #[test]
    fn lookup_type_2_with_sequence_accumulates() {
        let mut bits = Bits::default();
        header(&mut bits, 3, 2);
        bits.put(0, 1).put(0, 1);
        bits.put(0, 5).put(0, 5);
        bits.put(2, 4);
        // minimum 1.0, delta 1.0, 2-bit values, sequence_p
        bits.put((788 << 21) | 1, 32);
        bits.put((788 << 21) | 1, 32);
        bits.put(1, 4).put(1, 1);
        for value in [0, 1, 2, 3, 0, 0] {
            bits.put(value, 2);
        }

        let mut reader = BitReader::new(&bits.bytes());
        let book = Codebook::read(&mut reader).unwrap();

        let data = [0b01];
        let mut reader = BitReader::new(&data);
        assert_eq!(book.decode_vector(&mut reader).unwrap(), &[4.0, 5.0, 6.0]);
        assert_eq!(book.decode_vector(&mut reader).unwrap(), &[1.0, 3.0, 6.0]);
    }

    #[test]
    fn rejects_bad_sync_pattern() {
        let mut bits = Bits::default();
        bits.put(0x0056_4343, 24).put(1, 16).put(2, 24);
        let mut reader = BitReader::new(&bits.bytes());

        assert!(matches!(
            Codebook::read(&mut reader),
            Err(Error::MalformedHeader(_))
        ));
    }
}
