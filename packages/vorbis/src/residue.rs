//! Residue vectors: the fine spectral structure under the floor.

use log::trace;

use crate::{
    bitpack::{BitReader, EndOfPacket},
    codebook::Codebook,
    error::{Error, Result},
};

/// How partition values are laid out in the output vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidueType {
    /// Each codebook vector is spread across the partition with a stride.
    Interleaved,
    /// Codebook vectors fill the partition in order.
    Ordered,
    /// All channels are interleaved into one vector and decoded as type 1.
    Coupled,
}

/// A residue configuration from the setup header.
#[derive(Debug, Clone)]
pub struct Residue {
    kind: ResidueType,
    begin: usize,
    end: usize,
    partition_size: usize,
    classifications: usize,
    classbook: usize,
    /// Per classification, the book used in each of the eight passes.
    books: Vec<[Option<usize>; 8]>,
}

impl Residue {
    /// Reads one residue configuration.
    ///
    /// # Errors
    ///
    /// * `MalformedHeader` - unknown residue type, books out of range or a
    ///   cascade book without a value mapping
    pub fn read(reader: &mut BitReader<'_>, codebooks: &[Codebook]) -> Result<Self> {
        let kind = match reader.read(16)? {
            0 => ResidueType::Interleaved,
            1 => ResidueType::Ordered,
            2 => ResidueType::Coupled,
            other => return Err(Error::header(format!("unsupported residue type {other}"))),
        };

        let begin = reader.read_usize(24)?;
        let end = reader.read_usize(24)?;
        let partition_size = reader.read_usize(24)? + 1;
        let classifications = reader.read_usize(6)? + 1;
        let classbook = reader.read_usize(8)?;

        match codebooks.get(classbook) {
            Some(book) if book.dimensions() > 0 => {}
            _ => {
                return Err(Error::header(format!(
                    "residue classbook {classbook} is invalid"
                )));
            }
        }

        let mut cascades = Vec::with_capacity(classifications);
        for _ in 0..classifications {
            let low = reader.read(3)?;
            let high = if reader.read_bool()? { reader.read(5)? } else { 0 };
            cascades.push((high << 3) | low);
        }

        let mut books = Vec::with_capacity(classifications);
        for cascade in cascades {
            let mut passes = [None; 8];
            for (pass, slot) in passes.iter_mut().enumerate() {
                if cascade & (1 << pass) == 0 {
                    continue;
                }

                let book = reader.read_usize(8)?;
                match codebooks.get(book) {
                    Some(codebook) if codebook.has_lookup() => *slot = Some(book),
                    Some(_) => {
                        return Err(Error::header(format!(
                            "residue book {book} has no value mapping"
                        )));
                    }
                    None => {
                        return Err(Error::header(format!("residue book {book} out of range")));
                    }
                }
            }
            books.push(passes);
        }

        trace!(
            "Residue: type={kind:?} begin={begin} end={end} partition_size={partition_size} classifications={classifications}"
        );

        Ok(Self {
            kind,
            begin,
            end,
            partition_size,
            classifications,
            classbook,
            books,
        })
    }

    #[must_use]
    pub const fn kind(&self) -> ResidueType {
        self.kind
    }

    /// Decodes residue values for the channels of one submap, adding them
    /// into `vectors` (each `n` long). Channels flagged in `do_not_decode`
    /// are left untouched. Running out of packet stops decoding and keeps
    /// whatever was decoded so far.
    pub fn decode(
        &self,
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
        vectors: &mut [Vec<f32>],
        do_not_decode: &[bool],
        n: usize,
    ) {
        if self.kind != ResidueType::Coupled {
            if self
                .decode_vectors(reader, codebooks, vectors, do_not_decode, n)
                .is_err()
            {
                trace!("Residue decode reached end of packet");
            }
            return;
        }

        let channels = vectors.len();
        if channels == 0 || do_not_decode.iter().all(|&skip| skip) {
            return;
        }

        let mut interleaved = [vec![0.0_f32; n * channels]];
        if self
            .decode_vectors(reader, codebooks, &mut interleaved, &[false], n * channels)
            .is_err()
        {
            trace!("Residue decode reached end of packet");
        }

        for (i, frame) in interleaved[0].chunks_exact(channels).enumerate() {
            for (vector, &value) in vectors.iter_mut().zip(frame) {
                vector[i] += value;
            }
        }
    }

    fn decode_vectors(
        &self,
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
        vectors: &mut [Vec<f32>],
        do_not_decode: &[bool],
        size: usize,
    ) -> std::result::Result<(), EndOfPacket> {
        let begin = self.begin.min(size);
        let end = self.end.min(size);
        let partitions = end.saturating_sub(begin) / self.partition_size;
        if partitions == 0 {
            return Ok(());
        }

        let classbook = &codebooks[self.classbook];
        let per_codeword = classbook.dimensions();
        let mut classes = vec![vec![0_usize; partitions + per_codeword]; vectors.len()];

        for pass in 0..8 {
            let mut partition = 0;

            while partition < partitions {
                if pass == 0 {
                    for (channel, classes) in classes.iter_mut().enumerate() {
                        if do_not_decode[channel] {
                            continue;
                        }

                        let mut word = classbook.decode_scalar(reader)? as usize;
                        for i in (0..per_codeword).rev() {
                            classes[partition + i] = word % self.classifications;
                            word /= self.classifications;
                        }
                    }
                }

                for _ in 0..per_codeword {
                    if partition >= partitions {
                        break;
                    }

                    let offset = begin + partition * self.partition_size;
                    for (channel, vector) in vectors.iter_mut().enumerate() {
                        if do_not_decode[channel] {
                            continue;
                        }

                        let class = classes[channel][partition];
                        if let Some(book) = self.books[class][pass] {
                            let target = &mut vector[offset..offset + self.partition_size];
                            self.decode_partition(reader, &codebooks[book], target)?;
                        }
                    }

                    partition += 1;
                }
            }
        }

        Ok(())
    }

    fn decode_partition(
        &self,
        reader: &mut BitReader<'_>,
        book: &Codebook,
        target: &mut [f32],
    ) -> std::result::Result<(), EndOfPacket> {
        let dimensions = book.dimensions();

        if self.kind == ResidueType::Interleaved {
            let step = target.len() / dimensions;
            for i in 0..step {
                let values = book.decode_vector(reader)?;
                for (j, value) in values.iter().enumerate() {
                    target[i + j * step] += value;
                }
            }
        } else {
            let mut i = 0;
            while i < target.len() {
                let values = book.decode_vector(reader)?;
                for (slot, value) in target[i..].iter_mut().zip(values) {
                    *slot += value;
                }
                i += dimensions;
            }
        }

        Ok(())
    }
}
