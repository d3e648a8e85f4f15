//! Setup header: codebooks, floors, residues, mappings and modes.

use log::debug;

use crate::{
    bitpack::{BitReader, ilog},
    codebook::Codebook,
    error::{Error, Result},
    floor::Floor,
    header::{PACKET_TYPE_SETUP, VorbisInfo, read_common_header},
    residue::Residue,
};

/// Floor and residue used by one submap of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submap {
    pub floor: usize,
    pub residue: usize,
}

/// A channel coupling step: magnitude and angle channel indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouplingStep {
    pub magnitude: usize,
    pub angle: usize,
}

/// Type 0 channel mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub coupling: Vec<CouplingStep>,
    /// Submap index of every channel.
    pub mux: Vec<usize>,
    pub submaps: Vec<Submap>,
}

/// A packet mode: block size flag and mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub block_flag: bool,
    pub mapping: usize,
}

/// Decode tables from the setup header.
#[derive(Debug, Clone)]
pub struct Setup {
    pub codebooks: Vec<Codebook>,
    pub floors: Vec<Floor>,
    pub residues: Vec<Residue>,
    pub mappings: Vec<Mapping>,
    pub modes: Vec<Mode>,
}

impl Setup {
    /// Parses a setup header for a stream described by `info`.
    ///
    /// # Errors
    ///
    /// * `MalformedHeader` - wrong packet type or magic, invalid codebooks,
    ///   floors, residues, mappings or modes, indices out of range, non-zero
    ///   reserved fields, or a cleared framing bit
    pub fn read(data: &[u8], info: &VorbisInfo) -> Result<Self> {
        let mut reader = BitReader::new(data);
        read_common_header(&mut reader, PACKET_TYPE_SETUP)?;

        let codebook_count = reader.read_usize(8)? + 1;
        let codebooks = (0..codebook_count)
            .map(|_| Codebook::read(&mut reader))
            .collect::<Result<Vec<_>>>()?;

        let time_count = reader.read_usize(6)? + 1;
        for _ in 0..time_count {
            if reader.read(16)? != 0 {
                return Err(Error::header("time domain transform must be zero"));
            }
        }

        let floor_count = reader.read_usize(6)? + 1;
        let floors = (0..floor_count)
            .map(|_| Floor::read(&mut reader, &codebooks, info.block_sizes))
            .collect::<Result<Vec<_>>>()?;

        let residue_count = reader.read_usize(6)? + 1;
        let residues = (0..residue_count)
            .map(|_| Residue::read(&mut reader, &codebooks))
            .collect::<Result<Vec<_>>>()?;

        let mapping_count = reader.read_usize(6)? + 1;
        let mappings = (0..mapping_count)
            .map(|_| read_mapping(&mut reader, info.channels.into(), floor_count, residue_count))
            .collect::<Result<Vec<_>>>()?;

        let mode_count = reader.read_usize(6)? + 1;
        let modes = (0..mode_count)
            .map(|_| read_mode(&mut reader, mapping_count))
            .collect::<Result<Vec<_>>>()?;

        if !reader.read_bool()? {
            return Err(Error::header("setup framing bit not set"));
        }

        debug!(
            "Vorbis setup: codebooks={codebook_count} floors={floor_count} residues={residue_count} mappings={mapping_count} modes={mode_count}"
        );

        Ok(Self {
            codebooks,
            floors,
            residues,
            mappings,
            modes,
        })
    }

    /// Bits used to code the mode number at the start of an audio packet.
    #[must_use]
    pub fn mode_bits(&self) -> u32 {
        #[allow(clippy::cast_possible_wrap)]
        ilog(self.modes.len() as i64 - 1)
    }
}

fn read_mapping(
    reader: &mut BitReader<'_>,
    channels: usize,
    floor_count: usize,
    residue_count: usize,
) -> Result<Mapping> {
    let mapping_type = reader.read(16)?;
    if mapping_type != 0 {
        return Err(Error::header(format!("unsupported mapping type {mapping_type}")));
    }

    let submap_count = if reader.read_bool()? {
        reader.read_usize(4)? + 1
    } else {
        1
    };

    let mut coupling = Vec::new();
    if reader.read_bool()? {
        let steps = reader.read_usize(8)? + 1;
        #[allow(clippy::cast_possible_wrap)]
        let bits = ilog(channels as i64 - 1);

        for _ in 0..steps {
            let magnitude = reader.read_usize(bits)?;
            let angle = reader.read_usize(bits)?;

            if magnitude == angle || magnitude >= channels || angle >= channels {
                return Err(Error::header(format!(
                    "invalid coupling step {magnitude}/{angle} for {channels} channels"
                )));
            }
            coupling.push(CouplingStep { magnitude, angle });
        }
    }

    if reader.read(2)? != 0 {
        return Err(Error::header("mapping reserved field must be zero"));
    }

    let mux = if submap_count > 1 {
        (0..channels)
            .map(|_| {
                let submap = reader.read_usize(4)?;
                if submap >= submap_count {
                    return Err(Error::header(format!("mapping mux {submap} out of range")));
                }
                Ok(submap)
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        vec![0; channels]
    };

    let mut submaps = Vec::with_capacity(submap_count);
    for _ in 0..submap_count {
        reader.read(8)?;
        let floor = reader.read_usize(8)?;
        let residue = reader.read_usize(8)?;

        if floor >= floor_count {
            return Err(Error::header(format!("mapping floor {floor} out of range")));
        }
        if residue >= residue_count {
            return Err(Error::header(format!("mapping residue {residue} out of range")));
        }
        submaps.push(Submap { floor, residue });
    }

    Ok(Mapping {
        coupling,
        mux,
        submaps,
    })
}

fn read_mode(reader: &mut BitReader<'_>, mapping_count: usize) -> Result<Mode> {
    let block_flag = reader.read_bool()?;
    let window_type = reader.read(16)?;
    let transform_type = reader.read(16)?;
    let mapping = reader.read_usize(8)?;

    if window_type != 0 || transform_type != 0 {
        return Err(Error::header("mode window and transform types must be zero"));
    }
    if mapping >= mapping_count {
        return Err(Error::header(format!("mode mapping {mapping} out of range")));
    }

    Ok(Mode {
        block_flag,
        mapping,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{bitpack::testing::BitWriter, header::VORBIS_MAGIC};

    fn info(channels: u8) -> VorbisInfo {
        VorbisInfo {
            channels,
            sample_rate: 44_100,
            bitrate_maximum: 0,
            bitrate_nominal: 0,
            bitrate_minimum: 0,
            block_sizes: [256, 2048],
        }
    }

    /// Minimal valid setup: one flag codebook, one floor 1 without
    /// partitions, one residue 1 with an empty cascade.
    fn setup_header(mapping: impl FnOnce(&mut BitWriter), mode_reserved: u32) -> Vec<u8> {
        let mut bits = BitWriter::default();
        bits.put(u32::from(PACKET_TYPE_SETUP), 8);
        for &byte in VORBIS_MAGIC {
            bits.put(u32::from(byte), 8);
        }

        bits.put(0, 8);
        bits.put(0x0056_4342, 24).put(1, 16).put(2, 24);
        bits.put(0, 1).put(0, 1).put(0, 5).put(0, 5).put(0, 4);

        bits.put(0, 6).put(0, 16);

        bits.put(0, 6).put(1, 16);
        bits.put(0, 5).put(1, 2).put(8, 4);

        bits.put(0, 6).put(1, 16);
        bits.put(0, 24).put(256, 24).put(15, 24).put(0, 6).put(0, 8);
        bits.put(0, 3).put(0, 1);

        bits.put(0, 6).put(0, 16);
        mapping(&mut bits);

        bits.put(1, 6);
        bits.put(0, 1).put(mode_reserved, 16).put(0, 16).put(0, 8);
        bits.put(1, 1).put(0, 16).put(0, 16).put(0, 8);
        bits.put(1, 1);

        bits.bytes().to_vec()
    }

    fn stereo_coupled_mapping(bits: &mut BitWriter) {
        bits.put(0, 1);
        bits.put(1, 1).put(0, 8).put(0, 1).put(1, 1);
        bits.put(0, 2);
        bits.put(0, 8).put(0, 8).put(0, 8);
    }

    #[test_log::test]
    fn parses_minimal_setup() {
        let setup = Setup::read(&setup_header(stereo_coupled_mapping, 0), &info(2)).unwrap();

        assert_eq!(setup.codebooks.len(), 1);
        assert_eq!(setup.floors.len(), 1);
        assert_eq!(setup.residues.len(), 1);
        assert_eq!(
            setup.mappings,
            vec![Mapping {
                coupling: vec![CouplingStep {
                    magnitude: 0,
                    angle: 1
                }],
                mux: vec![0, 0],
                submaps: vec![Submap {
                    floor: 0,
                    residue: 0
                }],
            }]
        );
        assert_eq!(
            setup.modes,
            vec![
                Mode {
                    block_flag: false,
                    mapping: 0
                },
                Mode {
                    block_flag: true,
                    mapping: 0
                }
            ]
        );
        assert_eq!(setup.mode_bits(), 1);
    }

    #[test_log::test]
    fn rejects_non_zero_window_type() {
        let result = Setup::read(&setup_header(stereo_coupled_mapping, 1), &info(2));
        assert!(matches!(result, Err(Error::MalformedHeader(_))));
    }

    #[test_log::test]
    fn rejects_coupling_a_channel_with_itself() {
        let header = setup_header(
            |bits| {
                bits.put(0, 1);
                bits.put(1, 1).put(0, 8).put(1, 1).put(1, 1);
                bits.put(0, 2);
                bits.put(0, 8).put(0, 8).put(0, 8);
            },
            0,
        );

        assert!(Setup::read(&header, &info(2)).is_err());
    }

    #[test_log::test]
    fn rejects_non_zero_mapping_reserved_bits() {
        let header = setup_header(
            |bits| {
                bits.put(0, 1).put(0, 1).put(2, 2);
                bits.put(0, 8).put(0, 8).put(0, 8);
            },
            0,
        );

        assert!(Setup::read(&header, &info(1)).is_err());
    }

    #[test_log::test]
    fn rejects_out_of_range_residue_index() {
        let header = setup_header(
            |bits| {
                bits.put(0, 1).put(0, 1).put(0, 2);
                bits.put(0, 8).put(0, 8).put(3, 8);
            },
            0,
        );

        assert!(Setup::read(&header, &info(1)).is_err());
    }

    #[test_log::test]
    fn rejects_truncated_setup() {
        let header = setup_header(stereo_coupled_mapping, 0);
        assert!(Setup::read(&header[..header.len() - 4], &info(2)).is_err());
    }
}
