//! Synthetic Vorbis streams for validating Vorbis decoder implementations.
//!
//! This crate contains a small Vorbis encoder producing valid Vorbis I
//! streams from arbitrary PCM, so decoder output can be compared against the
//! signal that went in. The encoder uses one fixed setup (flat floor 1,
//! two-pass residue of a selectable type, optional stereo coupling) and
//! long blocks, optionally mixed with bursts of short blocks.
//!
//! # Usage
//!
//! ```rust
//! use moosicbox_vorbis_test_vectors::{EncoderConfig, encode, sine_wave};
//!
//! let signal = sine_wave(440.0, 0.5, 44_100, 4_410);
//! let stream = encode(&EncoderConfig::default(), &[signal]);
//!
//! assert_eq!(stream.total_samples, 4_410);
//! assert!(stream.raw_frames() >= 4_410);
//! ```
//!
//! # Main Types
//!
//! * [`EncoderConfig`] - Stream layout options
//! * [`EncodedStream`] - Header and audio packets of an encoded stream
//! * [`calculate_snr`] - Calculates Signal-to-Noise Ratio for quality measurement

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

pub mod bits;
mod encoder;
pub mod headers;

use std::f64::consts::TAU;

use ogg::{PacketWriteEndInfo, PacketWriter};

pub use encoder::encode;
pub use headers::{LONG_BLOCK_SIZE, SHORT_BLOCK_SIZE};

/// Audio packets per Ogg page written by [`EncodedStream::to_ogg`].
const PACKETS_PER_PAGE: usize = 4;

/// Residue type of the encoded setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResidueLayout {
    /// Residue type 0.
    Interleaved,
    /// Residue type 1.
    #[default]
    Ordered,
    /// Residue type 2.
    Coupled,
}

impl ResidueLayout {
    #[must_use]
    pub const fn residue_type(self) -> u32 {
        match self {
            Self::Interleaved => 0,
            Self::Ordered => 1,
            Self::Coupled => 2,
        }
    }

    #[must_use]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::Ordered)
    }

    #[must_use]
    pub const fn is_coupled(self) -> bool {
        matches!(self, Self::Coupled)
    }
}

/// Encoder options.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub sample_rate: u32,
    pub residue: ResidueLayout,
    /// Square-polar couples channel 0 (magnitude) with channel 1 (angle).
    pub coupling: bool,
    /// Inserts eight short blocks after every four long blocks.
    pub short_blocks: bool,
    pub vendor: String,
    /// Comment header entries, `KEY=value`.
    pub comments: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            residue: ResidueLayout::default(),
            coupling: false,
            short_blocks: false,
            vendor: "moosicbox_vorbis_test_vectors".to_string(),
            comments: Vec::new(),
        }
    }
}

/// An encoded Vorbis stream.
#[derive(Debug, Clone)]
pub struct EncodedStream {
    pub channels: u8,
    pub sample_rate: u32,
    pub identification: Vec<u8>,
    pub comment: Vec<u8>,
    pub setup: Vec<u8>,
    /// Audio packets in stream order.
    pub packets: Vec<Vec<u8>>,
    /// Block size of every audio packet.
    pub block_sizes: Vec<usize>,
    /// Length of the encoded signal, the final granule position.
    pub total_samples: u64,
}

impl EncodedStream {
    /// The three headers concatenated.
    #[must_use]
    pub fn merged_header(&self) -> Vec<u8> {
        [
            self.identification.as_slice(),
            &self.comment,
            &self.setup,
        ]
        .concat()
    }

    /// Identification and setup headers concatenated, the codec extra data
    /// layout of Symphonia's Ogg reader.
    #[must_use]
    pub fn extra_data(&self) -> Vec<u8> {
        [self.identification.as_slice(), &self.setup].concat()
    }

    /// Frames each packet yields from a decoder fed the packets in order.
    #[must_use]
    pub fn packet_frames(&self) -> Vec<usize> {
        let mut previous = None;

        self.block_sizes
            .iter()
            .map(|&size| {
                let frames = previous.map_or(0, |previous: usize| previous / 4 + size / 4);
                previous = Some(size);
                frames
            })
            .collect()
    }

    /// Frames decoded from all packets before end-of-stream trimming.
    #[must_use]
    pub fn raw_frames(&self) -> usize {
        self.packet_frames().iter().sum()
    }

    /// Granule position after every packet. The last packet carries
    /// [`Self::total_samples`].
    #[must_use]
    pub fn granule_positions(&self) -> Vec<u64> {
        let mut position = 0_u64;
        let mut positions: Vec<u64> = self
            .packet_frames()
            .into_iter()
            .map(|frames| {
                position += frames as u64;
                position
            })
            .collect();

        if let Some(last) = positions.last_mut() {
            *last = self.total_samples;
        }

        positions
    }

    /// Encapsulates the stream in Ogg pages.
    ///
    /// The identification header gets its own page, the comment and setup
    /// headers share the next, and audio packets follow four to a page.
    ///
    /// # Errors
    ///
    /// * If the Ogg writer fails
    pub fn to_ogg(&self, serial: u32) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let mut writer = PacketWriter::new(&mut bytes);

        writer.write_packet(
            self.identification.clone(),
            serial,
            PacketWriteEndInfo::EndPage,
            0,
        )?;
        writer.write_packet(
            self.comment.clone(),
            serial,
            PacketWriteEndInfo::NormalPacket,
            0,
        )?;
        writer.write_packet(self.setup.clone(), serial, PacketWriteEndInfo::EndPage, 0)?;

        let granules = self.granule_positions();
        let last = self.packets.len().saturating_sub(1);

        for (i, (packet, granule)) in self.packets.iter().zip(granules).enumerate() {
            let info = if i == last {
                PacketWriteEndInfo::EndStream
            } else if (i + 1) % PACKETS_PER_PAGE == 0 {
                PacketWriteEndInfo::EndPage
            } else {
                PacketWriteEndInfo::NormalPacket
            };
            writer.write_packet(packet.clone(), serial, info, granule)?;
        }

        drop(writer);
        Ok(bytes)
    }
}

/// A sine tone of `frames` samples.
#[must_use]
pub fn sine_wave(frequency: f32, amplitude: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
    let step = TAU * f64::from(frequency) / f64::from(sample_rate);

    (0..frames)
        .map(|i| {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            let value = (step * i as f64).sin() as f32;
            amplitude * value
        })
        .collect()
}

/// Rounds float samples to 16 bits as `floor(x * 32767 + 0.5)`, saturating.
#[must_use]
pub fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|sample| {
            let value = sample.mul_add(32767.0, 0.5).floor().clamp(-32768.0, 32767.0);
            #[allow(clippy::cast_possible_truncation)]
            let value = value as i16;
            value
        })
        .collect()
}

/// Interleaves planar channels frame by frame.
#[must_use]
pub fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.first().map_or(0, Vec::len);

    (0..frames)
        .flat_map(|i| channels.iter().map(move |channel| channel[i]))
        .collect()
}

/// Reads little-endian 16-bit samples.
#[must_use]
pub fn i16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Reads little-endian 32-bit float samples.
#[must_use]
pub fn f32_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|quad| f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect()
}

/// Calculates Signal-to-Noise Ratio (SNR) in decibels between reference and decoded signals.
///
/// SNR measures the quality of the decoded signal compared to the reference.
/// Higher SNR values indicate better quality (less noise/distortion).
///
/// # Special Return Values
///
/// * `f64::INFINITY` - Signals are identical (no noise)
/// * `f64::NEG_INFINITY` - Signals have different lengths
/// * `0.0` - Reference signal has negligible power
#[must_use]
pub fn calculate_snr(reference: &[i16], decoded: &[i16]) -> f64 {
    if reference.len() != decoded.len() {
        return f64::NEG_INFINITY;
    }

    let mut signal_power = 0.0;
    let mut noise_power = 0.0;

    for (ref_sample, dec_sample) in reference.iter().zip(decoded.iter()) {
        let ref_f = f64::from(*ref_sample);
        let dec_f = f64::from(*dec_sample);
        let error = ref_f - dec_f;

        signal_power += ref_f * ref_f;
        noise_power += error * error;
    }

    if noise_power < 1e-10 {
        return f64::INFINITY;
    }

    if signal_power < 1e-10 {
        return 0.0;
    }

    10.0 * (signal_power / noise_power).log10()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn test_snr_identical_signals() {
        let signal = vec![100, -200, 300, -400];
        let snr = calculate_snr(&signal, &signal);
        assert!(snr.is_infinite());
    }

    #[test_log::test]
    fn test_snr_different_lengths() {
        let signal1 = vec![100, -200];
        let signal2 = vec![100];
        let snr = calculate_snr(&signal1, &signal2);
        assert!(snr.is_infinite() && snr.is_sign_negative());
    }

    #[test_log::test]
    fn test_snr_calculation() {
        let reference = vec![1000, 2000, 3000];
        let decoded = vec![1010, 1990, 3005];
        let snr = calculate_snr(&reference, &decoded);
        assert!(snr > 40.0);
    }

    #[test_log::test]
    fn packet_frames_follow_block_overlaps() {
        let stream = EncodedStream {
            channels: 1,
            sample_rate: 44_100,
            identification: Vec::new(),
            comment: Vec::new(),
            setup: Vec::new(),
            packets: vec![Vec::new(); 4],
            block_sizes: vec![2048, 256, 256, 2048],
            total_samples: 1000,
        };

        assert_eq!(stream.packet_frames(), vec![0, 576, 128, 576]);
        assert_eq!(stream.raw_frames(), 1280);
        assert_eq!(stream.granule_positions(), vec![0, 576, 704, 1000]);
    }

    #[test_log::test]
    fn encodes_one_packet_per_block() {
        let signal = sine_wave(1000.0, 0.25, 8_000, 3_000);
        let stream = encode(&EncoderConfig::default(), &[signal]);

        assert_eq!(stream.packets.len(), stream.block_sizes.len());
        assert_eq!(stream.total_samples, 3_000);
        assert!(stream.raw_frames() >= 3_000);
        assert!(stream.packets.iter().all(|packet| !packet.is_empty()));
        assert_eq!(stream.identification.len(), 30);
    }

    #[test_log::test]
    fn to_i16_rounds_and_saturates() {
        assert_eq!(to_i16(&[0.0, 1.0, -1.0, 2.0, -2.0]), vec![0, 32767, -32767, 32767, -32768]);
    }

    #[test_log::test]
    fn interleaves_frames() {
        let channels = vec![vec![1.0, 2.0], vec![-1.0, -2.0]];
        assert_eq!(interleave(&channels), vec![1.0, -1.0, 2.0, -2.0]);
    }
}
