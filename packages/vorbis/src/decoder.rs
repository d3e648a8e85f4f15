//! The Vorbis decoding engine.
//!
//! [`VorbisDecoder`] takes the three Vorbis headers once and then turns audio
//! packets, in stream order, into PCM. Each packet yields the audio between
//! the centre of the previous block and the centre of its own block, so the
//! first packet after setup or [`VorbisDecoder::reset`] yields no frames.

use std::mem;

use log::{debug, trace};

use crate::{
    Decoder,
    bitpack::{BitReader, EndOfPacket},
    error::{Error, Result},
    header::{
        IDENTIFICATION_HEADER_LEN, PACKET_TYPE_COMMENT, VorbisComment, VorbisInfo, parse_comment,
        parse_identification,
    },
    mdct::Imdct,
    setup::Setup,
    window::Windows,
};

/// Sample encoding of the byte output of [`Decoder::decode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian integers.
    #[default]
    S16,
    /// 32-bit little-endian IEEE floats in `[-1.0, 1.0]`.
    F32,
}

impl SampleFormat {
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16 => 2,
            Self::F32 => 4,
        }
    }
}

/// Decoder configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VorbisDecoderOptions {
    pub sample_format: SampleFormat,
}

/// Planar PCM decoded from one packet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmFrames {
    channels: Vec<Vec<f32>>,
}

impl PcmFrames {
    #[must_use]
    pub const fn new(channels: Vec<Vec<f32>>) -> Self {
        Self { channels }
    }

    /// Number of samples per channel.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    #[must_use]
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    #[must_use]
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Keeps at most `frames` samples per channel.
    pub fn truncate(&mut self, frames: usize) {
        for channel in &mut self.channels {
            channel.truncate(frames);
        }
    }

    /// Interleaves the channels into little-endian bytes.
    #[must_use]
    pub fn to_bytes(&self, format: SampleFormat) -> Vec<u8> {
        let frames = self.frames();
        let mut bytes =
            Vec::with_capacity(frames * self.channel_count() * format.bytes_per_sample());

        for i in 0..frames {
            for channel in &self.channels {
                let sample = channel[i];
                match format {
                    SampleFormat::S16 => bytes.extend_from_slice(&to_s16(sample).to_le_bytes()),
                    SampleFormat::F32 => bytes.extend_from_slice(&sample.to_le_bytes()),
                }
            }
        }

        bytes
    }
}

/// Rounds a float sample to 16 bits as `floor(x * 32767 + 0.5)`, saturating.
#[must_use]
pub fn to_s16(sample: f32) -> i16 {
    let value = sample.mul_add(32767.0, 0.5).floor().clamp(-32768.0, 32767.0);

    #[allow(clippy::cast_possible_truncation)]
    let value = value as i16;
    value
}

/// Windowed second half of the previous block, per channel.
#[derive(Debug, Clone)]
struct Overlap {
    block_size: usize,
    tail: Vec<Vec<f32>>,
}

/// Tables and inter-packet state of an initialized decoder.
#[derive(Debug, Clone)]
struct Stream {
    info: VorbisInfo,
    comment: VorbisComment,
    setup: Setup,
    windows: Windows,
    imdct: [Imdct; 2],
    overlap: Option<Overlap>,
}

impl Stream {
    fn new(info: VorbisInfo, comment: VorbisComment, setup: Setup) -> Self {
        let windows = Windows::new(info.block_sizes);
        let imdct = info.block_sizes.map(Imdct::new);

        Self {
            info,
            comment,
            setup,
            windows,
            imdct,
            overlap: None,
        }
    }

    fn decode(&mut self, packet: &[u8]) -> Result<PcmFrames> {
        let (block, n) = self.synthesize(packet)?;
        let channels = usize::from(self.info.channels);

        let frames = match &self.overlap {
            Some(previous) => overlap_add(previous, &block, n),
            None => vec![Vec::new(); channels],
        };

        self.overlap = Some(Overlap {
            block_size: n,
            tail: block.into_iter().map(|mut samples| samples.split_off(n / 2)).collect(),
        });

        Ok(PcmFrames::new(frames))
    }

    /// Decodes one audio packet into windowed time-domain blocks, one per
    /// channel. Touches no decoder state.
    fn synthesize(&self, packet: &[u8]) -> Result<(Vec<Vec<f32>>, usize)> {
        let truncated = |_: EndOfPacket| Error::packet("audio packet header is truncated");

        if packet.is_empty() {
            return Err(Error::packet("empty packet"));
        }

        let mut reader = BitReader::new(packet);
        if reader.read_bool().map_err(truncated)? {
            return Err(Error::packet("not an audio packet"));
        }

        let setup = &self.setup;
        let mode_number = reader.read_usize(setup.mode_bits()).map_err(truncated)?;
        let mode = setup
            .modes
            .get(mode_number)
            .ok_or_else(|| Error::packet(format!("mode {mode_number} out of range")))?;

        let long_block = mode.block_flag;
        let n = self.info.block_sizes[usize::from(long_block)];
        let (previous_long, next_long) = if long_block {
            (
                reader.read_bool().map_err(truncated)?,
                reader.read_bool().map_err(truncated)?,
            )
        } else {
            (false, false)
        };

        let mapping = &setup.mappings[mode.mapping];
        let channels = usize::from(self.info.channels);
        let half = n / 2;

        let mut floors = Vec::with_capacity(channels);
        for &submap in &mapping.mux {
            let floor = &setup.floors[mapping.submaps[submap].floor];
            floors.push(floor.decode(&mut reader, &setup.codebooks)?);
        }

        let mut no_residue: Vec<bool> = floors.iter().map(Option::is_none).collect();
        for step in &mapping.coupling {
            if !no_residue[step.magnitude] || !no_residue[step.angle] {
                no_residue[step.magnitude] = false;
                no_residue[step.angle] = false;
            }
        }

        let mut spectra = vec![vec![0.0_f32; half]; channels];
        for (index, submap) in mapping.submaps.iter().enumerate() {
            let members: Vec<usize> = (0..channels)
                .filter(|&channel| mapping.mux[channel] == index)
                .collect();

            let mut vectors: Vec<Vec<f32>> = members
                .iter()
                .map(|&channel| mem::take(&mut spectra[channel]))
                .collect();
            let do_not_decode: Vec<bool> =
                members.iter().map(|&channel| no_residue[channel]).collect();

            setup.residues[submap.residue].decode(
                &mut reader,
                &setup.codebooks,
                &mut vectors,
                &do_not_decode,
                half,
            );

            for (&channel, vector) in members.iter().zip(vectors) {
                spectra[channel] = vector;
            }
        }

        for step in mapping.coupling.iter().rev() {
            for i in 0..half {
                let magnitude = spectra[step.magnitude][i];
                let angle = spectra[step.angle][i];
                let (magnitude, angle) = uncouple(magnitude, angle);
                spectra[step.magnitude][i] = magnitude;
                spectra[step.angle][i] = angle;
            }
        }

        let window = self.windows.get(long_block, previous_long, next_long);
        let imdct = &self.imdct[usize::from(long_block)];
        let mut curve = vec![0.0_f32; half];
        let mut block = Vec::with_capacity(channels);

        for (channel, spectrum) in spectra.iter_mut().enumerate() {
            let mut samples = vec![0.0_f32; n];

            if let Some(packet) = &floors[channel] {
                let floor = &setup.floors[mapping.submaps[mapping.mux[channel]].floor];
                floor.synthesize(packet, long_block, &mut curve);
                for (value, gain) in spectrum.iter_mut().zip(&curve) {
                    *value *= gain;
                }

                imdct.inverse(spectrum, &mut samples);
                for (sample, weight) in samples.iter_mut().zip(window) {
                    *sample *= weight;
                }
            }

            block.push(samples);
        }

        trace!(
            "Decoded audio packet: mode={mode_number} block_size={n} previous_long={previous_long} next_long={next_long}"
        );

        Ok((block, n))
    }
}

/// Inverts one square-polar coupling step, returning the restored
/// magnitude and angle channel values.
fn uncouple(magnitude: f32, angle: f32) -> (f32, f32) {
    if magnitude > 0.0 {
        if angle > 0.0 {
            (magnitude, magnitude - angle)
        } else {
            (magnitude + angle, magnitude)
        }
    } else if angle > 0.0 {
        (magnitude, magnitude + angle)
    } else {
        (magnitude - angle, magnitude)
    }
}

/// Sums the previous block's tail with the rising half of the current
/// block, covering the span between the two block centres.
fn overlap_add(previous: &Overlap, block: &[Vec<f32>], n: usize) -> Vec<Vec<f32>> {
    let pn = previous.block_size;
    let len = pn / 4 + n / 4;

    previous
        .tail
        .iter()
        .zip(block)
        .map(|(tail, current)| {
            let mut out = vec![0.0_f32; len];

            for (value, sample) in out.iter_mut().zip(tail) {
                *value += sample;
            }

            if n >= pn {
                let skip = n / 4 - pn / 4;
                for (value, sample) in out.iter_mut().zip(&current[skip..n / 2]) {
                    *value += sample;
                }
            } else {
                let offset = pn / 4 - n / 4;
                for (value, sample) in out[offset..].iter_mut().zip(&current[..n / 2]) {
                    *value += sample;
                }
            }

            out
        })
        .collect()
}

/// Splits a merged header blob into identification, optional comment and
/// setup headers and parses them.
fn parse_headers(header: &[u8]) -> Result<(VorbisInfo, VorbisComment, Setup)> {
    let (identification, rest) = header.split_at(IDENTIFICATION_HEADER_LEN.min(header.len()));
    let info = parse_identification(identification)?;

    let (comment, rest) = if rest.first() == Some(&PACKET_TYPE_COMMENT) {
        let (comment, len) = parse_comment(rest)?;
        (comment, &rest[len..])
    } else {
        (VorbisComment::default(), rest)
    };

    let setup = Setup::read(rest, &info)?;

    Ok((info, comment, setup))
}

/// Native Vorbis I decoder.
#[derive(Debug, Clone, Default)]
pub struct VorbisDecoder {
    options: VorbisDecoderOptions,
    stream: Option<Stream>,
}

impl VorbisDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_options(options: VorbisDecoderOptions) -> Self {
        Self {
            options,
            stream: None,
        }
    }

    #[must_use]
    pub const fn options(&self) -> VorbisDecoderOptions {
        self.options
    }

    /// Whether headers have been accepted.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.stream.is_some()
    }

    /// Stream parameters, once initialized.
    #[must_use]
    pub fn info(&self) -> Option<&VorbisInfo> {
        self.stream.as_ref().map(|stream| &stream.info)
    }

    /// Comment header contents, once initialized. Empty when the merged
    /// header omitted the comment packet.
    #[must_use]
    pub fn comment(&self) -> Option<&VorbisComment> {
        self.stream.as_ref().map(|stream| &stream.comment)
    }

    /// Initializes the decoder from the three header packets.
    ///
    /// # Errors
    ///
    /// * `MalformedHeader` - if any header fails validation. The decoder is
    ///   left uninitialized.
    pub fn setup_packets(
        &mut self,
        identification: &[u8],
        comment: &[u8],
        setup: &[u8],
    ) -> Result<()> {
        self.stream = None;

        let info = parse_identification(identification)?;
        let (comment, _) = parse_comment(comment)?;
        let setup = Setup::read(setup, &info)?;

        self.install(info, comment, setup);
        Ok(())
    }

    fn install(&mut self, info: VorbisInfo, comment: VorbisComment, setup: Setup) {
        debug!(
            "Vorbis decoder initialized: channels={} sample_rate={} block_sizes={:?}",
            info.channels, info.sample_rate, info.block_sizes
        );
        self.stream = Some(Stream::new(info, comment, setup));
    }

    /// Decodes one audio packet into planar float samples.
    ///
    /// # Errors
    ///
    /// * `DecoderNotInitialized` - if no setup has succeeded
    /// * `MalformedPacket` - if the packet is empty, not an audio packet, or
    ///   inconsistent with the setup tables. Decoder state is unchanged.
    pub fn decode_frames(&mut self, packet: &[u8]) -> Result<PcmFrames> {
        let stream = self.stream.as_mut().ok_or(Error::DecoderNotInitialized)?;
        stream.decode(packet)
    }

    /// Forgets the previous block so decoding can restart at any packet. The
    /// next packet yields no frames.
    pub fn reset(&mut self) {
        if let Some(stream) = &mut self.stream {
            stream.overlap = None;
        }
    }
}

impl Decoder for VorbisDecoder {
    /// Accepts the identification header, optionally followed by the comment
    /// header, followed by the setup header, concatenated.
    fn setup(&mut self, header: &[u8]) -> Result<()> {
        self.stream = None;

        let (info, comment, setup) = parse_headers(header)?;
        self.install(info, comment, setup);
        Ok(())
    }

    /// Returns interleaved little-endian samples in the configured
    /// [`SampleFormat`].
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        let format = self.options.sample_format;
        Ok(self.decode_frames(packet)?.to_bytes(format))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(1.0, 0.5 => (1.0, 0.5); "positive magnitude positive angle")]
    #[test_case(1.0, -0.5 => (0.5, 1.0); "positive magnitude negative angle")]
    #[test_case(-1.0, 0.5 => (-1.0, -0.5); "negative magnitude positive angle")]
    #[test_case(-1.0, -0.5 => (-0.5, -1.0); "negative magnitude negative angle")]
    fn uncouple_restores_channels(magnitude: f32, angle: f32) -> (f32, f32) {
        uncouple(magnitude, angle)
    }

    #[test_case(0.0 => 0)]
    #[test_case(1.0 => 32767)]
    #[test_case(-1.0 => -32767)]
    #[test_case(2.0 => 32767)]
    #[test_case(-2.0 => -32768)]
    #[test_case(0.5 => 16384)]
    fn converts_to_s16(sample: f32) -> i16 {
        to_s16(sample)
    }

    #[test]
    fn pcm_frames_interleave_little_endian() {
        let frames = PcmFrames::new(vec![vec![0.0, 1.0], vec![-1.0, 0.5]]);

        assert_eq!(frames.frames(), 2);
        assert_eq!(frames.channel_count(), 2);
        assert_eq!(
            frames.to_bytes(SampleFormat::S16),
            vec![0x00, 0x00, 0x01, 0x80, 0xFF, 0x7F, 0x00, 0x40]
        );

        let floats = frames.to_bytes(SampleFormat::F32);
        assert_eq!(floats.len(), 16);
        assert_eq!(floats[4..8], (-1.0_f32).to_le_bytes());
    }

    #[test]
    fn overlap_add_spans_block_centres() {
        let previous = Overlap {
            block_size: 8,
            tail: vec![vec![1.0, 1.0, 0.0, 0.0]],
        };

        let same = overlap_add(&previous, &[vec![0.5; 8]], 8);
        assert_eq!(same, vec![vec![1.5, 1.5, 0.5, 0.5]]);

        let longer = overlap_add(&previous, &[vec![0.25; 16]], 16);
        assert_eq!(longer[0].len(), 6);
        assert_eq!(longer[0], vec![1.25, 1.25, 0.25, 0.25, 0.25, 0.25]);

        let long_previous = Overlap {
            block_size: 16,
            tail: vec![vec![1.0; 8]],
        };
        let shorter = overlap_add(&long_previous, &[vec![0.5; 8]], 8);
        assert_eq!(shorter[0], vec![1.0, 1.0, 1.5, 1.5, 1.5, 1.5]);
    }

    #[test_log::test]
    fn decode_before_setup_fails() {
        let mut decoder = VorbisDecoder::new();

        assert!(matches!(
            decoder.decode(&[0x00]),
            Err(Error::DecoderNotInitialized)
        ));
        assert!(!decoder.is_initialized());
        assert!(decoder.info().is_none());
    }

    #[test_log::test]
    fn setup_rejects_missing_magic() {
        let mut decoder = VorbisDecoder::new();
        let mut header = vec![1_u8];
        header.extend_from_slice(b"xorbis");
        header.resize(64, 0);

        assert!(matches!(
            decoder.setup(&header),
            Err(Error::MalformedHeader(_))
        ));
        assert!(!decoder.is_initialized());
    }

    #[test_log::test]
    fn setup_rejects_empty_header() {
        let mut decoder = VorbisDecoder::with_options(VorbisDecoderOptions {
            sample_format: SampleFormat::F32,
        });

        assert!(matches!(decoder.setup(&[]), Err(Error::MalformedHeader(_))));
        assert_eq!(decoder.options().sample_format, SampleFormat::F32);
    }
}
