//! Symphonia codec adapter.
//!
//! Registers the native engine as Symphonia's Vorbis decoder. Headers are
//! read from `CodecParameters::extra_data`, which Symphonia's Ogg reader
//! fills with the identification header followed by the setup header.

use ::symphonia::core::{
    audio::{AsAudioBufferRef, AudioBuffer, AudioBufferRef, Channels, Signal, SignalSpec},
    codecs::{
        CODEC_TYPE_VORBIS, CodecDescriptor, CodecParameters, CodecRegistry,
        Decoder as SymphoniaDecoder, DecoderOptions, FinalizeResult,
    },
    errors::{Error as SymphoniaError, Result as SymphoniaResult, unsupported_error},
    formats::Packet,
    support_codec,
};
use log::{debug, warn};

use crate::{Decoder, decoder::VorbisDecoder, error::Error};

/// Symphonia channel positions in Vorbis channel order.
#[must_use]
pub fn vorbis_channel_layout(count: u8) -> Option<&'static [Channels]> {
    const FL: Channels = Channels::FRONT_LEFT;
    const FR: Channels = Channels::FRONT_RIGHT;
    const FC: Channels = Channels::FRONT_CENTRE;
    const RL: Channels = Channels::REAR_LEFT;
    const RR: Channels = Channels::REAR_RIGHT;
    const RC: Channels = Channels::REAR_CENTRE;
    const SL: Channels = Channels::SIDE_LEFT;
    const SR: Channels = Channels::SIDE_RIGHT;
    const LFE: Channels = Channels::LFE1;

    let layout: &'static [Channels] = match count {
        1 => &[FL],
        2 => &[FL, FR],
        3 => &[FL, FC, FR],
        4 => &[FL, FR, RL, RR],
        5 => &[FL, FC, FR, RL, RR],
        6 => &[FL, FC, FR, RL, RR, LFE],
        7 => &[FL, FC, FR, SL, SR, RC, LFE],
        8 => &[FL, FC, FR, SL, SR, RL, RR, LFE],
        _ => return None,
    };

    Some(layout)
}

fn to_symphonia_error(error: &Error) -> SymphoniaError {
    warn!("Vorbis decode failed: {error}");

    match error {
        Error::MalformedHeader(_) => SymphoniaError::DecodeError("vorbis: malformed header"),
        Error::MalformedPacket(_) => SymphoniaError::DecodeError("vorbis: malformed packet"),
        Error::DecoderNotInitialized => {
            SymphoniaError::DecodeError("vorbis: decoder not initialized")
        }
        #[allow(unreachable_patterns)]
        _ => SymphoniaError::DecodeError("vorbis: decode failed"),
    }
}

/// Native Vorbis decoder for Symphonia.
pub struct SymphoniaVorbisDecoder {
    params: CodecParameters,
    decoder: VorbisDecoder,
    buf: AudioBuffer<f32>,
    /// Buffer plane of every Vorbis channel.
    planes: Vec<usize>,
}

impl std::fmt::Debug for SymphoniaVorbisDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymphoniaVorbisDecoder")
            .field("decoder", &self.decoder)
            .field("planes", &self.planes)
            .finish_non_exhaustive()
    }
}

impl SymphoniaDecoder for SymphoniaVorbisDecoder {
    fn try_new(params: &CodecParameters, _options: &DecoderOptions) -> SymphoniaResult<Self> {
        let Some(extra_data) = params.extra_data.as_deref() else {
            return unsupported_error("vorbis: missing codec headers");
        };

        let mut decoder = VorbisDecoder::new();
        decoder
            .setup(extra_data)
            .map_err(|e| to_symphonia_error(&e))?;

        let Some(info) = decoder.info().cloned() else {
            return unsupported_error("vorbis: missing codec headers");
        };
        let Some(layout) = vorbis_channel_layout(info.channels) else {
            return unsupported_error("vorbis: unsupported channel count");
        };

        let channels = layout
            .iter()
            .fold(Channels::empty(), |mask, &channel| mask | channel);
        let planes = layout
            .iter()
            .map(|channel| (channels.bits() & (channel.bits() - 1)).count_ones() as usize)
            .collect();

        let spec = SignalSpec::new(info.sample_rate, channels);
        let buf = AudioBuffer::new(info.long_block_size() as u64, spec);

        let mut params = params.clone();
        if params.sample_rate.is_none() {
            params.with_sample_rate(info.sample_rate);
        }
        if params.channels.is_none() {
            params.with_channels(channels);
        }

        debug!(
            "Symphonia Vorbis decoder: sample_rate={} channels={}",
            info.sample_rate, info.channels
        );

        Ok(Self {
            params,
            decoder,
            buf,
            planes,
        })
    }

    fn supported_codecs() -> &'static [CodecDescriptor] {
        &[support_codec!(CODEC_TYPE_VORBIS, "vorbis", "Vorbis (MoosicBox native)")]
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.buf.clear();
    }

    fn codec_params(&self) -> &CodecParameters {
        &self.params
    }

    fn decode(&mut self, packet: &Packet) -> SymphoniaResult<AudioBufferRef<'_>> {
        let frames = self
            .decoder
            .decode_frames(packet.buf())
            .map_err(|e| to_symphonia_error(&e))?;

        self.buf.clear();
        self.buf.render_reserved(Some(frames.frames()));

        for (channel, samples) in frames.channels().iter().enumerate() {
            self.buf.chan_mut(self.planes[channel]).copy_from_slice(samples);
        }

        Ok(self.buf.as_audio_buffer_ref())
    }

    fn finalize(&mut self) -> FinalizeResult {
        FinalizeResult::default()
    }

    fn last_decoded(&self) -> AudioBufferRef<'_> {
        self.buf.as_audio_buffer_ref()
    }
}

/// Registers the native Vorbis decoder, replacing any Vorbis decoder already
/// in `registry`.
pub fn register_vorbis_codec(registry: &mut CodecRegistry) {
    registry.register_all::<SymphoniaVorbisDecoder>();
}

/// Creates a registry with Symphonia's enabled codecs and the native Vorbis
/// decoder.
#[must_use]
pub fn create_vorbis_registry() -> CodecRegistry {
    let mut registry = CodecRegistry::new();
    ::symphonia::default::register_enabled_codecs(&mut registry);
    register_vorbis_codec(&mut registry);
    registry
}
