//! Async wrapper running decode calls on Tokio's blocking pool.
//!
//! Each call moves the engine into a blocking task and takes it back when the
//! task completes. A call future dropped before completion takes the engine
//! with it, after which every call fails with `DecoderNotInitialized`.

use bytes::Bytes;
use log::trace;

use crate::{
    Decoder,
    decoder::{PcmFrames, VorbisDecoder, VorbisDecoderOptions},
    error::{Error, Result},
};

/// Vorbis decoder with `async` setup and decode calls.
#[derive(Debug)]
pub struct AsyncVorbisDecoder {
    decoder: Option<VorbisDecoder>,
}

impl Default for AsyncVorbisDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncVorbisDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::from_decoder(VorbisDecoder::new())
    }

    #[must_use]
    pub const fn with_options(options: VorbisDecoderOptions) -> Self {
        Self::from_decoder(VorbisDecoder::with_options(options))
    }

    #[must_use]
    pub const fn from_decoder(decoder: VorbisDecoder) -> Self {
        Self {
            decoder: Some(decoder),
        }
    }

    /// Returns the engine, unless an interrupted call lost it.
    #[must_use]
    pub fn into_inner(self) -> Option<VorbisDecoder> {
        self.decoder
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.decoder
            .as_ref()
            .is_some_and(VorbisDecoder::is_initialized)
    }

    async fn run<T, F>(&mut self, name: &'static str, function: F) -> Result<T>
    where
        F: FnOnce(&mut VorbisDecoder) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut decoder = self.decoder.take().ok_or(Error::DecoderNotInitialized)?;

        trace!("spawn_blocking start: {name}");
        let (decoder, result) = tokio::task::spawn_blocking(move || {
            let result = function(&mut decoder);
            (decoder, result)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?;
        trace!("spawn_blocking finished: {name}");

        self.decoder = Some(decoder);
        result
    }

    /// Runs [`Decoder::setup`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// * `MalformedHeader` - if the headers fail validation
    /// * `DecoderNotInitialized` - if an interrupted call lost the engine
    /// * `Task` - if the blocking task panicked or was cancelled
    pub async fn setup(&mut self, header: impl Into<Bytes>) -> Result<()> {
        let header = header.into();
        self.run("vorbis: setup", move |decoder| decoder.setup(&header))
            .await
    }

    /// Runs [`Decoder::decode`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// * `DecoderNotInitialized` - before a successful setup, or if an
    ///   interrupted call lost the engine
    /// * `MalformedPacket` - if the packet is inconsistent with the setup
    /// * `Task` - if the blocking task panicked or was cancelled
    pub async fn decode(&mut self, packet: impl Into<Bytes>) -> Result<Vec<u8>> {
        let packet = packet.into();
        self.run("vorbis: decode", move |decoder| decoder.decode(&packet))
            .await
    }

    /// Runs [`VorbisDecoder::decode_frames`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// * As for [`Self::decode`]
    pub async fn decode_frames(&mut self, packet: impl Into<Bytes>) -> Result<PcmFrames> {
        let packet = packet.into();
        self.run("vorbis: decode_frames", move |decoder| {
            decoder.decode_frames(&packet)
        })
        .await
    }

    /// Clears overlap state, see [`VorbisDecoder::reset`].
    pub fn reset(&mut self) {
        if let Some(decoder) = &mut self.decoder {
            decoder.reset();
        }
    }
}
