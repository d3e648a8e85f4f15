#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! # `MoosicBox` Vorbis Codec
//!
//! Native Vorbis I audio decoder.
//!
//! The engine ([`VorbisDecoder`]) accepts the Vorbis headers once through
//! [`Decoder::setup`] and then decodes raw audio packets, in stream order,
//! through [`Decoder::decode`]. Output is interleaved little-endian PCM,
//! signed 16-bit by default or 32-bit float through [`VorbisDecoderOptions`],
//! with channels in Vorbis channel order.
//!
//! Front-ends:
//!
//! * [`OggVorbisDecoder`] (feature `ogg`) takes raw Ogg bytes in both calls.
//! * `symphonia::SymphoniaVorbisDecoder` (feature `symphonia`) plugs the
//!   engine into a Symphonia codec registry.
//! * `r#async::AsyncVorbisDecoder` (feature `async`) runs decode calls on
//!   Tokio's blocking pool.

#[cfg(feature = "async")]
pub mod r#async;
pub mod bitpack;
pub mod codebook;
pub mod decoder;
pub mod error;
pub mod floor;
pub mod header;
pub mod mdct;
#[cfg(feature = "ogg")]
pub mod ogg;
pub mod residue;
pub mod setup;
#[cfg(feature = "symphonia")]
pub mod symphonia;
pub mod window;

pub use decoder::{PcmFrames, SampleFormat, VorbisDecoder, VorbisDecoderOptions};
pub use error::{Error, Result};
pub use header::{VorbisComment, VorbisInfo};
#[cfg(feature = "ogg")]
pub use self::ogg::OggVorbisDecoder;
#[cfg(feature = "symphonia")]
pub use self::symphonia::{SymphoniaVorbisDecoder, create_vorbis_registry, register_vorbis_codec};

/// A stateful audio decoder: headers once, then packets in stream order.
///
/// Implementations own all decode tables and inter-packet state, so one
/// instance must be driven sequentially while separate instances are fully
/// independent.
pub trait Decoder {
    /// Ingests the codec setup headers, replacing any previous setup.
    ///
    /// # Errors
    ///
    /// * `MalformedHeader` - if the headers fail validation. The decoder is
    ///   left uninitialized.
    fn setup(&mut self, header: &[u8]) -> Result<()>;

    /// Decodes one packet into PCM bytes.
    ///
    /// # Errors
    ///
    /// * `DecoderNotInitialized` - if no setup has succeeded
    /// * `MalformedPacket` - if the packet is inconsistent with the setup
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<u8>>;
}
