use thiserror::Error;

use crate::bitpack::EndOfPacket;

/// Vorbis decoding errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Identification, comment or setup header failed validation.
    ///
    /// The decoder instance holding the failed setup is left uninitialized.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// An audio packet is inconsistent with the setup tables.
    ///
    /// Only the current call fails, the decoder stays usable.
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// `decode` was called before a successful `setup`.
    #[error("Decoder not initialized: setup must succeed before decode")]
    DecoderNotInitialized,

    /// The Ogg container could not be read.
    #[cfg(feature = "ogg")]
    #[error(transparent)]
    Ogg(#[from] ogg::OggReadError),

    /// The blocking worker running a decode did not complete.
    #[cfg(feature = "async")]
    #[error("Decode task failed: {0}")]
    Task(String),
}

impl Error {
    pub(crate) fn header(message: impl Into<String>) -> Self {
        Self::MalformedHeader(message.into())
    }

    pub(crate) fn packet(message: impl Into<String>) -> Self {
        Self::MalformedPacket(message.into())
    }
}

/// Running out of bits while reading a header is always fatal for the header.
impl From<EndOfPacket> for Error {
    fn from(_: EndOfPacket) -> Self {
        Self::header("unexpected end of header packet")
    }
}

/// Result type for Vorbis operations.
pub type Result<T> = std::result::Result<T, Error>;
