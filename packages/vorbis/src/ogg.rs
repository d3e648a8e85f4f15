//! Ogg front-end: feeds raw Ogg Vorbis bytes to the engine.
//!
//! [`OggVorbisDecoder`] accepts Ogg data in arbitrary chunks for both
//! [`Decoder::setup`] and [`Decoder::decode`]. Pages are framed and
//! CRC-checked, packets are reassembled across pages, and the last packet of
//! the stream is trimmed to the final granule position.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use log::{debug, trace, warn};
use ogg::{
    Packet,
    reading::{BasePacketReader, OggPage, PageParser},
};

use crate::{
    Decoder,
    decoder::{VorbisDecoder, VorbisDecoderOptions},
    error::{Error, Result},
    header::VorbisInfo,
};

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
const PAGE_HEADER_LEN: usize = 27;

/// Vorbis decoder taking Ogg-encapsulated input.
pub struct OggVorbisDecoder {
    decoder: VorbisDecoder,
    buffer: BytesMut,
    reader: BasePacketReader,
    pending: VecDeque<Packet>,
    /// Frames returned since setup, for end-of-stream trimming.
    samples: u64,
}

impl std::fmt::Debug for OggVorbisDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OggVorbisDecoder")
            .field("decoder", &self.decoder)
            .field("buffered", &self.buffer.len())
            .field("pending", &self.pending.len())
            .field("samples", &self.samples)
            .finish_non_exhaustive()
    }
}

impl Default for OggVorbisDecoder {
    fn default() -> Self {
        Self::with_options(VorbisDecoderOptions::default())
    }
}

impl OggVorbisDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(options: VorbisDecoderOptions) -> Self {
        Self {
            decoder: VorbisDecoder::with_options(options),
            buffer: BytesMut::new(),
            reader: BasePacketReader::new(),
            pending: VecDeque::new(),
            samples: 0,
        }
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.decoder.is_initialized()
    }

    #[must_use]
    pub fn info(&self) -> Option<&VorbisInfo> {
        self.decoder.info()
    }

    /// The underlying engine.
    #[must_use]
    pub const fn decoder(&self) -> &VorbisDecoder {
        &self.decoder
    }

    /// Audio packets demuxed but not decoded yet.
    #[must_use]
    pub fn pending_packets(&self) -> usize {
        self.pending.len()
    }

    fn clear(&mut self) {
        self.decoder = VorbisDecoder::with_options(self.decoder.options());
        self.buffer.clear();
        self.reader = BasePacketReader::new();
        self.pending.clear();
        self.samples = 0;
    }

    /// Frames the next complete, CRC-valid page from the buffer. Returns
    /// `None` when more input is needed.
    fn next_page(&mut self) -> Option<OggPage> {
        loop {
            let Some(start) = self
                .buffer
                .windows(CAPTURE_PATTERN.len())
                .position(|window| window == CAPTURE_PATTERN)
            else {
                // Keep a possible partial capture pattern at the end.
                let keep = (CAPTURE_PATTERN.len() - 1).min(self.buffer.len());
                let skip = self.buffer.len() - keep;
                if skip > 0 {
                    warn!("Skipping {skip} bytes without an Ogg capture pattern");
                    self.buffer.advance(skip);
                }
                return None;
            };

            if start > 0 {
                warn!("Skipping {start} bytes of garbage before Ogg page");
                self.buffer.advance(start);
            }

            if self.buffer.len() < PAGE_HEADER_LEN {
                return None;
            }

            let mut header = [0_u8; PAGE_HEADER_LEN];
            header.copy_from_slice(&self.buffer[..PAGE_HEADER_LEN]);

            let (mut parser, segment_count) = match PageParser::new(header) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Invalid Ogg page header: {e}");
                    self.buffer.advance(1);
                    continue;
                }
            };

            let segments_end = PAGE_HEADER_LEN + segment_count;
            if self.buffer.len() < segments_end {
                return None;
            }

            let body_len = parser.parse_segments(self.buffer[PAGE_HEADER_LEN..segments_end].to_vec());
            let page_len = segments_end + body_len;
            if self.buffer.len() < page_len {
                return None;
            }

            match parser.parse_packet_data(self.buffer[segments_end..page_len].to_vec()) {
                Ok(page) => {
                    trace!("Ogg page: {page_len} bytes");
                    self.buffer.advance(page_len);
                    return Some(page);
                }
                Err(e) => {
                    warn!("Dropping Ogg page: {e}");
                    self.buffer.advance(1);
                }
            }
        }
    }

    /// Moves every complete page into the packet reader and queues the
    /// packets it completes. Returns the number of pages read.
    fn pump(&mut self) -> Result<usize> {
        let mut pages = 0;

        while let Some(page) = self.next_page() {
            pages += 1;
            self.reader.push_page(page)?;

            while let Some(packet) = self.reader.read_packet() {
                self.pending.push_back(packet);
            }
        }

        Ok(pages)
    }

    fn read_headers(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);

        if self.pump()? == 0 && !data.windows(4).any(|window| window == CAPTURE_PATTERN) {
            return Err(Error::header("input does not appear to be an Ogg bitstream"));
        }
        if self.pending.len() < 3 {
            return Err(Error::header("end of data before finding all Vorbis headers"));
        }

        let (Some(identification), Some(comment), Some(setup)) = (
            self.pending.pop_front(),
            self.pending.pop_front(),
            self.pending.pop_front(),
        ) else {
            return Err(Error::header("end of data before finding all Vorbis headers"));
        };

        self.decoder
            .setup_packets(&identification.data, &comment.data, &setup.data)?;

        debug!(
            "Ogg Vorbis stream set up, {} audio packets queued",
            self.pending.len()
        );

        Ok(())
    }
}

impl Decoder for OggVorbisDecoder {
    /// Accepts bytes from the start of an Ogg Vorbis stream containing at
    /// least the three header packets. Audio packets following the headers
    /// are kept for the next [`Decoder::decode`] call.
    fn setup(&mut self, data: &[u8]) -> Result<()> {
        self.clear();

        let result = self.read_headers(data);
        if result.is_err() {
            self.clear();
        }
        result
    }

    /// Accepts the next chunk of the Ogg stream and decodes every packet it
    /// completes. Packets that fail to decode are skipped with a warning.
    /// After the end-of-stream packet the decoder returns to the
    /// uninitialized state.
    fn decode(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.decoder.is_initialized() {
            return Err(Error::DecoderNotInitialized);
        }

        self.buffer.extend_from_slice(data);
        self.pump()?;

        let format = self.decoder.options().sample_format;
        let mut output = Vec::new();

        while let Some(packet) = self.pending.pop_front() {
            match self.decoder.decode_frames(&packet.data) {
                Ok(mut frames) => {
                    if packet.last_in_stream() {
                        let remaining = packet.absgp_page().saturating_sub(self.samples);
                        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
                        if remaining < frames.frames() {
                            trace!(
                                "Trimming final packet from {} to {remaining} frames",
                                frames.frames()
                            );
                            frames.truncate(remaining);
                        }
                    }

                    self.samples += frames.frames() as u64;
                    output.extend_from_slice(&frames.to_bytes(format));
                }
                Err(e) => {
                    warn!("Skipping undecodable Ogg Vorbis packet: {e}");
                }
            }

            if packet.last_in_stream() {
                debug!("Ogg Vorbis end of stream after {} frames", self.samples);
                self.clear();
                break;
            }
        }

        Ok(output)
    }
}
