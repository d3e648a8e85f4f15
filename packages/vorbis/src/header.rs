//! Identification and comment headers.

use log::debug;

use crate::{
    bitpack::BitReader,
    error::{Error, Result},
};

/// Packet type byte of the identification header.
pub const PACKET_TYPE_IDENTIFICATION: u8 = 1;
/// Packet type byte of the comment header.
pub const PACKET_TYPE_COMMENT: u8 = 3;
/// Packet type byte of the setup header.
pub const PACKET_TYPE_SETUP: u8 = 5;

/// Magic following the packet type byte of every header.
pub const VORBIS_MAGIC: &[u8; 6] = b"vorbis";

/// Fixed size of the identification header in bytes.
pub const IDENTIFICATION_HEADER_LEN: usize = 30;

/// Stream parameters from the identification header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VorbisInfo {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_maximum: i32,
    pub bitrate_nominal: i32,
    pub bitrate_minimum: i32,
    /// Short and long block sizes in samples.
    pub block_sizes: [usize; 2],
}

impl VorbisInfo {
    #[must_use]
    pub const fn short_block_size(&self) -> usize {
        self.block_sizes[0]
    }

    #[must_use]
    pub const fn long_block_size(&self) -> usize {
        self.block_sizes[1]
    }
}

/// Vendor string and user comments from the comment header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisComment {
    pub vendor: String,
    pub comments: Vec<(String, String)>,
}

impl VorbisComment {
    /// Returns the first value stored under `key`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Reads the packet type byte and checks the `vorbis` magic.
pub(crate) fn read_common_header(reader: &mut BitReader<'_>, expected: u8) -> Result<()> {
    let packet_type = reader.read_u8()?;
    if packet_type != expected {
        return Err(Error::header(format!(
            "expected header packet type {expected}, found {packet_type}"
        )));
    }

    let mut magic = [0_u8; 6];
    for byte in &mut magic {
        *byte = reader.read_u8()?;
    }
    if &magic != VORBIS_MAGIC {
        return Err(Error::header("missing vorbis magic"));
    }

    Ok(())
}

/// Parses an identification header.
///
/// # Errors
///
/// * `MalformedHeader` - wrong packet type or magic, non-zero version, zero
///   channels or sample rate, invalid block sizes, or a cleared framing bit
pub fn parse_identification(data: &[u8]) -> Result<VorbisInfo> {
    let mut reader = BitReader::new(data);
    read_common_header(&mut reader, PACKET_TYPE_IDENTIFICATION)?;

    let version = reader.read(32)?;
    if version != 0 {
        return Err(Error::header(format!("unsupported vorbis version {version}")));
    }

    let channels = reader.read_u8()?;
    let sample_rate = reader.read(32)?;

    #[allow(clippy::cast_possible_wrap)]
    let (bitrate_maximum, bitrate_nominal, bitrate_minimum) = (
        reader.read(32)? as i32,
        reader.read(32)? as i32,
        reader.read(32)? as i32,
    );

    let short_exponent = reader.read(4)?;
    let long_exponent = reader.read(4)?;
    let framing = reader.read_bool()?;

    if channels == 0 {
        return Err(Error::header("channel count must be non-zero"));
    }
    if sample_rate == 0 {
        return Err(Error::header("sample rate must be non-zero"));
    }
    if !(6..=13).contains(&short_exponent)
        || !(6..=13).contains(&long_exponent)
        || short_exponent > long_exponent
    {
        return Err(Error::header(format!(
            "invalid block size exponents {short_exponent}/{long_exponent}"
        )));
    }
    if !framing {
        return Err(Error::header("identification framing bit not set"));
    }

    let info = VorbisInfo {
        channels,
        sample_rate,
        bitrate_maximum,
        bitrate_nominal,
        bitrate_minimum,
        block_sizes: [1 << short_exponent, 1 << long_exponent],
    };

    debug!(
        "Vorbis identification: channels={} sample_rate={} block_sizes={:?} nominal_bitrate={}",
        info.channels, info.sample_rate, info.block_sizes, info.bitrate_nominal
    );

    Ok(info)
}

fn read_string(reader: &mut BitReader<'_>, what: &str) -> Result<String> {
    let len = reader.read_usize(32)?;
    if len > reader.remaining_bits() / 8 {
        return Err(Error::header(format!("{what} length {len} exceeds header")));
    }

    let bytes = (0..len)
        .map(|_| reader.read_u8())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parses a comment header, returning the comments and the number of bytes
/// the header occupied.
///
/// # Errors
///
/// * `MalformedHeader` - wrong packet type or magic, lengths running past the
///   end of the data, or a cleared framing bit
pub fn parse_comment(data: &[u8]) -> Result<(VorbisComment, usize)> {
    let mut reader = BitReader::new(data);
    read_common_header(&mut reader, PACKET_TYPE_COMMENT)?;

    let vendor = read_string(&mut reader, "vendor string")?;
    let count = reader.read_usize(32)?;
    if count > reader.remaining_bits() / 32 {
        return Err(Error::header(format!(
            "comment count {count} exceeds header"
        )));
    }

    let mut comments = Vec::with_capacity(count);
    for _ in 0..count {
        let comment = read_string(&mut reader, "comment")?;
        let (key, value) = comment
            .split_once('=')
            .map_or_else(|| (comment.clone(), String::new()), |(k, v)| (k.to_string(), v.to_string()));
        comments.push((key, value));
    }

    if !reader.read_bool()? {
        return Err(Error::header("comment framing bit not set"));
    }

    debug!("Vorbis comment: vendor={vendor:?} comments={}", comments.len());

    Ok((VorbisComment { vendor, comments }, reader.bytes_consumed()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn identification(channels: u8, rate: u32, exponents: u8, framing: u8) -> Vec<u8> {
        let mut data = vec![PACKET_TYPE_IDENTIFICATION];
        data.extend_from_slice(VORBIS_MAGIC);
        data.extend_from_slice(&0_u32.to_le_bytes());
        data.push(channels);
        data.extend_from_slice(&rate.to_le_bytes());
        data.extend_from_slice(&0_i32.to_le_bytes());
        data.extend_from_slice(&128_000_i32.to_le_bytes());
        data.extend_from_slice(&0_i32.to_le_bytes());
        data.push(exponents);
        data.push(framing);
        data
    }

    #[test_log::test]
    fn parses_identification_header() {
        let info = parse_identification(&identification(2, 44_100, 0xB8, 1)).unwrap();

        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.bitrate_nominal, 128_000);
        assert_eq!(info.block_sizes, [256, 2048]);
    }

    #[test_log::test]
    fn identification_header_is_thirty_bytes() {
        assert_eq!(identification(1, 8000, 0x88, 1).len(), IDENTIFICATION_HEADER_LEN);
    }

    #[test_log::test]
    fn rejects_missing_magic() {
        let mut data = identification(2, 44_100, 0xB8, 1);
        data[1..7].copy_from_slice(b"VORBIS");

        assert!(matches!(
            parse_identification(&data),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test_log::test]
    fn rejects_short_block_larger_than_long_block() {
        assert!(parse_identification(&identification(2, 44_100, 0x8B, 1)).is_err());
    }

    #[test_log::test]
    fn rejects_zero_channels_and_missing_framing_bit() {
        assert!(parse_identification(&identification(0, 44_100, 0xB8, 1)).is_err());
        assert!(parse_identification(&identification(1, 44_100, 0xB8, 0)).is_err());
    }

    #[test_log::test]
    fn rejects_truncated_identification() {
        let data = identification(2, 44_100, 0xB8, 1);
        assert!(parse_identification(&data[..20]).is_err());
    }

    #[test_log::test]
    fn parses_comment_header_and_reports_length() {
        let mut data = vec![PACKET_TYPE_COMMENT];
        data.extend_from_slice(VORBIS_MAGIC);
        data.extend_from_slice(&4_u32.to_le_bytes());
        data.extend_from_slice(b"test");
        data.extend_from_slice(&2_u32.to_le_bytes());
        for comment in ["TITLE=Tone", "artist=Nobody"] {
            data.extend_from_slice(&u32::try_from(comment.len()).unwrap().to_le_bytes());
            data.extend_from_slice(comment.as_bytes());
        }
        data.push(1);
        let expected_len = data.len();
        data.extend_from_slice(&[0xAA, 0xBB]);

        let (comment, len) = parse_comment(&data).unwrap();

        assert_eq!(len, expected_len);
        assert_eq!(comment.vendor, "test");
        assert_eq!(comment.get("title"), Some("Tone"));
        assert_eq!(comment.get("ARTIST"), Some("Nobody"));
        assert_eq!(comment.get("album"), None);
    }
}
