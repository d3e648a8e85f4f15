#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![cfg(feature = "async")]

use moosicbox_vorbis::{Decoder, Error, VorbisDecoder, r#async::AsyncVorbisDecoder};
use moosicbox_vorbis_test_vectors::{EncoderConfig, encode, sine_wave};
use pretty_assertions::assert_eq;

#[test_log::test(tokio::test)]
async fn matches_synchronous_decoding() {
    let signal = sine_wave(440.0, 0.5, 44_100, 8_192);
    let stream = encode(&EncoderConfig::default(), &[signal]);

    let mut expected = Vec::new();
    let mut sync = VorbisDecoder::new();
    sync.setup(&stream.merged_header()).unwrap();
    for packet in &stream.packets {
        expected.extend(sync.decode(packet).unwrap());
    }

    let mut decoder = AsyncVorbisDecoder::new();
    decoder.setup(stream.merged_header()).await.unwrap();
    assert!(decoder.is_initialized());

    let mut output = Vec::new();
    for packet in &stream.packets {
        output.extend(decoder.decode(packet.clone()).await.unwrap());
    }

    assert_eq!(output, expected);
}

#[test_log::test(tokio::test)]
async fn decode_before_setup_fails() {
    let stream = encode(
        &EncoderConfig::default(),
        &[sine_wave(440.0, 0.5, 44_100, 4_096)],
    );
    let mut decoder = AsyncVorbisDecoder::new();

    assert!(matches!(
        decoder.decode(stream.packets[1].clone()).await,
        Err(Error::DecoderNotInitialized)
    ));
    assert!(decoder.into_inner().is_some());
}

#[test_log::test(tokio::test)]
async fn failed_setup_keeps_engine() {
    let mut decoder = AsyncVorbisDecoder::new();

    assert!(matches!(
        decoder.setup(vec![1_u8, 2, 3]).await,
        Err(Error::MalformedHeader(_))
    ));
    assert!(!decoder.is_initialized());

    let stream = encode(
        &EncoderConfig::default(),
        &[sine_wave(440.0, 0.5, 44_100, 4_096)],
    );
    decoder.setup(stream.merged_header()).await.unwrap();

    let first = decoder.decode_frames(stream.packets[0].clone()).await.unwrap();
    assert!(first.is_empty());

    let second = decoder.decode_frames(stream.packets[1].clone()).await.unwrap();
    assert_eq!(second.frames(), 1024);
}
