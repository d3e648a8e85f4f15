#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Basic Vorbis Decoder Usage Example
//!
//! This example demonstrates the core functionality of the `moosicbox_vorbis` decoder:
//! - Setting up a decoder from the three Vorbis headers
//! - Decoding audio packets to interleaved 16-bit PCM
//! - Feeding a raw Ogg Vorbis stream in chunks
//! - Handling malformed packets without losing decoder state

use moosicbox_vorbis::{
    Decoder, Error, OggVorbisDecoder, SampleFormat, VorbisDecoder, VorbisDecoderOptions,
};
use moosicbox_vorbis_test_vectors::{
    EncoderConfig, calculate_snr, encode, i16_from_le_bytes, interleave, sine_wave, to_i16,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    println!("=== MoosicBox Vorbis - Basic Usage Example ===\n");

    // A stereo test stream: 440 Hz on the left, 660 Hz on the right.
    // In a real application the packets would come from a demuxer.
    let signal = vec![
        sine_wave(440.0, 0.5, 44_100, 44_100),
        sine_wave(660.0, 0.25, 44_100, 44_100),
    ];
    let stream = encode(
        &EncoderConfig {
            coupling: true,
            short_blocks: true,
            comments: vec!["TITLE=Two tones".to_string()],
            ..EncoderConfig::default()
        },
        &signal,
    );
    log::debug!("Encoded {} audio packets", stream.packets.len());

    // Example 1: Packet decoding
    println!("Example 1: Packet decoding (44.1kHz stereo)");
    println!("---------------------------------------------------");

    let mut decoder = VorbisDecoder::new();

    // Headers are passed once, concatenated
    decoder.setup(&stream.merged_header())?;

    if let Some(info) = decoder.info() {
        println!(
            "✓ Stream: {} channels @ {}Hz, block sizes {:?}",
            info.channels, info.sample_rate, info.block_sizes
        );
    }
    if let Some(comment) = decoder.comment() {
        println!("  Vendor: {}", comment.vendor);
        println!("  Title: {:?}", comment.get("title"));
    }

    let mut output = Vec::new();
    for packet in &stream.packets {
        output.extend(decoder.decode(packet)?);
    }

    let samples = i16_from_le_bytes(&output);
    let reference = to_i16(&interleave(&signal));
    let snr = calculate_snr(&reference, &samples[..reference.len()]);

    println!(
        "✓ Decoded {} frames from {} packets",
        samples.len() / 2,
        stream.packets.len()
    );
    println!("  SNR against the source signal: {snr:.1} dB\n");

    // Example 2: Ogg Vorbis bytes
    println!("Example 2: Chunked Ogg Vorbis input");
    println!("---------------------------------------------------");

    let bytes = stream.to_ogg(1)?;
    let mut decoder = OggVorbisDecoder::with_options(VorbisDecoderOptions {
        sample_format: SampleFormat::F32,
    });

    // Setup needs the header pages, anything after them is queued
    decoder.setup(&bytes[..4096.min(bytes.len())])?;
    println!("✓ Headers read, {} packets queued", decoder.pending_packets());

    let mut output = Vec::new();
    for chunk in bytes[4096.min(bytes.len())..].chunks(4096) {
        output.extend(decoder.decode(chunk)?);
    }

    println!(
        "✓ Decoded {} float frames, trimmed to the final granule position",
        output.len() / 4 / 2
    );
    println!(
        "  Decoder initialized after end of stream: {}\n",
        decoder.is_initialized()
    );

    // Example 3: Malformed input
    println!("Example 3: Malformed packets");
    println!("---------------------------------------------------");

    let mut decoder = VorbisDecoder::new();
    match decoder.decode(&stream.packets[0]) {
        Err(e @ Error::DecoderNotInitialized) => println!("✓ decode before setup: {e}"),
        other => println!("✗ unexpected result: {other:?}"),
    }

    decoder.setup(&stream.merged_header())?;
    match decoder.decode(&[]) {
        Err(e) => println!("✓ empty packet rejected: {e}"),
        Ok(_) => println!("✗ empty packet accepted"),
    }
    println!(
        "✓ Decoder still initialized: {}\n",
        decoder.is_initialized()
    );

    // Example 4: Feature-specific information
    println!("Example 4: Decoder Capabilities");
    println!("---------------------------------------------------");
    println!("✓ Ogg front-end enabled");

    #[cfg(feature = "symphonia")]
    println!("✓ Symphonia codec enabled - register with moosicbox_vorbis::register_vorbis_codec");

    #[cfg(not(feature = "symphonia"))]
    println!("✗ Symphonia codec disabled");

    println!("\n=== Example Complete ===");
    println!("\nKey Takeaways:");
    println!("1. Call setup() once with the identification, comment and setup headers");
    println!("2. Call decode() with each audio packet in stream order");
    println!("3. The first packet after setup produces no audio");
    println!("4. Use OggVorbisDecoder to feed raw Ogg bytes directly");

    Ok(())
}
