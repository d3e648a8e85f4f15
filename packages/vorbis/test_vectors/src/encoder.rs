//! A minimal Vorbis encoder.
//!
//! Each block is windowed and transformed with a direct forward MDCT. The
//! floor is flat at the lowest level that keeps the normalised spectrum in
//! the residue range, and the residue is rounded to integers and split into
//! a coarse and a fine codebook pass.

use std::f64::consts::{FRAC_PI_2, PI};

use log::debug;

use crate::{
    EncodedStream, EncoderConfig,
    bits::BitWriter,
    headers::{
        FLOOR_Y_BITS, LONG_BLOCK_SIZE, PARTITION_SIZE, SHORT_BLOCK_SIZE, comment, identification,
        setup,
    },
};

/// Residue value range of one coarse plus one fine codebook entry.
const RESIDUE_MIN: i32 = -128;
const RESIDUE_MAX: i32 = 119;

/// Limit of each channel before coupling, so that the angle channel stays in
/// range.
const COUPLED_LIMIT: i32 = 59;

fn inverse_db(index: usize) -> f64 {
    const FIRST: f64 = 1.064_986_3e-7;
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let index = index as i32;
    FIRST * (1.0 / FIRST).powf(f64::from(index) / 255.0)
}

fn slope(i: usize, len: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let x = (i as f64 + 0.5) / len as f64 * FRAC_PI_2;
    (FRAC_PI_2 * x.sin().powi(2)).sin()
}

fn window(n: usize, previous_long: bool, next_long: bool) -> Vec<f64> {
    let long_block = n == LONG_BLOCK_SIZE;
    let short = SHORT_BLOCK_SIZE;

    let (left_start, left_end) = if long_block && !previous_long {
        (n / 4 - short / 4, n / 4 + short / 4)
    } else {
        (0, n / 2)
    };
    let (right_start, right_end) = if long_block && !next_long {
        (n * 3 / 4 - short / 4, n * 3 / 4 + short / 4)
    } else {
        (n / 2, n)
    };

    (0..n)
        .map(|i| {
            if i < left_start || i >= right_end {
                0.0
            } else if i < left_end {
                slope(i - left_start, left_end - left_start)
            } else if i < right_start {
                1.0
            } else {
                slope(right_end - 1 - i, right_end - right_start)
            }
        })
        .collect()
}

/// Forward MDCT scaled by `2 / m` for `m = n / 2` coefficients, the inverse
/// of the decoder's unscaled transform under windowed overlap-add.
struct Mdct {
    n: usize,
    cosines: Vec<f64>,
}

impl Mdct {
    fn new(n: usize) -> Self {
        let period = 4 * n;
        #[allow(clippy::cast_precision_loss)]
        let cosines = (0..period)
            .map(|i| (2.0 * PI * i as f64 / period as f64).cos())
            .collect();

        Self { n, cosines }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let m = self.n / 2;
        let period = self.cosines.len();
        #[allow(clippy::cast_precision_loss)]
        let scale = 2.0 / m as f64;

        (0..m)
            .map(|k| {
                // cos(pi / m * (i + 1/2 + m/2) * (k + 1/2)) for i = 0, 1, ...
                let step = 2 * (2 * k + 1);
                let mut index = ((1 + m) * (2 * k + 1)) % period;
                let mut sum = 0.0;

                for &sample in input {
                    sum += sample * self.cosines[index];
                    index = (index + step) % period;
                }

                sum * scale
            })
            .collect()
    }
}

/// Flat floor level and integer residue of one channel.
struct Quantized {
    floor: Option<u32>,
    residue: Vec<i32>,
}

fn quantize(spectrum: &[f64], limit: i32) -> Quantized {
    let peak = spectrum.iter().fold(0.0_f64, |peak, value| peak.max(value.abs()));
    let silent = Quantized {
        floor: None,
        residue: vec![0; spectrum.len()],
    };

    if peak <= f64::EPSILON {
        return silent;
    }

    let level = (0..1_u32 << FLOOR_Y_BITS)
        .find(|&y| inverse_db(2 * y as usize) * f64::from(limit) >= peak)
        .unwrap_or((1 << FLOOR_Y_BITS) - 1);
    let gain = inverse_db(2 * level as usize);

    #[allow(clippy::cast_possible_truncation)]
    let residue: Vec<i32> = spectrum
        .iter()
        .map(|value| ((value / gain).round() as i32).clamp(-limit, limit))
        .collect();

    if residue.iter().all(|&value| value == 0) {
        return silent;
    }

    Quantized {
        floor: Some(level),
        residue,
    }
}

/// Square-polar coupling of two residue values, returning magnitude and
/// angle.
const fn couple(left: i32, right: i32) -> (i32, i32) {
    if left.abs() > right.abs() {
        if left > 0 { (left, left - right) } else { (left, right - left) }
    } else if right > 0 {
        (right, left - right)
    } else {
        (right, right - left)
    }
}

fn write_floor(bits: &mut BitWriter, level: Option<u32>) {
    let Some(level) = level else {
        bits.write_bool(false);
        return;
    };

    bits.write_bool(true)
        .write(level, FLOOR_Y_BITS)
        .write(level, FLOOR_Y_BITS);

    // Masterbook entry 1 routes the first post through the post book, the
    // second post has no book. Both stay at the predicted height.
    bits.write_codeword(1, 1);
    bits.write_codeword(0, 7);
}

fn split(value: i32) -> (u32, u32) {
    let value = value.clamp(RESIDUE_MIN, RESIDUE_MAX);
    let coarse = (value + 8).div_euclid(16) + 8;
    let fine = value - 16 * (coarse - 8) + 8;

    #[allow(clippy::cast_sign_loss)]
    (coarse as u32, fine as u32)
}

fn write_pair(bits: &mut BitWriter, pass: usize, first: i32, second: i32) {
    let (coarse_first, fine_first) = split(first);
    let (coarse_second, fine_second) = split(second);

    let entry = if pass == 0 {
        coarse_first + 16 * coarse_second
    } else {
        fine_first + 16 * fine_second
    };
    bits.write_codeword(entry, 8);
}

fn write_partition(bits: &mut BitWriter, pass: usize, interleaved: bool, values: &[i32]) {
    let pairs = values.len() / 2;

    for i in 0..pairs {
        if interleaved {
            write_pair(bits, pass, values[i], values[i + pairs]);
        } else {
            write_pair(bits, pass, values[2 * i], values[2 * i + 1]);
        }
    }
}

fn write_vectors(
    bits: &mut BitWriter,
    interleaved: bool,
    vectors: &[Vec<i32>],
    do_not_decode: &[bool],
) {
    let partitions = vectors.first().map_or(0, Vec::len) / PARTITION_SIZE;
    let active = |channel: &usize| !do_not_decode[*channel];

    let classes: Vec<Vec<bool>> = vectors
        .iter()
        .map(|vector| {
            vector
                .chunks_exact(PARTITION_SIZE)
                .map(|partition| partition.iter().any(|&value| value != 0))
                .collect()
        })
        .collect();

    for pass in 0..2 {
        for partition in 0..partitions {
            if pass == 0 {
                for channel in (0..vectors.len()).filter(active) {
                    bits.write_codeword(u32::from(classes[channel][partition]), 1);
                }
            }

            for channel in (0..vectors.len()).filter(active) {
                if classes[channel][partition] {
                    let start = partition * PARTITION_SIZE;
                    let values = &vectors[channel][start..start + PARTITION_SIZE];
                    write_partition(bits, pass, interleaved, values);
                }
            }
        }
    }
}

struct Encoder<'a> {
    config: &'a EncoderConfig,
    signal: &'a [Vec<f32>],
    transforms: [Mdct; 2],
}

impl Encoder<'_> {
    fn sample(&self, channel: usize, position: isize) -> f64 {
        usize::try_from(position)
            .ok()
            .and_then(|position| self.signal[channel].get(position))
            .map_or(0.0, |&sample| f64::from(sample))
    }

    fn encode_block(
        &self,
        centre: usize,
        long_block: bool,
        previous_long: bool,
        next_long: bool,
    ) -> Vec<u8> {
        let n = if long_block {
            LONG_BLOCK_SIZE
        } else {
            SHORT_BLOCK_SIZE
        };
        let window = window(n, previous_long, next_long);
        let transform = &self.transforms[usize::from(long_block)];
        let channels = self.signal.len();

        #[allow(clippy::cast_possible_wrap)]
        let start = centre as isize - (n / 2) as isize;

        let limit = if self.config.coupling {
            COUPLED_LIMIT
        } else {
            RESIDUE_MAX
        };

        let mut quantized: Vec<Quantized> = (0..channels)
            .map(|channel| {
                #[allow(clippy::cast_possible_wrap)]
                let input: Vec<f64> = window
                    .iter()
                    .enumerate()
                    .map(|(i, weight)| weight * self.sample(channel, start + i as isize))
                    .collect();
                quantize(&transform.forward(&input), limit)
            })
            .collect();

        let mut do_not_decode: Vec<bool> = quantized.iter().map(|q| q.floor.is_none()).collect();
        if self.config.coupling {
            if !do_not_decode[0] || !do_not_decode[1] {
                do_not_decode[0] = false;
                do_not_decode[1] = false;
            }

            let (left, right) = quantized.split_at_mut(1);
            for (magnitude, angle) in left[0].residue.iter_mut().zip(&mut right[0].residue) {
                (*magnitude, *angle) = couple(*magnitude, *angle);
            }
        }

        let mut bits = BitWriter::new();
        bits.write_bool(false).write_bool(long_block);
        if long_block {
            bits.write_bool(previous_long).write_bool(next_long);
        }

        for channel in &quantized {
            write_floor(&mut bits, channel.floor);
        }

        let vectors: Vec<Vec<i32>> = quantized.into_iter().map(|q| q.residue).collect();

        if self.config.residue.is_coupled() {
            if do_not_decode.iter().any(|&skip| !skip) {
                let interleaved: Vec<i32> = (0..n / 2)
                    .flat_map(|i| vectors.iter().map(move |vector| vector[i]))
                    .collect();
                write_vectors(&mut bits, false, &[interleaved], &[false]);
            }
        } else {
            let interleaved = !self.config.residue.is_ordered();
            write_vectors(&mut bits, interleaved, &vectors, &do_not_decode);
        }

        bits.into_bytes()
    }
}

/// Block size flags covering `frames` samples: the first block is centred on
/// sample zero and the last block centre is at or past the end.
fn plan_blocks(frames: usize, short_blocks: bool) -> (Vec<bool>, Vec<usize>) {
    let size = |long: bool| if long { LONG_BLOCK_SIZE } else { SHORT_BLOCK_SIZE };
    let mut blocks = Vec::new();
    let mut centres = Vec::new();
    let mut centre = 0;

    loop {
        let long = !short_blocks || blocks.len() % 12 < 4;
        if let Some(&previous) = blocks.last() {
            centre += size(previous) / 4 + size(long) / 4;
        }
        blocks.push(long);
        centres.push(centre);

        if blocks.len() >= 2 && centre >= frames {
            return (blocks, centres);
        }
    }
}

/// Encodes planar `signal` samples into a Vorbis stream.
///
/// # Panics
///
/// * If `signal` has no channels, more than 255 channels, or channels of
///   different lengths
/// * If coupling is requested for a mono signal
#[must_use]
pub fn encode(config: &EncoderConfig, signal: &[Vec<f32>]) -> EncodedStream {
    assert!(!signal.is_empty(), "signal has no channels");
    assert!(
        signal.iter().all(|channel| channel.len() == signal[0].len()),
        "channels differ in length"
    );
    assert!(signal.len() <= 255, "too many channels");
    assert!(
        !config.coupling || signal.len() >= 2,
        "coupling needs at least two channels"
    );

    #[allow(clippy::cast_possible_truncation)]
    let channels = signal.len() as u8;
    let frames = signal[0].len();
    let (blocks, centres) = plan_blocks(frames, config.short_blocks);

    let encoder = Encoder {
        config,
        signal,
        transforms: [Mdct::new(SHORT_BLOCK_SIZE), Mdct::new(LONG_BLOCK_SIZE)],
    };

    let packets: Vec<Vec<u8>> = blocks
        .iter()
        .enumerate()
        .map(|(i, &long)| {
            let previous_long = i.checked_sub(1).map_or(long, |previous| blocks[previous]);
            let next_long = blocks.get(i + 1).copied().unwrap_or(long);
            encoder.encode_block(centres[i], long, previous_long, next_long)
        })
        .collect();

    debug!(
        "Encoded {frames} frames of {channels} channels into {} packets ({} bytes)",
        packets.len(),
        packets.iter().map(Vec::len).sum::<usize>()
    );

    EncodedStream {
        channels,
        sample_rate: config.sample_rate,
        identification: identification(channels, config.sample_rate),
        comment: comment(&config.vendor, &config.comments),
        setup: setup(config, channels),
        packets,
        block_sizes: blocks
            .into_iter()
            .map(|long| if long { LONG_BLOCK_SIZE } else { SHORT_BLOCK_SIZE })
            .collect(),
        total_samples: frames as u64,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn windows_are_power_complementary() {
        let long = window(LONG_BLOCK_SIZE, true, true);
        let half = LONG_BLOCK_SIZE / 2;

        for i in 0..half {
            let sum = long[i].powi(2) + long[i + half].powi(2);
            assert!((sum - 1.0).abs() < 1e-9, "{i}: {sum}");
        }
    }

    /// Unscaled inverse MDCT, as Vorbis decoders compute it.
    #[allow(clippy::cast_precision_loss)]
    fn inverse(coefficients: &[f64]) -> Vec<f64> {
        let m = coefficients.len();
        let mf = m as f64;

        (0..2 * m)
            .map(|i| {
                coefficients
                    .iter()
                    .enumerate()
                    .map(|(k, x)| {
                        x * (PI / mf * (i as f64 + 0.5 + mf / 2.0) * (k as f64 + 0.5)).cos()
                    })
                    .sum()
            })
            .collect()
    }

    #[test_log::test]
    fn forward_mdct_inverts_under_windowed_overlap_add() {
        let n = SHORT_BLOCK_SIZE;
        let m = n / 2;
        let mdct = Mdct::new(n);
        let window = window(n, false, false);

        #[allow(clippy::cast_precision_loss)]
        let signal: Vec<f64> = (0..n + m)
            .map(|t| {
                let t = t as f64;
                (0.05 * t).sin() + 0.3 * (0.21 * t).cos()
            })
            .collect();

        let block = |start: usize| -> Vec<f64> {
            let input: Vec<f64> = window
                .iter()
                .zip(&signal[start..start + n])
                .map(|(weight, sample)| weight * sample)
                .collect();
            inverse(&mdct.forward(&input))
                .iter()
                .zip(&window)
                .map(|(sample, weight)| sample * weight)
                .collect()
        };

        let first = block(0);
        let second = block(m);

        for i in 0..m {
            let value = first[m + i] + second[i];
            assert!(
                (value - signal[m + i]).abs() < 1e-9,
                "{i}: {value} != {}",
                signal[m + i]
            );
        }
    }

    #[test_log::test]
    fn coupling_round_trips_through_the_square_polar_inverse() {
        for left in -20..=20 {
            for right in -20..=20 {
                let (magnitude, angle) = couple(left, right);
                let restored = if magnitude > 0 {
                    if angle > 0 {
                        (magnitude, magnitude - angle)
                    } else {
                        (magnitude + angle, magnitude)
                    }
                } else if angle > 0 {
                    (magnitude, magnitude + angle)
                } else {
                    (magnitude - angle, magnitude)
                };
                assert_eq!(restored, (left, right));
            }
        }
    }

    #[test_log::test]
    fn residue_values_split_into_coarse_and_fine_entries() {
        assert_eq!(split(-128), (0, 8));
        assert_eq!(split(-121), (0, 15));
        assert_eq!(split(0), (8, 8));
        assert_eq!(split(7), (8, 15));
        assert_eq!(split(8), (9, 0));
        assert_eq!(split(119), (15, 15));
    }

    #[test_log::test]
    fn block_plan_covers_the_signal() {
        let (blocks, centres) = plan_blocks(5000, false);
        assert!(blocks.iter().all(|&long| long));
        assert_eq!(centres[0], 0);
        assert!(*centres.last().unwrap() >= 5000);
        assert!(centres[centres.len() - 2] < 5000);

        let (blocks, _) = plan_blocks(20_000, true);
        assert!(blocks.iter().any(|&long| !long));
    }

    #[test_log::test]
    fn silent_spectrum_has_unused_floor() {
        let quantized = quantize(&[0.0; 16], RESIDUE_MAX);
        assert!(quantized.floor.is_none());
        assert!(quantized.residue.iter().all(|&value| value == 0));
    }
}
