//! Vorbis window shapes for the four block-size transitions.

use std::f32::consts::FRAC_PI_2;

/// Precomputed windows: one for short blocks and one for each combination of
/// neighbouring block sizes around a long block.
#[derive(Debug, Clone)]
pub struct Windows {
    short: Vec<f32>,
    /// Indexed by `previous_long * 2 + next_long`.
    long: [Vec<f32>; 4],
}

impl Windows {
    #[must_use]
    pub fn new(block_sizes: [usize; 2]) -> Self {
        let [short, long] = block_sizes;

        Self {
            short: build(short, short, false, false),
            long: [
                build(long, short, false, false),
                build(long, short, false, true),
                build(long, short, true, false),
                build(long, short, true, true),
            ],
        }
    }

    /// Window for a block. The neighbour flags only matter for long blocks.
    #[must_use]
    pub fn get(&self, long_block: bool, previous_long: bool, next_long: bool) -> &[f32] {
        if long_block {
            &self.long[usize::from(previous_long) * 2 + usize::from(next_long)]
        } else {
            &self.short
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn slope(i: usize, len: usize) -> f32 {
    let x = (i as f32 + 0.5) / len as f32 * FRAC_PI_2;
    (FRAC_PI_2 * x.sin().powi(2)).sin()
}

fn build(n: usize, short: usize, previous_long: bool, next_long: bool) -> Vec<f32> {
    let long_block = n > short;
    let center = n / 2;

    let (left_start, left_end) = if long_block && !previous_long {
        (n / 4 - short / 4, n / 4 + short / 4)
    } else {
        (0, center)
    };
    let (right_start, right_end) = if long_block && !next_long {
        (n * 3 / 4 - short / 4, n * 3 / 4 + short / 4)
    } else {
        (center, n)
    };

    let left_len = left_end - left_start;
    let right_len = right_end - right_start;

    let mut window = vec![0.0_f32; n];
    for (i, value) in window[left_start..left_end].iter_mut().enumerate() {
        *value = slope(i, left_len);
    }
    window[left_end..right_start].fill(1.0);
    for (i, value) in window[right_start..right_end].iter_mut().enumerate() {
        *value = slope(right_len - 1 - i, right_len);
    }

    window
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn short_window_is_power_complementary() {
        let windows = Windows::new([256, 2048]);
        let window = windows.get(false, true, true);

        assert_eq!(window.len(), 256);
        for i in 0..128 {
            let sum = window[i].powi(2) + window[i + 128].powi(2);
            assert!((sum - 1.0).abs() < 1e-5, "i={i} sum={sum}");
        }
    }

    #[test]
    fn long_window_after_short_block_has_short_slope() {
        let windows = Windows::new([256, 2048]);
        let window = windows.get(true, false, true);

        assert!(window[..448].iter().all(|&v| v.abs() < f32::EPSILON));
        assert!(window[448] > 0.0);
        assert!(window[500] > 0.0 && window[500] < 1.0);
        assert!(window[576..1024].iter().all(|&v| (v - 1.0).abs() < f32::EPSILON));
        assert!(window[1024] > 0.99);
        assert!(window[2047] < 0.01);
    }

    #[test]
    fn long_window_before_short_block_mirrors_the_slope() {
        let windows = Windows::new([256, 2048]);
        let before_short = windows.get(true, true, false);
        let after_short = windows.get(true, false, true);

        for i in 0..2048 {
            assert!((before_short[i] - after_short[2047 - i]).abs() < 1e-6);
        }
        assert!(before_short[1600..].iter().all(|&v| v.abs() < f32::EPSILON));
    }

    #[test]
    fn short_slope_matches_long_block_transition_slope() {
        let windows = Windows::new([256, 2048]);
        let short = windows.get(false, false, false);
        let long = windows.get(true, false, false);

        // The falling half of a short block overlaps the rising short slope
        // of the following long block.
        for i in 0..128 {
            let sum = short[128 + i].powi(2) + long[448 + i].powi(2);
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }
}
