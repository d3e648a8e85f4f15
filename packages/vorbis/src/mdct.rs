//! Inverse MDCT.
//!
//! Computes `y[n] = sum_k X[k] cos(pi / M * (n + 1/2 + M/2) * (k + 1/2))` for
//! `n < 2M`, without scaling, through a DCT-IV evaluated with an `M / 2`
//! point complex FFT.

use std::{
    f64::consts::PI,
    ops::{Add, Mul, Sub},
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Complex {
    re: f32,
    im: f32,
}

impl Complex {
    const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    /// `e^(i * theta)`
    #[allow(clippy::cast_possible_truncation)]
    fn expi(theta: f64) -> Self {
        Self::new(theta.cos() as f32, theta.sin() as f32)
    }
}

impl Add for Complex {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re.mul_add(rhs.re, -self.im * rhs.im),
            self.re.mul_add(rhs.im, self.im * rhs.re),
        )
    }
}

/// Inverse MDCT for one block size.
#[derive(Debug, Clone)]
pub struct Imdct {
    n: usize,
    pre_twiddle: Vec<Complex>,
    post_twiddle: Vec<Complex>,
    roots: Vec<Complex>,
    bit_reverse: Vec<usize>,
}

impl Imdct {
    /// Prepares tables for blocks of `n` samples. `n` must be a power of two
    /// of at least 8.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(n: usize) -> Self {
        debug_assert!(n.is_power_of_two() && n >= 8);

        let m = n / 2;
        let fft_len = m / 2;
        let mf = m as f64;

        let pre_twiddle = (0..fft_len)
            .map(|j| Complex::expi(-PI * j as f64 / mf))
            .collect();
        let post_twiddle = (0..fft_len)
            .map(|l| Complex::expi(-PI * (4 * l + 1) as f64 / (4.0 * mf)))
            .collect();
        let roots = (0..fft_len / 2)
            .map(|k| Complex::expi(-2.0 * PI * k as f64 / fft_len as f64))
            .collect();

        let bits = fft_len.trailing_zeros();
        let bit_reverse = (0..fft_len)
            .map(|i| i.reverse_bits() >> (usize::BITS - bits))
            .collect();

        Self {
            n,
            pre_twiddle,
            post_twiddle,
            roots,
            bit_reverse,
        }
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.n
    }

    /// Transforms `n / 2` spectral coefficients into `n` time samples.
    pub fn inverse(&self, spectrum: &[f32], output: &mut [f32]) {
        let m = self.n / 2;
        let fft_len = m / 2;
        debug_assert!(spectrum.len() >= m && output.len() >= self.n);

        let mut buffer = vec![Complex::default(); fft_len];
        for (j, twiddle) in self.pre_twiddle.iter().enumerate() {
            let value = Complex::new(spectrum[2 * j], spectrum[m - 1 - 2 * j]);
            buffer[self.bit_reverse[j]] = value * *twiddle;
        }

        self.fft(&mut buffer);

        let mut dct = vec![0.0_f32; m];
        for (l, (value, twiddle)) in buffer.iter().zip(&self.post_twiddle).enumerate() {
            let value = *value * *twiddle;
            dct[2 * l] = value.re;
            dct[m - 1 - 2 * l] = -value.im;
        }

        let quarter = m / 2;
        for (i, sample) in output[..self.n].iter_mut().enumerate() {
            *sample = if i < quarter {
                dct[i + quarter]
            } else if i < 3 * quarter {
                -dct[3 * quarter - 1 - i]
            } else {
                -dct[i - 3 * quarter]
            };
        }
    }

    /// In-place radix-2 FFT over bit-reversed input.
    fn fft(&self, buffer: &mut [Complex]) {
        let len = buffer.len();
        let mut size = 2;

        while size <= len {
            let half = size / 2;
            let stride = len / size;

            for start in (0..len).step_by(size) {
                for k in 0..half {
                    let a = buffer[start + k];
                    let b = buffer[start + k + half] * self.roots[k * stride];
                    buffer[start + k] = a + b;
                    buffer[start + k + half] = a - b;
                }
            }

            size *= 2;
        }
    }
}
