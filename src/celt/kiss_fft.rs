//! Implements the FFT used for the MDCT.

/// A mixed-radix Fast Fourier Transform based up on the principle, "Keep It Simple, Stupid."
///
/// This code is originally from Mark Borgerding's KISS-FFT but has been
/// heavily modified to better suit Opus.
///
/// Unlike the original (power-of-two-only, in-place, twiddle-cached) KISS-FFT,
/// this is a plain recursive mixed-radix Cooley-Tukey transform: it factors
/// `n` into its smallest prime factors and recurses, so it handles any
/// transform length. It is kept as general DSP infrastructure, decoupled
/// from [`super::mdct`], which evaluates its trigonometric sum directly
/// (see `DESIGN.md`).
use num_complex::Complex64;
use num_traits::Zero;

/// A mixed-radix Fast Fourier Transform plan for a fixed transform length.
pub(crate) struct KissFft {
    n: usize,
}

impl KissFft {
    /// Builds an FFT plan for transforms of length `n`. `n` must be at least 1.
    pub(crate) fn new(n: usize) -> Self {
        debug_assert!(n >= 1);
        Self { n }
    }

    /// Length this plan was built for.
    pub(crate) fn len(&self) -> usize {
        self.n
    }

    /// Forward (negative-exponent) DFT: `X[k] = sum_n x[n] exp(-2pi i k n / N)`.
    pub(crate) fn forward(&self, input: &[Complex64]) -> Vec<Complex64> {
        debug_assert_eq!(input.len(), self.n);
        fft_recursive(input, -1.0)
    }

    /// Inverse DFT, scaled by `1/N` so that `inverse(forward(x)) == x`.
    pub(crate) fn inverse(&self, input: &[Complex64]) -> Vec<Complex64> {
        debug_assert_eq!(input.len(), self.n);
        let n = self.n.max(1) as f64;
        let out = fft_recursive(input, 1.0);
        out.into_iter().map(|c| c / n).collect()
    }
}

/// Smallest prime (or the number itself, if prime) dividing `n`.
fn smallest_factor(n: usize) -> usize {
    if n <= 1 {
        return n;
    }
    let mut p = 2usize;
    while p * p <= n {
        if n % p == 0 {
            return p;
        }
        p += 1;
    }
    n
}

/// Generic (not necessarily power-of-two) Cooley-Tukey decimation-in-time FFT,
/// recursing on the smallest prime factor of `n` at each level, down to a
/// direct DFT at `n == 1`.
///
/// `sign` is `-1.0` for the forward transform and `1.0` for the inverse;
/// callers are responsible for the `1/N` inverse scaling.
fn fft_recursive(x: &[Complex64], sign: f64) -> Vec<Complex64> {
    let n = x.len();
    if n <= 1 {
        return x.to_vec();
    }

    let p = smallest_factor(n);
    let m = n / p;

    let subs: Vec<Vec<Complex64>> = (0..p)
        .map(|j| {
            let sub: Vec<Complex64> = (0..m).map(|i| x[i * p + j]).collect();
            fft_recursive(&sub, sign)
        })
        .collect();

    let mut out = vec![Complex64::zero(); n];
    for (k, slot) in out.iter_mut().enumerate() {
        let k_mod_m = k % m;
        let mut sum = Complex64::zero();
        for (j, sub) in subs.iter().enumerate() {
            let angle = sign * 2.0 * std::f64::consts::PI * (j as f64) * (k as f64) / (n as f64);
            let twiddle = Complex64::new(angle.cos(), angle.sin());
            sum += twiddle * sub[k_mod_m];
        }
        *slot = sum;
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn direct_dft(x: &[Complex64]) -> Vec<Complex64> {
        let n = x.len();
        (0..n)
            .map(|k| {
                let mut sum = Complex64::zero();
                for (i, &xi) in x.iter().enumerate() {
                    let angle = -2.0 * std::f64::consts::PI * (k as f64) * (i as f64) / (n as f64);
                    sum += xi * Complex64::new(angle.cos(), angle.sin());
                }
                sum
            })
            .collect()
    }

    #[test]
    fn test_matches_direct_dft_power_of_two() {
        let fft = KissFft::new(16);
        let input: Vec<Complex64> = (0..16)
            .map(|i| Complex64::new((i as f64 * 0.37).sin(), (i as f64 * 0.11).cos()))
            .collect();
        let got = fft.forward(&input);
        let want = direct_dft(&input);
        for (a, b) in got.iter().zip(want.iter()) {
            assert!((a - b).norm() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_matches_direct_dft_mixed_radix() {
        // 60 = 2^2 * 3 * 5, exercises more than one distinct prime factor.
        let fft = KissFft::new(60);
        let input: Vec<Complex64> = (0..60)
            .map(|i| Complex64::new((i as f64 * 0.09).sin(), 0.0))
            .collect();
        let got = fft.forward(&input);
        let want = direct_dft(&input);
        for (a, b) in got.iter().zip(want.iter()) {
            assert!((a - b).norm() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_forward_inverse_roundtrip() {
        let fft = KissFft::new(24);
        let input: Vec<Complex64> = (0..24)
            .map(|i| Complex64::new((i as f64 * 0.23).cos(), (i as f64 * 0.05).sin()))
            .collect();
        let freq = fft.forward(&input);
        let back = fft.inverse(&freq);
        for (a, b) in input.iter().zip(back.iter()) {
            assert!((a - b).norm() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_impulse_is_flat_spectrum() {
        let fft = KissFft::new(8);
        let mut input = vec![Complex64::zero(); 8];
        input[0] = Complex64::new(1.0, 0.0);
        let got = fft.forward(&input);
        for c in got {
            assert!((c - Complex64::new(1.0, 0.0)).norm() < 1e-9);
        }
    }
}
