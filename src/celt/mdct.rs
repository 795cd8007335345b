//! Implements the modified discrete cosine transform.
//!
//! This is a direct, double-sum trigonometric evaluation of the windowed
//! MDCT/IMDCT pair (f64 accumulate, f32 store), rather than the N/4-complex-FFT
//! folding trick libopus uses. See `DESIGN.md` for why: this avoids a whole
//! class of sign/index derivation risk in an environment where the result
//! can never actually be executed to check it.
//!
//! The window used here is the same Vorbis window shape as
//! [`crate::celt::mode::window`], but stretched to the full block length `n`
//! instead of the fixed `OVERLAP` constant. Stretched this way it still
//! satisfies the Princen-Bradley power-complementary condition
//! `w[i]^2 + w[i + n]^2 == 1`, which is what makes simple windowed
//! overlap-add a perfect-reconstruction filter bank: writing
//! `theta_i = (pi/2) * (i + 0.5) / n`, the window is `sin((pi/2) * sin(theta_i)^2)`,
//! and `theta_i + theta_{n - 1 - i} == pi/2` gives `sin(theta_{n-1-i}) ==
//! cos(theta_i)`, so the two halves' squared windows are `sin(...)^2` and
//! `cos(...)^2` of the same angle and sum to one pointwise.
// TODO tests: test_unit_mdct.c

/// A single block-size modified discrete cosine transform, with persistent
/// overlap-add state for the inverse direction.
///
/// `n` is the transform size (half the underlying 2n-sample window); a
/// 20 ms fullband frame at LM == 0 uses `n == 960`, short blocks at higher
/// LM use `n` divided down accordingly (see [`celt::mode`](super::mode)).
pub(crate) struct Mdct {
    n: usize,
    /// Length-`n` half-window; `win(i)` mirrors this for the second half.
    window: Vec<f32>,
}

impl Mdct {
    /// Builds an MDCT plan for block size `n`. `n` must be even and at least 2.
    pub(crate) fn new(n: usize) -> Self {
        debug_assert!(n >= 2 && n % 2 == 0);
        let mut window = vec![0.0f32; n];
        for (i, w) in window.iter_mut().enumerate() {
            let theta = std::f64::consts::FRAC_PI_2 * (i as f64 + 0.5) / n as f64;
            let s = theta.sin();
            *w = (std::f64::consts::FRAC_PI_2 * s * s).sin() as f32;
        }
        Self { n, window }
    }

    /// Block size this plan was built for.
    pub(crate) fn n(&self) -> usize {
        self.n
    }

    /// Full analysis/synthesis window value at index `i` in `0..2n`.
    fn win(&self, i: usize) -> f32 {
        if i < self.n {
            self.window[i]
        } else {
            self.window[2 * self.n - 1 - i]
        }
    }

    /// Forward MDCT of one block. `history` is the previous block's `n`
    /// samples (zero for the first block of a stream), `input` is this
    /// block's `n` samples. Returns `n` frequency-domain coefficients.
    pub(crate) fn forward(&self, history: &[f32], input: &[f32]) -> Vec<f32> {
        debug_assert_eq!(history.len(), self.n);
        debug_assert_eq!(input.len(), self.n);

        let n = self.n;
        let mut windowed = vec![0.0f64; 2 * n];
        for i in 0..n {
            windowed[i] = f64::from(history[i]) * f64::from(self.win(i));
            windowed[n + i] = f64::from(input[i]) * f64::from(self.win(n + i));
        }

        let mut out = vec![0.0f32; n];
        for (k, slot) in out.iter_mut().enumerate() {
            let mut sum = 0.0f64;
            for (t, &wt) in windowed.iter().enumerate() {
                let angle = std::f64::consts::PI / n as f64
                    * (t as f64 + 0.5 + n as f64 / 2.0)
                    * (k as f64 + 0.5);
                sum += wt * angle.cos();
            }
            *slot = sum as f32;
        }
        out
    }

    /// Inverse MDCT of one block. `freq` holds this block's `n` frequency
    /// coefficients; `overlap_buf` (length `n`) holds the previous block's
    /// saved tail and is updated in place with this block's tail for the
    /// next call. Returns this block's `n` reconstructed samples.
    pub(crate) fn inverse(&self, freq: &[f32], overlap_buf: &mut [f32]) -> Vec<f32> {
        debug_assert_eq!(freq.len(), self.n);
        debug_assert_eq!(overlap_buf.len(), self.n);

        let n = self.n;
        let scale = 2.0 / n as f64;
        let mut y = vec![0.0f64; 2 * n];
        for (t, slot) in y.iter_mut().enumerate() {
            let mut sum = 0.0f64;
            for (k, &fk) in freq.iter().enumerate() {
                let angle = std::f64::consts::PI / n as f64
                    * (t as f64 + 0.5 + n as f64 / 2.0)
                    * (k as f64 + 0.5);
                sum += f64::from(fk) * angle.cos();
            }
            *slot = sum * scale;
        }

        let mut out = vec![0.0f32; n];
        for i in 0..n {
            let first_half = (y[i] * f64::from(self.win(i))) as f32;
            out[i] = first_half + overlap_buf[i];
        }
        for i in 0..n {
            overlap_buf[i] = (y[n + i] * f64::from(self.win(n + i))) as f32;
        }
        out
    }
}

/// Frame-level wrapper implementing the short-block (transient) interleaving
/// rule: for `shorts` sub-blocks of size `n` each (`shorts * n == frame
/// size`), coefficient `k` of sub-block `b` lands at frame position
/// `k * shorts + b`.
pub(crate) struct FrameMdct {
    sub: Mdct,
    shorts: usize,
}

impl FrameMdct {
    /// Builds a frame-level plan with `shorts` sub-blocks, each transformed
    /// by a size-`sub_n` MDCT (so the frame is `shorts * sub_n` samples).
    pub(crate) fn new(sub_n: usize, shorts: usize) -> Self {
        debug_assert!(shorts >= 1);
        Self {
            sub: Mdct::new(sub_n),
            shorts,
        }
    }

    /// Forward transform of one frame. `history` is the previous frame's
    /// tail, used as sub-block 0's history; each later sub-block uses the
    /// prior sub-block's own raw input as its history. `input` and the
    /// returned frame both have length `shorts * sub_n`.
    pub(crate) fn forward(&self, history: &[f32], input: &[f32]) -> Vec<f32> {
        let n = self.sub.n();
        debug_assert_eq!(history.len(), n);
        debug_assert_eq!(input.len(), self.shorts * n);

        let mut out = vec![0.0f32; self.shorts * n];
        let mut carry = history.to_vec();
        for b in 0..self.shorts {
            let block = &input[b * n..(b + 1) * n];
            let coeffs = self.sub.forward(&carry, block);
            for (k, &c) in coeffs.iter().enumerate() {
                out[k * self.shorts + b] = c;
            }
            carry = block.to_vec();
        }
        out
    }

    /// Inverse transform of one frame, de-interleaving `freq` back into
    /// `shorts` groups of `n` bins and running independent sub-IMDCTs that
    /// share a single persisted `overlap_buf` (length `n`) across sub-blocks
    /// within the frame and across frames.
    pub(crate) fn inverse(&self, freq: &[f32], overlap_buf: &mut [f32]) -> Vec<f32> {
        let n = self.sub.n();
        debug_assert_eq!(freq.len(), self.shorts * n);
        debug_assert_eq!(overlap_buf.len(), n);

        let mut out = vec![0.0f32; self.shorts * n];
        for b in 0..self.shorts {
            let mut sub_freq = vec![0.0f32; n];
            for (k, slot) in sub_freq.iter_mut().enumerate() {
                *slot = freq[k * self.shorts + b];
            }
            let block = self.sub.inverse(&sub_freq, overlap_buf);
            out[b * n..(b + 1) * n].copy_from_slice(&block);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use nanorand::{Rng, WyRand};

    #[test]
    fn test_power_complementary_window() {
        let mdct = Mdct::new(16);
        for i in 0..16 {
            let a = mdct.win(i);
            let b = mdct.win(16 + i);
            assert!((a * a + b * b - 1.0).abs() < 1e-5, "i={i} a={a} b={b}");
        }
    }

    #[test]
    fn test_roundtrip_steady_tone_after_first_block() {
        // A stationary input should reconstruct (after the first, edge-affected
        // block) to the original signal, once windowing/overlap-add settles.
        let n = 32;
        let mdct = Mdct::new(n);
        let mut rng = WyRand::new_seed(42);
        let signal: Vec<f32> = (0..(n * 6))
            .map(|_| rng.generate::<u16>() as f32 / 65535.0 - 0.5)
            .collect();

        let mut prev = vec![0.0f32; n];
        let mut coeffs = Vec::new();
        for block in signal.chunks(n) {
            coeffs.push(mdct.forward(&prev, block));
            prev = block.to_vec();
        }

        let mut overlap = vec![0.0f32; n];
        let mut recon = Vec::new();
        for c in &coeffs {
            recon.extend(mdct.inverse(c, &mut overlap));
        }

        // Skip the first block (no true history) and the last (incomplete
        // overlap with a following block); compare the interior.
        for i in n..(signal.len() - n) {
            assert!(
                (recon[i] - signal[i]).abs() < 5e-3,
                "i={i} recon={} orig={}",
                recon[i],
                signal[i]
            );
        }
    }

    #[test]
    fn test_frame_mdct_matches_sub_block_count() {
        let frame = FrameMdct::new(8, 4);
        let history = vec![0.0f32; 8];
        let input: Vec<f32> = (0..32).map(|i| i as f32 * 0.01).collect();
        let coeffs = frame.forward(&history, &input);
        assert_eq!(coeffs.len(), 32);

        let mut overlap = vec![0.0f32; 8];
        let out = frame.inverse(&coeffs, &mut overlap);
        assert_eq!(out.len(), 32);
    }
}
