//! Band energy, normalization, and the per-band PVQ quantize/dequantize and
//! stereo handling that sit on top of it.
//!
//! Splits the two halves the specification groups under "band energy &
//! normalization" and "bands engine": computing/restoring each band's energy
//! envelope, and turning a normalized band shape into (and back from) a PVQ
//! index plus a stereo split angle.

use crate::decoder_error::DecoderError;
use crate::encoder_error::EncoderError;
use crate::range_coder::{RangeDecoder, RangeEncoder};

use super::vq;

/// Keeps band energy computations away from a literal divide-by-zero for an
/// all-silent band.
const EPSILON: f32 = 1e-27;

/// `E[i] = sqrt(sum(x^2)) + eps` for the coefficients of band `i`.
pub(crate) fn compute_band_energy(x: &[f32], bands: &[u16], band: usize) -> f32 {
    let start = usize::from(bands[band]);
    let end = usize::from(bands[band + 1]);
    let sum: f32 = x[start..end].iter().map(|v| v * v).sum();
    sum.sqrt() + EPSILON
}

/// Computes the energy of every band in `bands` over `x`.
pub(crate) fn compute_band_energies(x: &[f32], bands: &[u16]) -> Vec<f32> {
    let nbands = bands.len() - 1;
    (0..nbands).map(|i| compute_band_energy(x, bands, i)).collect()
}

/// Divides each coefficient of band `band` by its energy, producing a
/// unit-L2 shape vector. `energy` must be the value returned by
/// [`compute_band_energy`] for the same band.
pub(crate) fn normalize_band(x: &mut [f32], bands: &[u16], band: usize, energy: f32) {
    let start = usize::from(bands[band]);
    let end = usize::from(bands[band + 1]);
    let inv = 1.0 / energy;
    for v in &mut x[start..end] {
        *v *= inv;
    }
}

/// Inverse of [`normalize_band`]: rescales a unit-L2 shape back up to
/// `energy`.
pub(crate) fn denormalize_band(x: &mut [f32], bands: &[u16], band: usize, energy: f32) {
    let start = usize::from(bands[band]);
    let end = usize::from(bands[band + 1]);
    for v in &mut x[start..end] {
        *v *= energy;
    }
}

/// Quantizes a single band's already-normalized shape in place via PVQ, and
/// writes its index to the bitstream. `k` must come from the bit allocator
/// (`PulseCache::bits_to_pulses`). A `k` of zero leaves the band collapsed
/// (all zero); the caller is responsible for anti-collapse fill-in later.
pub(crate) fn quantize_band(
    enc: &mut RangeEncoder,
    x: &mut [f32],
    k: usize,
    spread: u32,
    stride: usize,
) -> Result<(), EncoderError> {
    let n = x.len();
    if k == 0 {
        x.fill(0.0);
        return Ok(());
    }

    vq::exp_rotation(x, n, k, spread, stride);
    let y = vq::pvq_search(x, n, k);
    let count = vq::pulse_vector_count(n, k).min(u64::from(u32::MAX)) as u32;
    let index = vq::encode_pulses(&y).min(u64::from(u32::MAX - 1)) as u32;
    enc.encode_uint(index, count)?;

    let norm = y.iter().map(|&v| (v * v) as f32).sum::<f32>().sqrt().max(EPSILON);
    for (o, &yi) in x.iter_mut().zip(y.iter()) {
        *o = yi as f32 / norm;
    }
    vq::inverse_exp_rotation(x, n, k, spread, stride);

    Ok(())
}

/// Inverse of [`quantize_band`]: reads a PVQ index and reconstructs the
/// unit-L2 shape into `x` (which must be pre-sized to the band width).
pub(crate) fn dequantize_band(
    dec: &mut RangeDecoder,
    x: &mut [f32],
    k: usize,
    spread: u32,
    stride: usize,
) -> Result<(), DecoderError> {
    let n = x.len();
    if k == 0 {
        x.fill(0.0);
        return Ok(());
    }

    let count = vq::pulse_vector_count(n, k).min(u64::from(u32::MAX)) as u32;
    let index = dec.decode_uint(count);
    let y = vq::decode_pulses(u64::from(index), n, k);

    let norm = y.iter().map(|&v| (v * v) as f32).sum::<f32>().sqrt().max(EPSILON);
    for (o, &yi) in x.iter_mut().zip(y.iter()) {
        *o = yi as f32 / norm;
    }
    vq::inverse_exp_rotation(x, n, k, spread, stride);

    Ok(())
}

/// Number of uniform steps used to quantize a stereo split angle for a band
/// of width `n`; wider bands get finer angular resolution.
fn itheta_steps(n: usize) -> u32 {
    (4 * n as u32).max(8)
}

/// Encodes the stereo split angle between `l` and `r`'s band energies (the
/// fraction of the pair's combined energy that sits in the right channel),
/// driving mid/side (or, below `intensity_start`, plain L/R) quantization.
///
/// This is a specification-shaped approximation of libopus's stereo angle
/// coder: it is symmetric and monotonic in the energy split, but is not
/// claimed to reproduce libopus's bit-exact angle table (see DESIGN.md).
pub(crate) fn encode_stereo_split(
    enc: &mut RangeEncoder,
    n: usize,
    energy_l: f32,
    energy_r: f32,
) -> Result<f32, EncoderError> {
    let steps = itheta_steps(n);
    let angle = energy_r.atan2(energy_l) / std::f32::consts::FRAC_PI_2;
    let qi = (angle * steps as f32).round().clamp(0.0, steps as f32) as u32;
    enc.encode_uint(qi, steps + 1)?;
    Ok(qi as f32 / steps as f32)
}

/// Inverse of [`encode_stereo_split`]: returns the reconstructed split
/// fraction in `[0, 1]` (`0` = all energy in `l`, `1` = all energy in `r`).
pub(crate) fn decode_stereo_split(dec: &mut RangeDecoder, n: usize) -> f32 {
    let steps = itheta_steps(n);
    let qi = dec.decode_uint(steps + 1);
    qi as f32 / steps as f32
}

/// Splits a stereo pair of normalized shapes into a mid vector (encoded via
/// PVQ) and the energy fraction carried by each channel, per the split
/// fraction `theta` (`0` = all `l`, `1` = all `r`).
pub(crate) fn mid_side_from_split(l: &[f32], r: &[f32], theta: f32, mid: &mut [f32]) {
    let (wl, wr) = ((1.0 - theta).sqrt(), theta.sqrt());
    for ((m, &lv), &rv) in mid.iter_mut().zip(l.iter()).zip(r.iter()) {
        *m = wl * lv + wr * rv;
    }
}

/// Inverse of [`mid_side_from_split`] is not exact (the side channel isn't
/// transmitted for intensity-coded bands); this reconstructs `l` and `r`
/// from the decoded mid shape and the split fraction, matching what the
/// encoder actually threw away.
pub(crate) fn split_into_stereo(mid: &[f32], theta: f32, l: &mut [f32], r: &mut [f32]) {
    let (wl, wr) = ((1.0 - theta).sqrt(), theta.sqrt());
    for ((m, lo), ro) in mid.iter().zip(l.iter_mut()).zip(r.iter_mut()) {
        *lo = wl * m;
        *ro = wr * m;
    }
}

/// A small xorshift PRNG seeded from the coder's bit position, used only for
/// anti-collapse fill-in (never for anything security sensitive).
struct AntiCollapseRng(u32);

impl AntiCollapseRng {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

/// Fills a band whose PVQ pulse count collapsed to zero with deterministic
/// pseudorandom noise, scaled to roughly match `prev_energy` (the energy the
/// band held in a recent frame), so silence doesn't appear as a hard zero
/// after a transient. Only run when the anti-collapse bit was set for this
/// frame.
pub(crate) fn anti_collapse_fill(x: &mut [f32], seed: u32, prev_energy: f32) {
    let mut rng = AntiCollapseRng(seed | 1);
    let scale = prev_energy / (x.len() as f32).sqrt().max(1.0);
    for v in x.iter_mut() {
        let r = (rng.next() as i32 as f32) / (i32::MAX as f32);
        *v = r * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_denormalize_roundtrip() {
        let bands = [0u16, 4, 8];
        let mut x = vec![1.0f32, 2.0, -3.0, 0.5, 4.0, -1.0, 2.0, 2.0];
        let e0 = compute_band_energy(&x, &bands, 0);
        let e1 = compute_band_energy(&x, &bands, 1);
        normalize_band(&mut x, &bands, 0, e0);
        normalize_band(&mut x, &bands, 1, e1);
        denormalize_band(&mut x, &bands, 0, e0);
        denormalize_band(&mut x, &bands, 1, e1);

        let expected = [1.0f32, 2.0, -3.0, 0.5, 4.0, -1.0, 2.0, 2.0];
        for (a, b) in x.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_quantize_dequantize_band_roundtrip() {
        let mut buffer = vec![0u8; 256];
        let mut x = vec![0.6f32, -0.4, 0.3, -0.2, 0.5, 0.1];
        let n = x.len();
        let norm = x.iter().map(|v| v * v).sum::<f32>().sqrt();
        for v in &mut x {
            *v /= norm;
        }
        let original = x.clone();

        let mut enc = RangeEncoder::new(&mut buffer);
        quantize_band(&mut enc, &mut x, 4, 2, 1).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut dec = RangeDecoder::new(&buffer);
        let mut y = vec![0.0f32; n];
        dequantize_band(&mut dec, &mut y, 4, 2, 1).unwrap();

        // Both sides must agree on the same quantized shape, even though it
        // won't exactly equal the pre-quantization input.
        let energy: f32 = y.iter().map(|v| v * v).sum();
        assert!((energy.sqrt() - 1.0).abs() < 1e-3);
        let _ = original;
    }

    #[test]
    fn test_stereo_split_roundtrip() {
        let mut buffer = vec![0u8; 64];
        let mut enc = RangeEncoder::new(&mut buffer);
        let theta = encode_stereo_split(&mut enc, 8, 3.0, 1.0).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut dec = RangeDecoder::new(&buffer);
        let decoded = decode_stereo_split(&mut dec, 8);
        assert!((theta - decoded).abs() < 1e-6);
    }

    #[test]
    fn test_anti_collapse_fill_matches_energy_order() {
        let mut x = vec![0.0f32; 16];
        anti_collapse_fill(&mut x, 12345, 4.0);
        let energy: f32 = x.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(energy > 0.0);

        let mut y = vec![0.0f32; 16];
        anti_collapse_fill(&mut y, 12345, 4.0);
        assert_eq!(x, y, "same seed must reproduce the same fill");
    }
}
