//! Coarse and fine band-energy coding.
//!
//! Coarse energy predicts each band's log2 energy from the previous frame
//! (inter mode) or resets per frame (intra mode), encodes the residual under
//! a per-band Laplace model, and carries a running "prediction leak" across
//! bands within the same frame. Fine energy spends whatever raw bits the
//! allocator (`celt::rate`) hands each band refining the coarse result.

use crate::encoder_error::EncoderError;
use crate::range_coder::{RangeDecoder, RangeEncoder, Tell};

use super::mode::{EnergyModel, BITRES, SMALL_ENERGY_ICDF};

/// Below this many bits remaining in the frame, the coarse coder falls back
/// from Laplace to the fixed 3-symbol `SMALL_ENERGY_ICDF`.
const SMALL_ENERGY_BUDGET_Q3: i32 = 15 << BITRES;
/// Below this many bits remaining, coarse energy is coerced to zero rather
/// than coded at all.
const ZERO_ENERGY_BUDGET_Q3: i32 = 2 << BITRES;

/// Per-channel coarse-energy predictor state, persisted across frames in
/// inter mode and reset to the silence floor whenever intra mode is forced.
#[derive(Clone, Debug)]
pub(crate) struct EnergyState {
    old_e: Vec<f32>,
}

impl EnergyState {
    pub(crate) fn new(nbands: usize) -> Self {
        Self {
            old_e: vec![super::mode::MIN_ENERGY; nbands],
        }
    }

    pub(crate) fn reset_to_floor(&mut self) {
        self.old_e.iter_mut().for_each(|e| *e = super::mode::MIN_ENERGY);
    }
}

/// Encodes coarse energy for every band, given each band's true log2 energy
/// (already `- eMeans` is applied internally) and `bits_budget_q3`, the total
/// frame bit budget in Q3 units. Bands coded late in a tight frame fall back
/// from Laplace to the fixed `SMALL_ENERGY_ICDF`, or are coerced to zero, per
/// however many bits `bits_budget_q3 - tell_frac()` leaves. Returns the
/// per-band quantized log2 energy (pre-fine-refinement), which the caller
/// needs both to denormalize bands and to compute each band's fine-energy
/// residual.
pub(crate) fn encode_coarse_energy(
    enc: &mut RangeEncoder,
    model: &EnergyModel,
    state: &mut EnergyState,
    log_energy: &[f32],
    intra: bool,
    lm: usize,
    bits_budget_q3: i32,
) -> Result<Vec<f32>, EncoderError> {
    let nbands = log_energy.len();
    let mut quantized = vec![0f32; nbands];
    let mut prev_in_frame = 0f32;

    let alpha = if intra { 0.0 } else { super::mode::ALPHA_COEF[lm] };
    let beta = if intra {
        super::mode::BETA_COEF_INTRA
    } else {
        super::mode::BETA_COEF_INTER[lm]
    };

    for i in 0..nbands {
        let f = log_energy[i] - model.e_means[i] - alpha * state.old_e[i] - prev_in_frame;
        let mut qi = f.round() as i32;

        let (fs0, decay) = if intra {
            model.prob_intra[i]
        } else {
            model.prob_inter[i]
        };

        let budget_left = bits_budget_q3 - enc.tell_frac() as i32;
        encode_one_coarse(enc, &mut qi, fs0, decay, budget_left)?;

        let q = qi as f32;
        let e = alpha * state.old_e[i] + prev_in_frame + q;
        quantized[i] = e;
        prev_in_frame += q * (1.0 - beta);
        state.old_e[i] = e;
    }

    Ok(quantized)
}

fn encode_one_coarse(
    enc: &mut RangeEncoder,
    qi: &mut i32,
    fs0: u32,
    decay: u32,
    budget_left_q3: i32,
) -> Result<(), EncoderError> {
    if budget_left_q3 < ZERO_ENERGY_BUDGET_Q3 {
        *qi = 0;
        return Ok(());
    }
    if budget_left_q3 < SMALL_ENERGY_BUDGET_Q3 {
        let clamped = (*qi).clamp(-1, 1);
        *qi = clamped;
        let s = (clamped + 1) as usize;
        enc.encode_icdf(s, &SMALL_ENERGY_ICDF, 2)?;
        return Ok(());
    }
    enc.encode_laplace(qi, fs0, decay)
}

/// Inverse of [`encode_coarse_energy`].
pub(crate) fn decode_coarse_energy(
    dec: &mut RangeDecoder,
    model: &EnergyModel,
    state: &mut EnergyState,
    intra: bool,
    lm: usize,
    bits_budget_q3: i32,
) -> Vec<f32> {
    let nbands = model.e_means.len();
    let mut quantized = vec![0f32; nbands];
    let mut prev_in_frame = 0f32;

    let alpha = if intra { 0.0 } else { super::mode::ALPHA_COEF[lm] };
    let beta = if intra {
        super::mode::BETA_COEF_INTRA
    } else {
        super::mode::BETA_COEF_INTER[lm]
    };

    for i in 0..nbands {
        let (fs0, decay) = if intra {
            model.prob_intra[i]
        } else {
            model.prob_inter[i]
        };

        let budget_left_q3 = bits_budget_q3 - dec.tell_frac() as i32;
        let qi = if budget_left_q3 < ZERO_ENERGY_BUDGET_Q3 {
            0
        } else if budget_left_q3 < SMALL_ENERGY_BUDGET_Q3 {
            let s = dec.decode_icdf(&SMALL_ENERGY_ICDF, 2) as i32;
            s - 1
        } else {
            dec.decode_laplace(fs0, decay)
        };

        let q = qi as f32;
        let e = alpha * state.old_e[i] + prev_in_frame + q;
        quantized[i] = e;
        prev_in_frame += q * (1.0 - beta);
        state.old_e[i] = e;
    }

    quantized
}

/// Refines one band's coarse log2 energy with `bits` raw bits, returning the
/// final log2 energy (coarse plus the decoded correction in `(-0.5, 0.5)`
/// band-energy units).
pub(crate) fn encode_fine_energy(
    enc: &mut RangeEncoder,
    coarse: f32,
    true_value: f32,
    bits: u32,
) -> Result<f32, EncoderError> {
    if bits == 0 {
        return Ok(coarse);
    }
    let steps = 1u32 << bits;
    let residual = (true_value - coarse + 0.5).clamp(0.0, 0.999_999);
    let q = (residual * steps as f32) as u32;
    enc.encode_bits(q, bits)?;
    let correction = (q as f32 + 0.5) / steps as f32 - 0.5;
    Ok(coarse + correction)
}

/// Inverse of [`encode_fine_energy`].
pub(crate) fn decode_fine_energy(dec: &mut RangeDecoder, coarse: f32, bits: u32) -> f32 {
    if bits == 0 {
        return coarse;
    }
    let steps = 1u32 << bits;
    let q = dec.decode_bits(bits);
    let correction = (q as f32 + 0.5) / steps as f32 - 0.5;
    coarse + correction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celt::mode;

    #[test]
    fn test_coarse_energy_roundtrip_inter() {
        let m = mode::mode();
        let lm = 1;
        let model = &m.energy[lm];
        let nbands = model.e_means.len();

        let log_energy: Vec<f32> = (0..nbands).map(|i| (i as f32 * 0.3).sin() * 4.0).collect();

        let mut buffer = vec![0u8; 4096];
        let mut enc_state = EnergyState::new(nbands);
        let mut enc = RangeEncoder::new(&mut buffer);
        let q_enc =
            encode_coarse_energy(&mut enc, model, &mut enc_state, &log_energy, true, lm, 1 << 20)
                .unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut dec_state = EnergyState::new(nbands);
        let mut dec = RangeDecoder::new(&buffer);
        let q_dec = decode_coarse_energy(&mut dec, model, &mut dec_state, true, lm, 1 << 20);

        for (a, b) in q_enc.iter().zip(q_dec.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn test_fine_energy_roundtrip() {
        let mut buffer = vec![0u8; 64];
        let mut enc = RangeEncoder::new(&mut buffer);
        let refined = encode_fine_energy(&mut enc, 2.0, 2.3, 5).unwrap();
        enc.done().unwrap();
        drop(enc);

        let mut dec = RangeDecoder::new(&buffer);
        let decoded = decode_fine_energy(&mut dec, 2.0, 5);
        assert!((refined - decoded).abs() < 1e-6);
        assert!((refined - 2.3).abs() < 0.05);
    }

    #[test]
    fn test_fine_energy_zero_bits_is_noop() {
        let mut buffer = vec![0u8; 8];
        let mut enc = RangeEncoder::new(&mut buffer);
        let refined = encode_fine_energy(&mut enc, 1.5, 1.9, 0).unwrap();
        assert_eq!(refined, 1.5);
    }
}
