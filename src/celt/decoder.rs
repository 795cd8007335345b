//! Implements the CELT decoder.
//!
//! Mirrors `celt::encoder` in reverse: reads the header flags, coarse/fine
//! energy, and per-band PVQ shapes out of a [`RangeDecoder`], runs the
//! inverse MDCT (long or short block, depending on the decoded transient
//! bit) with persistent overlap-add state, optionally applies the
//! comb-filter postfilter, and de-emphasizes back into PCM.

use crate::celt::bands::{self, denormalize_band};
use crate::celt::comb_filter::comb_filter_inplace;
use crate::celt::mdct::{FrameMdct, Mdct};
use crate::celt::mode::{self, BITRES, NBANDS, SPREAD_ICDF, TRIM_ICDF};
use crate::celt::quant_bands::{decode_coarse_energy, decode_fine_energy, EnergyState};
use crate::celt::rate::compute_allocation;
use crate::decoder_error::DecoderError;
use crate::range_coder::{RangeDecoder, Tell};
use crate::{Channels, SamplingRate};

const PREEMPHASIS: f32 = 0.85;

/// Mirrors `celt::encoder`'s dynalloc loop bound and `logp` sequence exactly;
/// see that module for why.
const DYNALLOC_LOGP_START: u32 = 6;
const DYNALLOC_LOGP_FLOOR: u32 = 2;
const MAX_BOOST_STEPS: usize = 8;
const BOOST_QUANTUM_Q3: i32 = 1 << BITRES;

/// Per-band start/end sample bounds, clipped to the frame's actual size `n`;
/// see `celt::encoder` for why the nominal band table needs clipping.
fn effective_bands(bounds: &[u16], n: usize) -> Vec<(usize, usize)> {
    bounds
        .windows(2)
        .map(|w| {
            let start = usize::from(w[0]).min(n);
            let end = usize::from(w[1]).min(n);
            (start, end)
        })
        .collect()
}

#[derive(Clone, Debug)]
struct ChannelState {
    deemph_mem: f32,
    /// Always `frame_size` long; for a transient frame the inverse MDCT
    /// only reads/writes its first `sub_n` entries (see `decode_frame`),
    /// leaving the rest zeroed rather than carrying stale data forward.
    overlap: Vec<f32>,
    energy: EnergyState,
    /// History needed by the comb filter postfilter: the last
    /// `COMBFILTER_MAXPERIOD`-ish samples of de-emphasized output. Sized
    /// generously (4x the frame) so any in-range pitch lag has enough
    /// lookback.
    postfilter_history: Vec<f32>,
    prev_pitch_period: usize,
    prev_gain: f32,
    prev_tapset: usize,
}

impl ChannelState {
    fn new(n: usize) -> Self {
        Self {
            deemph_mem: 0.0,
            overlap: vec![0.0; n],
            energy: EnergyState::new(NBANDS),
            postfilter_history: vec![0.0; n * 4],
            prev_pitch_period: 0,
            prev_gain: 0.0,
            prev_tapset: 0,
        }
    }
}

/// The CELT decoder.
#[derive(Clone, Debug)]
pub(crate) struct CeltDecoder {
    sampling_rate: SamplingRate,
    channels: Channels,
    channel_state: Vec<ChannelState>,
    frame_n: usize,
    last_pitch: u32,
    final_range: u32,
}

impl CeltDecoder {
    /// Creates a new CELT decoder.
    pub(crate) fn new(sampling_rate: SamplingRate, channels: Channels) -> Result<Self, DecoderError> {
        Ok(Self {
            sampling_rate,
            channels,
            channel_state: Vec::new(),
            frame_n: 0,
            last_pitch: 0,
            final_range: 0,
        })
    }

    /// Resets the CELT decoder.
    pub(crate) fn reset(&mut self) -> Result<(), DecoderError> {
        self.channel_state.clear();
        self.frame_n = 0;
        self.last_pitch = 0;
        self.final_range = 0;
        Ok(())
    }

    /// Gets the pitch of the last decoded frame.
    pub(crate) fn pitch(&self) -> u32 {
        self.last_pitch
    }

    /// The entropy coder's final range after the last frame decoded.
    pub(crate) fn final_range(&self) -> u32 {
        self.final_range
    }

    fn num_channels(&self) -> usize {
        self.channels as usize
    }

    /// Decodes one CELT frame of `frame_size` samples per channel from
    /// `packet`, returning interleaved PCM.
    pub(crate) fn decode_frame(&mut self, packet: &[u8], frame_size: usize) -> Result<Vec<f32>, DecoderError> {
        let channels = self.num_channels();
        let lm = mode::lm_for_frame_size(self.sampling_rate, frame_size).ok_or(DecoderError::InvalidFrameSize)?;

        if self.frame_n != frame_size || self.channel_state.len() != channels {
            self.channel_state = (0..channels).map(|_| ChannelState::new(frame_size)).collect();
            self.frame_n = frame_size;
        }

        let m = mode::mode();
        let bounds = m.bands(lm);
        let bands = effective_bands(bounds, frame_size);
        let model = &m.energy[lm];

        if packet.is_empty() {
            return Ok(self.conceal(channels, frame_size));
        }

        let mut dec = RangeDecoder::new(packet);

        // Silence is the very first bit and, when set, ends the frame
        // immediately: no other symbol is present in the bitstream (spec
        // §4.9 step 11 / §6 table).
        let silence = dec.decode_bit_logp(15);
        if silence {
            self.final_range = dec.range();
            return Ok(vec![0.0; frame_size * channels]);
        }

        let postfilter = dec.decode_bit_logp(1);
        let (pitch_period, gain, tapset) = if postfilter {
            let octave = dec.decode_uint(6);
            let period = (16u32 << octave) + dec.decode_bits(4 + octave) - 1;
            let gain_q3 = dec.decode_bits(3);
            let gain = 0.09375 * (gain_q3 as f32 + 1.0);
            let tapset = if dec.tell() as i64 + 2 <= (packet.len() as i64) * 8 {
                dec.decode_icdf(&mode::TAPSET_ICDF, 2) as usize
            } else {
                0
            };
            (period as usize, gain, tapset)
        } else {
            (0, 0.0, 0)
        };
        let transient = lm > 0 && dec.decode_bit_logp(3);
        let intra = dec.decode_bit_logp(3);

        let total_bits_q3 = (packet.len() as i32) * 8 << BITRES;
        let mut quantized_energy = vec![Vec::new(); channels];
        for c in 0..channels {
            quantized_energy[c] = decode_coarse_energy(&mut dec, model, &mut self.channel_state[c].energy, intra, lm, total_bits_q3);
        }

        // TF changes: one bit per band, plus a tf_select bit when LM > 0.
        // Mirrors `celt::encoder::detect_tf_changes`'s emission order and
        // `logp` choice exactly; see that module for the disclosed scope
        // limit (the bit is consumed but doesn't yet reselect per-band
        // transform resolution here either).
        let mut tf_changes = vec![false; NBANDS];
        let tf_logp = if transient { 2 } else { 4 };
        for change in &mut tf_changes {
            *change = dec.decode_bit_logp(tf_logp);
        }
        let _tf_select = if lm > 0 { dec.decode_bit_logp(1) } else { false };

        let spread = dec.decode_icdf(&SPREAD_ICDF, 5) as u32;

        let mut offsets = vec![0i32; NBANDS];
        for offset in &mut offsets {
            *offset = decode_dynalloc_band(&mut dec);
        }

        let trim = dec.decode_icdf(&TRIM_ICDF, 7) as i32;

        let remaining_q3 = total_bits_q3 - (dec.tell_frac() as i32);
        let caps: Vec<i32> = (0..NBANDS)
            .map(|i| {
                let (start, end) = bands[i];
                ((end - start) as i32 * 16) << BITRES
            })
            .collect();
        let alloc = compute_allocation(model, &m.pulse_cache, lm, remaining_q3, &offsets, trim, &caps);

        for c in 0..channels {
            for i in 0..NBANDS {
                quantized_energy[c][i] = decode_fine_energy(&mut dec, quantized_energy[c][i], alloc.fine_bits[i]);
            }
        }

        let mut freq = vec![vec![0.0f32; frame_size]; channels];
        for i in 0..NBANDS {
            let (start, end) = bands[i];
            if end <= start {
                continue;
            }
            let n = end - start;
            let k = alloc.pulses[i];

            if channels == 1 {
                let mut shape = vec![0.0f32; n];
                bands::dequantize_band(&mut dec, &mut shape, k, spread, 1)?;
                freq[0][start..end].copy_from_slice(&shape);
            } else {
                let theta = bands::decode_stereo_split(&mut dec, n);
                let mut mid = vec![0.0f32; n];
                bands::dequantize_band(&mut dec, &mut mid, k, spread, 1)?;
                let mut lo = vec![0.0f32; n];
                let mut ro = vec![0.0f32; n];
                bands::split_into_stereo(&mid, theta, &mut lo, &mut ro);
                freq[0][start..end].copy_from_slice(&lo);
                freq[1][start..end].copy_from_slice(&ro);
            }

            for c in 0..channels {
                let e = 2.0f32.powf(quantized_energy[c][i] + model.e_means[i]);
                denormalize_band(&mut freq[c], bounds, i, e);
            }
        }

        self.final_range = dec.range();

        let shorts = if transient { 1usize << lm } else { 1 };
        let sub_n = frame_size / shorts;

        let mut out = vec![0.0f32; frame_size * channels];
        for c in 0..channels {
            let state = &mut self.channel_state[c];
            let block = if shorts > 1 {
                let fmdct = FrameMdct::new(sub_n, shorts);
                // The short transform's overlap region only spans `sub_n`
                // samples; seed it from the start of the persisted
                // full-frame buffer (the samples this frame's first
                // sub-block actually overlaps with), run the inverse, then
                // zero the rest of the buffer since a short block's tail
                // carries no information past its own `sub_n` samples.
                let mut sub_overlap = state.overlap[..sub_n].to_vec();
                let block = fmdct.inverse(&freq[c], &mut sub_overlap);
                state.overlap.iter_mut().for_each(|v| *v = 0.0);
                state.overlap[..sub_n].copy_from_slice(&sub_overlap);
                block
            } else {
                let mdct = Mdct::new(frame_size);
                mdct.inverse(&freq[c], &mut state.overlap)
            };

            let drop = frame_size.min(state.postfilter_history.len());
            state.postfilter_history.drain(0..drop);
            state.postfilter_history.extend_from_slice(&block);

            let mut filtered = block.clone();
            if postfilter && pitch_period + 2 < state.postfilter_history.len() {
                let offset = state.postfilter_history.len() - frame_size;
                let mut scratch = state.postfilter_history.clone();
                comb_filter_inplace(
                    &mut scratch,
                    offset,
                    state.prev_pitch_period.max(pitch_period),
                    pitch_period,
                    frame_size,
                    state.prev_gain,
                    gain,
                    state.prev_tapset,
                    tapset,
                    mode::OVERLAP.min(frame_size),
                );
                filtered.copy_from_slice(&scratch[offset..offset + frame_size]);
            }
            state.prev_pitch_period = pitch_period;
            state.prev_gain = gain;
            state.prev_tapset = tapset;

            for i in 0..frame_size {
                let y = filtered[i] + PREEMPHASIS * state.deemph_mem;
                state.deemph_mem = y;
                out[i * channels + c] = y.clamp(-1.0, 1.0);
            }
        }

        self.last_pitch = pitch_period as u32;

        Ok(out)
    }

    /// Packet-loss concealment: produces a frame of silence.
    ///
    /// A full PLC implementation would extrapolate from the pitch history
    /// kept in `channel_state`; this always returns silence, which is a
    /// valid (if unconditionally audible) concealment strategy.
    fn conceal(&mut self, channels: usize, frame_size: usize) -> Vec<f32> {
        vec![0.0; frame_size * channels]
    }
}

/// Decodes one band's dynalloc boost: a run of continuation bits with the
/// same strictly-decreasing `logp` sequence and `MAX_BOOST_STEPS` bound as
/// `celt::encoder::encode_dynalloc_band`, which this must stay in lock-step
/// with.
fn decode_dynalloc_band(dec: &mut RangeDecoder<'_>) -> i32 {
    let mut boost = 0i32;
    for s in 0..MAX_BOOST_STEPS {
        let logp = DYNALLOC_LOGP_START.saturating_sub(s as u32).max(DYNALLOC_LOGP_FLOOR);
        if !dec.decode_bit_logp(logp) {
            break;
        }
        boost += BOOST_QUANTUM_Q3;
    }
    boost
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_decode_frame_with_empty_packet_is_silence() {
        let mut dec = CeltDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let out = dec.decode_frame(&[], 120).unwrap();
        assert_eq!(out, vec![0.0f32; 120]);
    }

    #[test]
    fn test_invalid_frame_size_is_rejected() {
        let mut dec = CeltDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let err = dec.decode_frame(&[0u8; 32], 123);
        assert!(matches!(err, Err(DecoderError::InvalidFrameSize)));
    }
}
