//! Implement the Opus encoder.

use crate::celt::CeltEncoder;
use crate::{Bandwidth, Channels, EncoderError, Sample, SamplingRate};

/// Encoder application hint, matching libopus's three tuning presets.
///
/// This encoder only ever runs the CELT path (see module docs on
/// [`Encoder`]), so the hint doesn't change which codec runs; it's accepted
/// and stored for API compatibility and to bias bitrate bookkeeping the way
/// a caller would expect.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Application {
    /// Favors speech intelligibility.
    Voip,
    /// Favors general audio quality.
    Audio,
    /// Favors low end-to-end delay.
    RestrictedLowDelay,
}

/// Hint about the kind of signal being encoded, set via
/// [`Encoder::set_signal`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signal {
    /// Let the encoder infer the signal type.
    Auto,
    /// The signal is voice.
    Voice,
    /// The signal is music.
    Music,
}

/// Lowest bitrate, in bits per second, accepted by [`Encoder::set_bitrate`].
const MIN_BITRATE: i32 = 500;
/// Highest bitrate, in bits per second, accepted by [`Encoder::set_bitrate`].
const MAX_BITRATE: i32 = 512_000;
/// Largest payload a single Opus frame can carry (RFC 6716 §3.2.1).
const MAX_FRAME_BYTES: usize = 1275;

/// Configures the encoder on creation.
#[derive(Clone, Copy, Debug)]
pub struct EncoderConfiguration {
    /// Sample rate of the input PCM (Hz).
    pub sampling_rate: SamplingRate,
    /// Number of channels of the input PCM.
    pub channels: Channels,
    /// Tuning hint; see [`Application`].
    pub application: Application,
}

impl Default for EncoderConfiguration {
    fn default() -> Self {
        Self {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Stereo,
            application: Application::Audio,
        }
    }
}

/// Opus encoder.
///
/// SILK and hybrid encoding are explicit non-goals (see `DESIGN.md`): every
/// frame is encoded through the CELT path regardless of `application` or
/// `bandwidth`, at a constant bitrate derived from [`Encoder::set_bitrate`].
#[derive(Clone, Debug)]
pub struct Encoder {
    celt_enc: CeltEncoder,
    sampling_rate: SamplingRate,
    channels: Channels,

    application: Application,
    bitrate: i32,
    complexity: u8,
    vbr: bool,
    bandwidth: Bandwidth,
    signal: Signal,
    force_channels: Option<Channels>,
    packet_loss_perc: u8,
    lsb_depth: u8,

    final_range: u32,
}

impl Encoder {
    /// Creates a new `Encoder` with the given configuration.
    pub fn new(configuration: &EncoderConfiguration) -> Result<Self, EncoderError> {
        let celt_enc = CeltEncoder::new(configuration.sampling_rate, configuration.channels)?;

        Ok(Self {
            celt_enc,
            sampling_rate: configuration.sampling_rate,
            channels: configuration.channels,
            application: configuration.application,
            bitrate: 64_000,
            complexity: 10,
            vbr: false,
            bandwidth: Bandwidth::Auto,
            signal: Signal::Auto,
            force_channels: None,
            packet_loss_perc: 0,
            lsb_depth: 24,
            final_range: 0,
        })
    }

    /// Resets the `Encoder` to be equivalent to a freshly initialized encoder.
    pub fn reset(&mut self) {
        self.celt_enc.reset();
        self.final_range = 0;
    }

    /// Returns the sampling rate the encoder was initialized with.
    pub fn sampling_rate(&self) -> SamplingRate {
        self.sampling_rate
    }

    /// Returns the channels the encoder was initialized with.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Sets the target bitrate, in bits per second.
    ///
    /// Values outside `[500, 512000]` are clamped to the nearest bound
    /// (matching libopus's `OPUS_SET_BITRATE` behaviour) and logged.
    pub fn set_bitrate(&mut self, bits_per_second: i32) -> Result<(), EncoderError> {
        if bits_per_second < MIN_BITRATE || bits_per_second > MAX_BITRATE {
            log::warn!(
                "requested bitrate {} out of range [{}, {}], clamping",
                bits_per_second,
                MIN_BITRATE,
                MAX_BITRATE
            );
            self.bitrate = bits_per_second.clamp(MIN_BITRATE, MAX_BITRATE);
            return Ok(());
        }
        self.bitrate = bits_per_second;
        Ok(())
    }

    /// Sets the encoder's computational complexity, `0..=10`.
    pub fn set_complexity(&mut self, complexity: u8) -> Result<(), EncoderError> {
        if complexity > 10 {
            return Err(EncoderError::InternalError("complexity must be between 0 and 10"));
        }
        self.complexity = complexity;
        Ok(())
    }

    /// Enables or disables variable bitrate.
    ///
    /// This encoder always runs constant bitrate internally (see the module
    /// documentation): setting `vbr(true)` is accepted and recorded for API
    /// compatibility but has no effect on `encode`/`encode_float`.
    pub fn set_vbr(&mut self, vbr: bool) {
        self.vbr = vbr;
    }

    /// Sets the encoder's bandpass.
    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.bandwidth = bandwidth;
    }

    /// Sets a hint about the kind of signal being encoded.
    pub fn set_signal(&mut self, signal: Signal) {
        self.signal = signal;
    }

    /// Forces the encoder to encode as a specific channel count, or `None`
    /// to use the channel count it was constructed with.
    pub fn set_force_channels(&mut self, channels: Option<Channels>) -> Result<(), EncoderError> {
        if let Some(c) = channels {
            if c as usize > self.channels as usize {
                return Err(EncoderError::UnsupportedChannelCount);
            }
        }
        self.force_channels = channels;
        Ok(())
    }

    /// Sets the expected packet loss percentage, `0..=100`.
    pub fn set_packet_loss_perc(&mut self, percentage: u8) -> Result<(), EncoderError> {
        if percentage > 100 {
            return Err(EncoderError::InternalError("packet loss percentage must be between 0 and 100"));
        }
        self.packet_loss_perc = percentage;
        Ok(())
    }

    /// Sets the depth, in bits, of the source PCM, used only to scale
    /// internal dithering decisions.
    pub fn set_lsb_depth(&mut self, depth: u8) -> Result<(), EncoderError> {
        if !(8..=24).contains(&depth) {
            return Err(EncoderError::InternalError("lsb depth must be between 8 and 24"));
        }
        self.lsb_depth = depth;
        Ok(())
    }

    /// Returns the final state of the codec's entropy coder, for
    /// cross-checking against a decoder running the same stream.
    pub fn final_range(&self) -> u32 {
        self.final_range
    }

    /// Returns how many bytes a single frame should target at the current
    /// bitrate, clamped to both `out.len()` and the largest payload a single
    /// Opus frame can carry.
    fn target_frame_bytes(&self, frame_size: usize, out_len: usize) -> usize {
        let bits = i64::from(self.bitrate) * frame_size as i64;
        let bytes = bits / (self.sampling_rate as i64 * 8);
        (bytes.max(1) as usize).min(out_len).min(MAX_FRAME_BYTES)
    }

    /// Encodes one frame of generically-typed PCM, returning the number of
    /// bytes written to `out`.
    pub fn encode<S: Sample + Copy>(&mut self, pcm: &[S], frame_size: usize, out: &mut [u8]) -> Result<usize, EncoderError> {
        let float_pcm: Vec<f32> = pcm.iter().map(|&s| s.to_f32()).collect();
        self.encode_float(&float_pcm, frame_size, out)
    }

    /// Encodes one frame of floating point PCM, returning the number of
    /// bytes written to `out`, including the leading Opus TOC byte.
    ///
    /// Every packet this encoder produces carries exactly one CELT-only
    /// frame (code 0, see RFC 6716 §3.1): no padding, no multi-frame
    /// packing. The TOC always declares fullband regardless of
    /// `self.sampling_rate`/`self.bandwidth` (see `DESIGN.md`); the
    /// sampling rate actually used to size the frame is the one the
    /// decoder is separately configured with, not derived from the TOC.
    pub fn encode_float(&mut self, pcm: &[f32], frame_size: usize, out: &mut [u8]) -> Result<usize, EncoderError> {
        if out.len() < 2 {
            return Err(EncoderError::BufferToSmall);
        }
        let lm = crate::celt::lm_for_frame_size(self.sampling_rate, frame_size).ok_or(EncoderError::InvalidFrameSize)?;
        let stereo_bit = u8::from(self.channels == Channels::Stereo) << 2;
        // Config numbers 28..=31 select CELT-only fullband at audio sizes 0..=3.
        let config = (28 + lm as u8) << 3;
        out[0] = config | stereo_bit;

        let target = self.target_frame_bytes(frame_size, out.len() - 1);
        let written = self.celt_enc.encode_frame(pcm, frame_size, &mut out[1..1 + target])?;
        self.final_range = self.celt_enc.final_range();
        Ok(written + 1)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_set_bitrate_clamps_out_of_range() {
        let mut enc = Encoder::new(&EncoderConfiguration::default()).unwrap();
        enc.set_bitrate(10).unwrap();
        assert_eq!(enc.bitrate, MIN_BITRATE);
        enc.set_bitrate(10_000_000).unwrap();
        assert_eq!(enc.bitrate, MAX_BITRATE);
    }

    #[test]
    fn test_set_complexity_rejects_out_of_range() {
        let mut enc = Encoder::new(&EncoderConfiguration::default()).unwrap();
        assert!(enc.set_complexity(11).is_err());
        assert!(enc.set_complexity(5).is_ok());
    }

    #[test]
    fn test_encode_float_targets_bitrate_budget() {
        let mut config = EncoderConfiguration::default();
        config.channels = Channels::Mono;
        let mut enc = Encoder::new(&config).unwrap();
        enc.set_bitrate(64_000).unwrap();

        let pcm = vec![0.0f32; 120];
        let mut out = vec![0u8; 256];
        let written = enc.encode_float(&pcm, 120, &mut out).unwrap();
        assert!(written > 0);
        assert!(written <= 256);
    }
}
