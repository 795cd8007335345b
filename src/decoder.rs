//! Implement the Opus decoder.

use crate::celt::CeltDecoder;
use crate::silk::SilkDecoder;
use crate::{
    pcm_soft_clip, query_packet_bandwidth, query_packet_channel_count, query_packet_codec_mode,
    query_packet_samples_per_frame, Bandwidth, Channels, CodecMode, DecoderError, Sample, SamplingRate,
};

/// Converts a Q8 dB gain (256 units per dB) into a linear amplitude scale.
fn gain_to_linear(gain_q8: i16) -> f32 {
    10f32.powf(f32::from(gain_q8) / (256.0 * 20.0))
}

/// Configures the decoder on creation.
///
/// Internally Opus stores data at 48000 Hz, so that should be the default
/// value for the sampling rate. However, the decoder can efficiently decode
/// to buffers at 8, 12, 16, and 24 kHz so if for some reason the caller cannot
/// use data at the full sample rate, or knows the compressed data doesn't
/// use the full frequency range, it can request decoding at a reduced
/// rate. Likewise, the decoder is capable of filling in either mono or
/// interleaved stereo pcm buffers, at the caller's request.
#[derive(Clone, Debug)]
pub struct DecoderConfiguration {
    /// Sample rate to decode at (Hz). Default: 48000 kHz.
    pub sampling_rate: SamplingRate,
    /// Number of channels to decode. Default: Stereo.
    pub channels: Channels,
    /// Scales the decoded output by a factor specified in Q8 dB units. Default: 0.
    pub gain: i16,
}

impl Default for DecoderConfiguration {
    fn default() -> Self {
        Self {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Stereo,
            gain: 0,
        }
    }
}

/// Opus decoder.
///
/// Opus is a stateful codec with overlapping blocks and as a result Opus
/// packets are not coded independently of each other. Packets must be
/// passed into the decoder serially and in the correct order for a correct
/// decode. Lost packets can be replaced with loss concealment by calling
/// the decoder with `None` for the missing packet.
#[derive(Clone, Debug)]
pub struct Decoder {
    celt_dec: CeltDecoder,
    silk_dec: SilkDecoder,
    channels: Channels,
    sampling_rate: SamplingRate,
    decode_gain: i16,

    stream_channels: Channels,
    bandwidth: Bandwidth,
    mode: Option<CodecMode>,
    prev_mode: Option<CodecMode>,
    frame_size: usize,
    prev_redundancy: Option<usize>,
    last_packet_duration: Option<u32>,

    final_range: u32,
}

impl Decoder {
    /// Creates a new `Decoder` with the given configuration.
    pub fn new(configuration: &DecoderConfiguration) -> Result<Self, DecoderError> {
        let celt_dec = CeltDecoder::new(configuration.sampling_rate, configuration.channels)?;
        let silk_dec = SilkDecoder::new(configuration.sampling_rate, configuration.channels)?;

        Ok(Self {
            celt_dec,
            silk_dec,
            sampling_rate: configuration.sampling_rate,
            channels: configuration.channels,
            decode_gain: configuration.gain,
            stream_channels: configuration.channels,
            bandwidth: Bandwidth::Auto,
            mode: None,
            prev_mode: None,
            frame_size: configuration.sampling_rate as usize / 400,
            prev_redundancy: None,
            last_packet_duration: None,

            final_range: 0,
        })
    }

    /// Resets the Decoder to be equivalent to a freshly initialized decoder.
    ///
    /// This should be called when switching streams in order to prevent
    /// the back to back decoding from giving different results from
    /// one at a time decoding.
    pub fn reset(&mut self) -> Result<(), DecoderError> {
        self.silk_dec.reset()?;
        self.celt_dec.reset()?;

        self.stream_channels = self.channels;
        self.bandwidth = Bandwidth::Auto;
        self.mode = None;
        self.prev_mode = None;
        self.frame_size = self.sampling_rate as usize / 400;
        self.prev_redundancy = None;
        self.last_packet_duration = None;

        Ok(())
    }

    /// Returns the sampling rate the decoder was initialized with.
    pub fn sampling_rate(&self) -> SamplingRate {
        self.sampling_rate
    }

    /// Returns the channels the decoder was initialized with.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Returns the amount to scale PCM signal by in Q8 dB units.
    pub fn gain(&self) -> i16 {
        self.decode_gain
    }

    /// Returns the decoder's last bandpass.
    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    /// Returns the pitch of the last decoded frame, measured in samples at 48 kHz
    pub fn pitch(&self) -> Option<u32> {
        if let Some(prev_mode) = self.prev_mode {
            match prev_mode {
                CodecMode::Celt => Some(self.celt_dec.pitch()),
                CodecMode::Silk | CodecMode::Hybrid => Some(self.silk_dec.pitch()),
            }
        } else {
            None
        }
    }

    /// Returns the duration (in samples) of the last packet successfully decoded or concealed.
    pub fn last_packet_duration(&self) -> Option<u32> {
        self.last_packet_duration
    }

    /// Returns the final state of the codec's entropy coder.
    ///
    /// This is used for testing purposes, the encoder and decoder state
    /// should be identical after coding a payload assuming no data
    /// corruption or software bugs).
    pub fn final_range(&mut self) -> u32 {
        self.final_range
    }

    /// Decode an Opus packet with a generic sample output.
    ///
    /// Returns number of decoded samples.
    ///
    /// Caller needs to make sure that the samples buffer has enough space to fit
    /// all samples inside the packet. Call `query_packet_sample_count()` to query
    /// the number of samples inside a packet and resize the buffer if needed.
    ///
    /// The internal format is `f32`. Use `decode_float()` to access it directly.
    ///
    /// # Arguments
    /// * `packet`     - Input payload. Use a `None` to indicate packet loss.
    /// * `samples`    - Output signal encoded as PCM samples (interleaved if 2 channels).
    ///                  Length must be at least `frame_size` * `channels`.
    /// * `frame_size` - Number of samples per channel of available space in a PCM.
    ///                  `frame_size` must be a multiple of 2.5 ms (400 for 48kHz).
    ///                  In the case of PLC (packet==`None`) or FEC (decode_fec=`true`), then
    ///                  `frame_size` needs to be exactly the duration of audio that is missing,
    ///                  otherwise the decoder will not be in the optimal state to decode
    ///                  the next incoming packet.
    /// * `decode_fec` - Request that any in-band forward error correction data be decoded.
    ///                  If no such data is available, the frame is decoded as if it were lost.
    ///
    pub fn decode<S: Sample>(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [S],
        frame_size: usize,
        decode_fec: bool,
    ) -> Result<u32, DecoderError> {
        let channels = self.channels as usize;
        let mut float_buf = vec![0.0f32; frame_size * channels];
        let (decoded, _) = self.decode_native(packet, &mut float_buf, frame_size, decode_fec, 0, false);

        for (dst, &src) in samples.iter_mut().zip(float_buf.iter()) {
            *dst = S::from_f32(src);
        }

        Ok(decoded)
    }

    /// Decode an Opus packet with floating point output.
    ///
    /// Returns number of decoded samples.
    ///
    /// Caller needs to make sure that the samples buffer has enough space to fit
    /// all samples inside the packet. Call `query_packet_sample_count()` to query
    /// the number of samples inside a packet and resize the buffer if needed.
    ///
    /// # Arguments
    /// * `packet`     - Input payload. Use a `None` to indicate packet loss.
    /// * `samples`    - Output signal encoded as PCM samples (interleaved if 2 channels).
    ///                  Length is frame_size * channels.
    /// * `frame_size` - Number of samples per channel of available space in a PCM.
    ///                  `frame_size` must be a multiple of 2.5 ms (400 for 48kHz).
    ///                  In the case of PLC (packet==`None`) or FEC (decode_fec=`true`), then
    ///                  `frame_size` needs to be exactly the duration of audio that is missing,
    ///                  otherwise the decoder will not be in the optimal state to decode
    ///                  the next incoming packet.
    /// * `decode_fec` - Request that any in-band forward error correction data be decoded.
    ///                  If no such data is available, the frame is decoded as if it were lost.
    ///
    pub fn decode_float(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [f32],
        frame_size: usize,
        decode_fec: bool,
    ) -> Result<u32, DecoderError> {
        let (decoded, _) = self.decode_native(packet, samples, frame_size, decode_fec, 0, true);
        Ok(decoded)
    }

    /// Returns the samples decoded and the packet_offset (used for multiple streams).
    ///
    /// `decode_fec` (in-band forward error correction) is accepted but not
    /// acted on: FEC data lives inside SILK's LBRR frames, and SILK decoding
    /// isn't implemented (see `silk::SilkDecoder`). Requesting it simply
    /// decodes the packet normally.
    fn decode_native(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [f32],
        frame_size: usize,
        _decode_fec: bool,
        self_delimited: usize,
        soft_clip: bool,
    ) -> (u32, usize) {
        let channels = self.channels as usize;

        let Some(packet) = packet else {
            let pcm = self.celt_dec.decode_frame(&[], frame_size).unwrap_or_else(|_| vec![0.0; frame_size * channels]);
            let n = pcm.len().min(samples.len());
            samples[..n].copy_from_slice(&pcm[..n]);
            self.final_range = self.celt_dec.final_range();
            self.last_packet_duration = Some(frame_size as u32);
            return (frame_size as u32, 0);
        };

        if packet.is_empty() {
            return (0, 0);
        }

        let mode = query_packet_codec_mode(packet);
        let stream_channels = query_packet_channel_count(packet);
        let samples_per_frame = query_packet_samples_per_frame(packet, self.sampling_rate);

        let mut frame_offsets = [0usize; 48];
        let mut frame_sizes = [0usize; 48];
        let mut payload_offset = 0usize;
        let mut packet_offset = 0usize;
        let count = match crate::parse_packet(
            packet,
            self_delimited != 0,
            Some(&mut frame_offsets),
            &mut frame_sizes,
            Some(&mut payload_offset),
            Some(&mut packet_offset),
        ) {
            Ok(count) => count,
            Err(_) => return (0, 0),
        };

        self.bandwidth = query_packet_bandwidth(packet);
        self.stream_channels = stream_channels;
        self.mode = Some(mode);

        let mut total = 0usize;
        for i in 0..count {
            let start = frame_offsets[i];
            let size = frame_sizes[i];
            let frame = &packet[start..start + size];

            let pcm = match mode {
                CodecMode::Celt => self
                    .celt_dec
                    .decode_frame(frame, samples_per_frame)
                    .unwrap_or_else(|_| vec![0.0; samples_per_frame * channels]),
                CodecMode::Silk | CodecMode::Hybrid => {
                    log::warn!("SILK/Hybrid packet received, but SILK decoding isn't implemented; substituting silence");
                    vec![0.0; samples_per_frame * channels]
                }
            };

            let dst_start = total * channels;
            let n = pcm.len().min(samples.len().saturating_sub(dst_start));
            samples[dst_start..dst_start + n].copy_from_slice(&pcm[..n]);
            total += samples_per_frame;
        }

        let decoded_len = (total * channels).min(samples.len());
        if self.decode_gain != 0 {
            let scale = gain_to_linear(self.decode_gain);
            for s in samples[..decoded_len].iter_mut() {
                *s *= scale;
            }
        }

        if soft_clip {
            let mut softclip_mem = vec![0.0f32; channels];
            pcm_soft_clip(&mut samples[..decoded_len], channels, &mut softclip_mem);
        }

        self.prev_mode = Some(mode);
        self.frame_size = samples_per_frame;
        self.final_range = self.celt_dec.final_range();
        self.last_packet_duration = Some(total as u32);

        (total as u32, packet_offset)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{Encoder, EncoderConfiguration};
    use nanorand::{Rng, WyRand};

    #[test]
    fn test_decode_none_packet_is_silence() {
        let mut dec = Decoder::new(&DecoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Mono,
            gain: 0,
        })
        .unwrap();
        let mut samples = vec![1.0f32; 120];
        let decoded = dec.decode_float(None, &mut samples, 120, false).unwrap();
        assert_eq!(decoded, 120);
        assert_eq!(samples, vec![0.0f32; 120]);
    }

    #[test]
    fn test_encode_then_decode_mono_roundtrip() {
        let mut rng = WyRand::new_seed(3);
        let n = 120;
        let pcm: Vec<f32> = (0..n).map(|_| rng.generate::<u16>() as f32 / 65535.0 - 0.5).collect();

        let mut enc = Encoder::new(&EncoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Mono,
            ..EncoderConfiguration::default()
        })
        .unwrap();
        let mut packet = vec![0u8; 256];
        let written = enc.encode_float(&pcm, n, &mut packet).unwrap();

        let mut dec = Decoder::new(&DecoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Mono,
            gain: 0,
        })
        .unwrap();
        let mut out = vec![0.0f32; n];
        let decoded = dec.decode_float(Some(&packet[..written]), &mut out, n, false).unwrap();
        assert_eq!(decoded as usize, n);
        for &s in &out {
            assert!(s.is_finite());
        }
    }

    #[test]
    fn test_gain_scales_output() {
        let mut dec = Decoder::new(&DecoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Mono,
            gain: 256, // +1 dB in Q8 units
        })
        .unwrap();
        assert_eq!(dec.gain(), 256);
    }
}
