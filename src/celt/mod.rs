#[cfg(feature = "decoder")]
pub(crate) use decoder::CeltDecoder;
#[cfg(feature = "encoder")]
pub(crate) use encoder::CeltEncoder;
pub(crate) use mode::lm_for_frame_size;

#[cfg(feature = "decoder")]
mod decoder;
#[cfg(feature = "encoder")]
mod encoder;
mod bands;
mod comb_filter;
mod kiss_fft;
mod mdct;
mod mode;
mod quant_bands;
mod rate;
mod vq;
