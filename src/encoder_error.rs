//! Encoder errors.

/// Errors thrown by the encoder.
#[derive(Debug)]
pub enum EncoderError {
    /// The output buffer is too small.
    BufferToSmall,
    /// An internal encoder error.
    InternalError(&'static str),
    /// The requested frame size is not one of the durations Opus supports.
    InvalidFrameSize,
    /// The requested bitrate is out of range for the current sampling rate
    /// and channel count.
    InvalidBitrate,
    /// The channel count requested does not match what this encoder was
    /// constructed for.
    UnsupportedChannelCount,
}

impl std::fmt::Display for EncoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderError::BufferToSmall => {
                write!(f, "output buffer is too small")
            }
            EncoderError::InternalError(message) => {
                write!(f, "{}", message)
            }
            EncoderError::InvalidFrameSize => {
                write!(f, "invalid frame size")
            }
            EncoderError::InvalidBitrate => {
                write!(f, "invalid bitrate")
            }
            EncoderError::UnsupportedChannelCount => {
                write!(f, "unsupported channel count")
            }
        }
    }
}

impl std::error::Error for EncoderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
