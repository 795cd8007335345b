//! Decoder errors.

/// Errors thrown by the decoder.
#[derive(Debug)]
pub enum DecoderError {
    /// An internal decoder error.
    InternalError(&'static str),
    /// The bitstream violated a structural invariant (out-of-range index,
    /// impossible band allocation, ...) that the range coder itself doesn't
    /// catch.
    CorruptStream(&'static str),
    /// The requested frame size does not match any size this decoder's mode
    /// supports.
    InvalidFrameSize,
    /// The packet's framing (TOC byte, frame count byte, padding) is
    /// malformed, independent of anything CELT/SILK-specific.
    InvalidPacket,
}

impl std::fmt::Display for DecoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoderError::InternalError(message) => {
                write!(f, "{}", message)
            }
            DecoderError::CorruptStream(message) => {
                write!(f, "corrupt stream: {}", message)
            }
            DecoderError::InvalidFrameSize => {
                write!(f, "invalid frame size")
            }
            DecoderError::InvalidPacket => {
                write!(f, "invalid packet")
            }
        }
    }
}

impl std::error::Error for DecoderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
