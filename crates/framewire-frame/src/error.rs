/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The opcode does not name one of the six assigned frame categories.
    #[error("unsupported frame category (opcode {0:#x})")]
    UnsupportedFrameCategory(u8),

    /// A PING frame carried more than 125 payload bytes.
    #[error("invalid payload for PING (payload length must be <= 125, was {len})")]
    OversizedControlFrame { len: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached end-of-file (possibly in the middle of a frame).
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for failures of the underlying stream rather than of the bytes on it.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
