/// Errors surfaced by a connection, its transport, or its engine.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framewire_transport::TransportError),

    /// Frame-level error (codec or the stream beneath it).
    #[error("frame error: {0}")]
    Frame(#[from] framewire_frame::FrameError),

    /// Raw I/O error from a transport that has no richer error type.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The decode primitive could not make sense of the inbound data.
    #[error("decode fault: {0}")]
    Decode(Box<dyn std::error::Error + Send + Sync>),

    /// The channel is closed.
    #[error("channel closed")]
    Closed,

    /// The connection is already bound to an event loop.
    #[error("channel already registered with an event loop")]
    AlreadyRegistered,

    /// The connection has no event loop yet.
    #[error("channel not registered with an event loop")]
    NotRegistered,

    /// The event loop was torn down and accepts no more tasks.
    #[error("event loop shut down")]
    EventLoopShutdown,

    /// Channel configuration failed validation.
    #[error("invalid channel config: {0}")]
    InvalidConfig(String),

    /// Channel configuration could not be parsed.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChannelError {
    /// Wrap an arbitrary decoder error as a recoverable decode fault.
    pub fn decode(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Decode(err.into())
    }

    /// True for transport faults, which force the connection closed.
    ///
    /// Everything else raised while reading is a recoverable decode fault.
    pub fn is_io(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Io(_) => true,
            Self::Frame(err) => err.is_io(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use framewire_frame::FrameError;

    use super::*;

    #[test]
    fn classification() {
        let io = ChannelError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(io.is_io());

        let frame_io = ChannelError::from(FrameError::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));
        assert!(frame_io.is_io());

        let codec = ChannelError::from(FrameError::UnsupportedFrameCategory(0x3));
        assert!(!codec.is_io());

        assert!(!ChannelError::decode("garbage").is_io());
        assert!(!ChannelError::Closed.is_io());
    }

    #[test]
    fn display_includes_cause() {
        let err = ChannelError::from(FrameError::OversizedControlFrame { len: 126 });
        assert_eq!(
            err.to_string(),
            "frame error: invalid payload for PING (payload length must be <= 125, was 126)"
        );
    }
}
