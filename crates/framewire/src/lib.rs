//! RFC 6455 style framing and readiness-driven message connections.
//!
//! # Crate Structure
//!
//! - [`transport`]: non-blocking byte streams (Unix domain sockets, TCP)
//! - [`frame`]: frame codec, masking, non-blocking frame reader/writer
//! - [`channel`]: read/write engine, connections, loop-back harness
//!   (behind `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use framewire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framewire_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use framewire_channel::*;
}
