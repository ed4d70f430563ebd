//! Non-blocking byte stream transports for framewire.
//!
//! Provides a unified stream/listener pair over:
//! - Unix domain sockets (Linux/macOS)
//! - TCP
//!
//! This is the lowest layer of framewire. Waiting for readiness is not done
//! here: listeners and accepted streams are non-blocking and report
//! `WouldBlock` to whoever drives them.

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::WireListener;
pub use stream::WireStream;
