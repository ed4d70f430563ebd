//! Readiness-driven connections for message-oriented transports.
//!
//! A [`Connection`] owns a [`MessageTransport`], a [`Pipeline`], and a
//! [`MessageEngine`]. On each readiness signal the engine drains the
//! transport into a bounded batch and delivers it to the pipeline in
//! order. On flush it retries the transport a bounded number of times and
//! yields with [`FlushOutcome::Stalled`] rather than blocking.
//!
//! A connection and its [`EventLoop`] are confined to the thread that
//! registered it, so nothing here takes a lock.

pub mod config;
pub mod connection;
pub mod embedded;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod framed;
pub mod pipeline;
pub mod state;
pub mod transport;

pub use config::ChannelConfig;
pub use connection::{Connection, FlushOutcome};
pub use embedded::{EmbeddedConnection, LoopbackConnection, LoopbackTransport};
pub use engine::{MessageEngine, ReadSummary, StopReason};
pub use error::{ChannelError, Result};
pub use event_loop::{EventLoop, Task};
pub use framed::FramedTransport;
pub use pipeline::{Pipeline, RecordingPipeline};
pub use state::{ChannelCore, ChannelHandle, ChannelState};
pub use transport::{MessageTransport, ReadOutcome};
