//! RFC 6455 style message framing.
//!
//! Every frame is laid out as:
//! - a control byte: FIN, three reserved bits, 4-bit opcode
//! - a length indicator: literal (0-125), or a 16/64-bit big-endian extension
//! - an optional 4-byte mask key, XORed over the payload
//!
//! The encoder never emits a partial frame: a frame is validated before the
//! first byte is written.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod mask;
pub mod opcode;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::WebSocketCodec;
pub use codec::{
    decode_frame, encode_frame, extended_length_size, Frame, FrameConfig, FrameEncoder,
    FrameHeader, FrameKind, DEFAULT_MAX_PAYLOAD, MAX_CONTROL_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use mask::apply_mask;
pub use opcode::{opcode_name, BINARY, CLOSE, CONTINUATION, PING, PONG, TEXT};
pub use reader::FrameReader;
pub use writer::FrameWriter;

