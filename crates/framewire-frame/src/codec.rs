use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::mask::apply_mask;
use crate::opcode;

/// Largest payload a PING frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

const LEN_EXT16: u8 = 126;
const LEN_EXT64: u8 = 127;
const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;

/// The six assigned frame categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl FrameKind {
    /// Every frame kind, in opcode order.
    pub const ALL: [FrameKind; 6] = [
        FrameKind::Continuation,
        FrameKind::Text,
        FrameKind::Binary,
        FrameKind::Close,
        FrameKind::Ping,
        FrameKind::Pong,
    ];

    /// The 4-bit opcode for this kind.
    pub const fn opcode(self) -> u8 {
        match self {
            FrameKind::Continuation => opcode::CONTINUATION,
            FrameKind::Text => opcode::TEXT,
            FrameKind::Binary => opcode::BINARY,
            FrameKind::Close => opcode::CLOSE,
            FrameKind::Ping => opcode::PING,
            FrameKind::Pong => opcode::PONG,
        }
    }

    /// Map a raw opcode to its kind.
    pub fn from_opcode(value: u8) -> Result<Self> {
        match value {
            opcode::CONTINUATION => Ok(FrameKind::Continuation),
            opcode::TEXT => Ok(FrameKind::Text),
            opcode::BINARY => Ok(FrameKind::Binary),
            opcode::CLOSE => Ok(FrameKind::Close),
            opcode::PING => Ok(FrameKind::Ping),
            opcode::PONG => Ok(FrameKind::Pong),
            other => Err(FrameError::UnsupportedFrameCategory(other)),
        }
    }

    /// Upper-case name, as used in logs and CLI output.
    pub fn name(self) -> &'static str {
        opcode::opcode_name(self.opcode())
    }
}

impl std::str::FromStr for FrameKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continuation" | "cont" => Ok(FrameKind::Continuation),
            "text" => Ok(FrameKind::Text),
            "binary" => Ok(FrameKind::Binary),
            "close" => Ok(FrameKind::Close),
            "ping" => Ok(FrameKind::Ping),
            "pong" => Ok(FrameKind::Pong),
            other => Err(format!("unknown frame kind: {other}")),
        }
    }
}

/// One logical protocol message unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame category.
    pub kind: FrameKind,
    /// Final fragment of the message.
    pub fin: bool,
    /// RSV1-3, only the low three bits are transmitted.
    pub rsv: u8,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a final, unextended frame.
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            fin: true,
            rsv: 0,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Text, payload)
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Binary, payload)
    }

    pub fn continuation(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Continuation, payload)
    }

    pub fn close(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Close, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Pong, payload)
    }

    /// Build a frame from a raw opcode, e.g. one read off the wire.
    pub fn from_raw(opcode: u8, fin: bool, rsv: u8, payload: impl Into<Bytes>) -> Result<Self> {
        Ok(Self {
            kind: FrameKind::from_opcode(opcode)?,
            fin,
            rsv,
            payload: payload.into(),
        })
    }

    /// Set the FIN flag.
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Set the reserved bits.
    pub fn with_rsv(mut self, rsv: u8) -> Self {
        self.rsv = rsv;
        self
    }

    /// The first header byte: FIN | RSV | OPCODE.
    pub fn control_byte(&self) -> u8 {
        let fin = if self.fin { FIN_BIT } else { 0 };
        fin | ((self.rsv % 8) << 4) | (self.kind.opcode() % 128)
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self, masked: bool) -> usize {
        let mask_len = if masked { 4 } else { 0 };
        2 + extended_length_size(self.payload.len()) + mask_len + self.payload.len()
    }

    /// Reject frames that may not be put on the wire.
    pub fn check_encodable(&self) -> Result<()> {
        if self.kind == FrameKind::Ping && self.payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(FrameError::OversizedControlFrame {
                len: self.payload.len(),
            });
        }
        Ok(())
    }
}

/// Number of extended-length bytes that follow the length indicator.
pub fn extended_length_size(len: usize) -> usize {
    if len <= MAX_CONTROL_PAYLOAD {
        0
    } else if len <= 0xFFFF {
        2
    } else {
        8
    }
}

/// Parsed frame header, as it appeared on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv: u8,
    pub opcode: u8,
    pub mask_key: Option<[u8; 4]>,
    pub payload_len: u64,
    /// Bytes occupied by the header, including extended length and mask key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a header from the front of `src`.
    ///
    /// Returns `None` if `src` does not yet hold the complete header.
    pub fn parse(src: &[u8]) -> Option<Self> {
        if src.len() < 2 {
            return None;
        }
        let b0 = src[0];
        let b1 = src[1];

        let (payload_len, mut offset) = match b1 & 0x7F {
            LEN_EXT16 => {
                let raw: [u8; 2] = src.get(2..4)?.try_into().ok()?;
                (u64::from(u16::from_be_bytes(raw)), 4)
            }
            LEN_EXT64 => {
                let raw: [u8; 8] = src.get(2..10)?.try_into().ok()?;
                (u64::from_be_bytes(raw), 10)
            }
            literal => (u64::from(literal), 2),
        };

        let mask_key = if b1 & MASK_BIT != 0 {
            let key: [u8; 4] = src.get(offset..offset + 4)?.try_into().ok()?;
            offset += 4;
            Some(key)
        } else {
            None
        };

        Some(Self {
            fin: b0 & FIN_BIT != 0,
            rsv: (b0 >> 4) & 0x07,
            opcode: b0 & 0x0F,
            mask_key,
            payload_len,
            header_len: offset,
        })
    }

    pub fn is_masked(&self) -> bool {
        self.mask_key.is_some()
    }
}

/// Encode a frame into the wire format, masking with `mask_key` if given.
///
/// Wire format:
/// ```text
/// byte0: bit7=FIN, bits6-4=RSV, bits3-0=OPCODE
/// byte1: bit7=MASK, bits6-0=LEN7 (0-125 literal | 126=ext16 | 127=ext64)
/// [2 or 8 bytes big-endian extended length]
/// [4 bytes mask key]
/// payload, XORed with the mask key when present
/// ```
///
/// Validation happens before anything is written, so `dst` is untouched on
/// error.
pub fn encode_frame(frame: &Frame, mask_key: Option<[u8; 4]>, dst: &mut BytesMut) -> Result<()> {
    frame.check_encodable()?;

    let len = frame.payload.len();
    let mask_bit = if mask_key.is_some() { MASK_BIT } else { 0 };
    debug!(
        opcode = frame.kind.opcode(),
        length = len,
        masked = mask_key.is_some(),
        "encoding frame"
    );

    dst.reserve(frame.wire_size(mask_key.is_some()));
    dst.put_u8(frame.control_byte());
    match extended_length_size(len) {
        0 => dst.put_u8(mask_bit | len as u8),
        2 => {
            dst.put_u8(mask_bit | LEN_EXT16);
            dst.put_u16(len as u16);
        }
        _ => {
            dst.put_u8(mask_bit | LEN_EXT64);
            dst.put_u64(len as u64);
        }
    }

    match mask_key {
        Some(key) => {
            dst.put_slice(&key);
            let start = dst.len();
            dst.put_slice(&frame.payload);
            apply_mask(&mut dst[start..], key);
        }
        None => dst.put_slice(&frame.payload),
    }
    Ok(())
}

/// Decode a frame from a buffer, unmasking the payload if needed.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(header) = FrameHeader::parse(src) else {
        return Ok(None);
    };

    let kind = FrameKind::from_opcode(header.opcode)?;
    let payload_len = usize::try_from(header.payload_len).unwrap_or(usize::MAX);
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    if kind == FrameKind::Ping && payload_len > MAX_CONTROL_PAYLOAD {
        return Err(FrameError::OversizedControlFrame { len: payload_len });
    }

    let total = header.header_len.saturating_add(payload_len);
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(header.header_len);
    let mut payload = src.split_to(payload_len);
    if let Some(key) = header.mask_key {
        apply_mask(&mut payload, key);
    }

    Ok(Some(Frame {
        kind,
        fin: header.fin,
        rsv: header.rsv,
        payload: payload.freeze(),
    }))
}

/// Stateful encoder that draws a fresh mask key per frame.
///
/// The random source is owned by the encoder, so an encoder never needs to be
/// shared between threads: one per connection.
pub struct FrameEncoder {
    mask_payload: bool,
    rng: SmallRng,
}

impl FrameEncoder {
    /// `mask_payload` must be true for clients and false for servers.
    pub fn new(mask_payload: bool) -> Self {
        Self::with_rng(mask_payload, SmallRng::from_entropy())
    }

    /// Encoder with an explicit random source (deterministic in tests).
    pub fn with_rng(mask_payload: bool, rng: SmallRng) -> Self {
        Self { mask_payload, rng }
    }

    pub fn client() -> Self {
        Self::new(true)
    }

    pub fn server() -> Self {
        Self::new(false)
    }

    pub fn masks_payload(&self) -> bool {
        self.mask_payload
    }

    /// Encode one frame into `dst`.
    ///
    /// Fails without writing anything when the frame cannot be encoded.
    pub fn encode(&mut self, frame: &Frame, dst: &mut BytesMut) -> Result<()> {
        // validate first so a rejected frame does not consume a mask key
        frame.check_encodable()?;
        let mask_key = if self.mask_payload {
            Some(self.next_mask_key())
        } else {
            None
        };
        encode_frame(frame, mask_key, dst)
    }

    fn next_mask_key(&mut self) -> [u8; 4] {
        self.rng.next_u32().to_be_bytes()
    }
}

impl std::fmt::Debug for FrameEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameEncoder")
            .field("mask_payload", &self.mask_payload)
            .finish_non_exhaustive()
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum accepted payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Mask outbound payloads (client role). Default: false.
    pub mask_payload: bool,
    /// Bytes requested from the stream per read. Default: 8 KiB.
    pub read_chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            mask_payload: false,
            read_chunk_size: 8 * 1024,
        }
    }
}
