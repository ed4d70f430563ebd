use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, Frame, FrameConfig, FrameEncoder};
use crate::error::{FrameError, Result};

/// `tokio_util` codec over the same wire format as the blocking-free
/// reader and writer.
#[derive(Debug)]
pub struct WebSocketCodec {
    encoder: FrameEncoder,
    max_payload_size: usize,
}

impl WebSocketCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            encoder: FrameEncoder::new(config.mask_payload),
            max_payload_size: config.max_payload_size,
        }
    }

    /// Codec that masks outbound frames.
    pub fn client() -> Self {
        Self::new(FrameConfig {
            mask_payload: true,
            ..FrameConfig::default()
        })
    }

    /// Codec that sends frames unmasked.
    pub fn server() -> Self {
        Self::new(FrameConfig::default())
    }
}

impl Default for WebSocketCodec {
    fn default() -> Self {
        Self::server()
    }
}

impl Decoder for WebSocketCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        decode_frame(src, self.max_payload_size)
    }
}

impl Encoder<Frame> for WebSocketCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload.len(),
                max: self.max_payload_size,
            });
        }
        self.encoder.encode(&item, dst)
    }
}
