use std::io::{ErrorKind, Write};

use bytes::{Buf, BytesMut};

use crate::codec::{Frame, FrameConfig, FrameEncoder};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes frames to a non-blocking `Write` stream.
///
/// Frames are encoded into a pending buffer with [`queue`](Self::queue) and
/// pushed out with [`flush_pending`](Self::flush_pending), which stops as
/// soon as the stream would block and keeps the remainder for the next call.
pub struct FrameWriter<T> {
    inner: T,
    pending: BytesMut,
    encoder: FrameEncoder,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        let encoder = FrameEncoder::new(config.mask_payload);
        Self::with_encoder(inner, config, encoder)
    }

    /// Create a frame writer around an existing encoder.
    pub fn with_encoder(inner: T, config: FrameConfig, encoder: FrameEncoder) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            encoder,
            config,
        }
    }

    /// Encode a frame onto the end of the pending buffer.
    ///
    /// On error nothing is appended; frames queued earlier are unaffected.
    pub fn queue(&mut self, frame: &Frame) -> Result<()> {
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.config.max_payload_size,
            });
        }
        self.encoder.encode(frame, &mut self.pending)
    }

    /// Write as much of the pending buffer as the stream accepts.
    ///
    /// Returns `Ok(true)` once the buffer is empty and `Ok(false)` if the
    /// stream would block first.
    pub fn flush_pending(&mut self) -> Result<bool> {
        while !self.pending.is_empty() {
            match self.inner.write(&self.pending) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => self.pending.advance(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(true),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Encoded bytes not yet accepted by the stream.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Drop everything still pending (e.g. after the connection closed).
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{decode_frame, FrameHeader};

    /// Accepts `budget` bytes, then reports `WouldBlock` until refilled.
    struct Throttled {
        budget: usize,
        data: Vec<u8>,
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.budget == 0 {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn queue_and_flush_roundtrip() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.queue(&Frame::text("one")).unwrap();
        writer.queue(&Frame::binary("two")).unwrap();
        assert!(writer.flush_pending().unwrap());
        assert_eq!(writer.pending_bytes(), 0);

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        assert_eq!(
            decode_frame(&mut wire, usize::MAX).unwrap(),
            Some(Frame::text("one"))
        );
        assert_eq!(
            decode_frame(&mut wire, usize::MAX).unwrap(),
            Some(Frame::binary("two"))
        );
    }

    #[test]
    fn partial_write_keeps_remainder() {
        let mut writer = FrameWriter::new(Throttled {
            budget: 4,
            data: Vec::new(),
        });
        writer.queue(&Frame::text("hello")).unwrap();

        assert!(!writer.flush_pending().unwrap());
        assert_eq!(writer.pending_bytes(), 3);

        writer.get_mut().budget = 64;
        assert!(writer.flush_pending().unwrap());
        let mut wire = BytesMut::from(writer.get_ref().data.as_slice());
        assert_eq!(
            decode_frame(&mut wire, usize::MAX).unwrap(),
            Some(Frame::text("hello"))
        );
    }

    #[test]
    fn client_config_masks_output() {
        let cfg = FrameConfig {
            mask_payload: true,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        writer.queue(&Frame::text("masked")).unwrap();
        writer.flush_pending().unwrap();

        let bytes = writer.into_inner().into_inner();
        let header = FrameHeader::parse(&bytes).unwrap();
        assert!(header.is_masked());
        let mut wire = BytesMut::from(bytes.as_slice());
        assert_eq!(
            decode_frame(&mut wire, usize::MAX).unwrap(),
            Some(Frame::text("masked"))
        );
    }

    #[test]
    fn rejected_frame_leaves_pending_untouched() {
        let cfg = FrameConfig {
            max_payload_size: 8,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        writer.queue(&Frame::text("ok")).unwrap();
        let before = writer.pending_bytes();

        let err = writer.queue(&Frame::text("far too long")).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        let err = writer.queue(&Frame::ping(vec![0u8; 200])).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert_eq!(writer.pending_bytes(), before);
    }

    #[test]
    fn oversized_ping_rejected_by_encoder() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let err = writer.queue(&Frame::ping(vec![0u8; 126])).unwrap_err();
        assert!(matches!(err, FrameError::OversizedControlFrame { len: 126 }));
        assert_eq!(writer.pending_bytes(), 0);
    }

    #[test]
    fn zero_write_is_connection_closed() {
        struct ZeroWriter;

        impl Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = FrameWriter::new(ZeroWriter);
        writer.queue(&Frame::text("x")).unwrap();
        assert!(matches!(
            writer.flush_pending(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn discard_pending_clears_buffer() {
        let mut writer = FrameWriter::new(Throttled {
            budget: 0,
            data: Vec::new(),
        });
        writer.queue(&Frame::binary("stuck")).unwrap();
        assert!(!writer.flush_pending().unwrap());
        writer.discard_pending();
        assert_eq!(writer.pending_bytes(), 0);
        assert!(writer.flush_pending().unwrap());
    }
}
