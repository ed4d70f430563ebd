use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::debug;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reads complete frames from a non-blocking `Read` stream.
///
/// Each call yields at most one frame. Bytes beyond that frame stay buffered
/// for the next call, so the caller decides how many frames to take per
/// readiness event.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    eof: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            eof: false,
        }
    }

    /// Return the next frame if one can be assembled without blocking.
    ///
    /// - `Ok(Some(frame))`: a complete frame.
    /// - `Ok(None)`: the stream has no more bytes right now.
    /// - `Err(FrameError::ConnectionClosed)`: end of stream.
    ///
    /// On a decode error the buffered bytes are discarded, so the next call
    /// starts at whatever the peer sends next.
    pub fn try_read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match decode_frame(&mut self.buf, self.config.max_payload_size) {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => {}
                Err(err) => {
                    debug!(
                        discarded = self.buf.len(),
                        error = %err,
                        "discarding undecodable bytes"
                    );
                    self.buf.clear();
                    return Err(err);
                }
            }

            if self.eof {
                return Err(FrameError::ConnectionClosed);
            }

            let start = self.buf.len();
            self.buf.resize(start + self.config.read_chunk_size.max(1), 0);
            let result = self.inner.read(&mut self.buf[start..]);
            let read = match result {
                Ok(n) => n,
                Err(err) => {
                    self.buf.truncate(start);
                    match err.kind() {
                        ErrorKind::Interrupted => continue,
                        ErrorKind::WouldBlock => return Ok(None),
                        _ => return Err(FrameError::Io(err)),
                    }
                }
            };
            self.buf.truncate(start + read);

            if read == 0 {
                if start > 0 {
                    debug!(buffered = start, "stream ended mid-frame");
                }
                self.eof = true;
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Bytes received but not yet returned as frames.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use bytes::BufMut;

    use super::*;
    use crate::codec::{encode_frame, FrameKind};

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, None, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    /// Hands out scripted chunks, reporting `WouldBlock` for `None` entries.
    struct Scripted {
        chunks: VecDeque<Option<Vec<u8>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Some(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(Some(chunk[n..].to_vec()));
                    }
                    Ok(n)
                }
                Some(None) => Err(std::io::Error::from(ErrorKind::WouldBlock)),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn one_frame_per_call() {
        let bytes = wire(&[Frame::text("one"), Frame::text("two"), Frame::text("three")]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert_eq!(reader.try_read_frame().unwrap(), Some(Frame::text("one")));
        assert!(reader.buffered_len() > 0);
        assert_eq!(reader.try_read_frame().unwrap(), Some(Frame::text("two")));
        assert_eq!(reader.try_read_frame().unwrap(), Some(Frame::text("three")));
        assert!(matches!(
            reader.try_read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn would_block_returns_none_then_resumes() {
        let bytes = wire(&[Frame::binary("split")]);
        let (head, tail) = bytes.split_at(3);
        let mut reader = FrameReader::new(Scripted {
            chunks: VecDeque::from(vec![Some(head.to_vec()), None, Some(tail.to_vec()), None]),
        });

        assert_eq!(reader.try_read_frame().unwrap(), None);
        assert_eq!(reader.buffered_len(), 3);
        assert_eq!(reader.try_read_frame().unwrap(), Some(Frame::binary("split")));
        assert_eq!(reader.try_read_frame().unwrap(), None);
    }

    #[test]
    fn eof_mid_frame_is_connection_closed() {
        let mut bytes = wire(&[Frame::text("truncated")]);
        bytes.truncate(5);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert!(matches!(
            reader.try_read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
        // stays closed without touching the stream again
        assert!(matches!(
            reader.try_read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn decode_error_discards_buffer_and_recovers() {
        let mut bad = BytesMut::new();
        bad.put_u8(0x84); // reserved opcode
        bad.put_u8(0x01);
        bad.put_u8(b'x');
        let good = wire(&[Frame::pong("ok")]);

        let mut reader = FrameReader::new(Scripted {
            chunks: VecDeque::from(vec![Some(bad.to_vec()), Some(good)]),
        });

        assert!(matches!(
            reader.try_read_frame(),
            Err(FrameError::UnsupportedFrameCategory(0x4))
        ));
        assert_eq!(reader.buffered_len(), 0);
        let frame = reader.try_read_frame().unwrap().unwrap();
        assert_eq!(frame.kind, FrameKind::Pong);
    }

    #[test]
    fn small_chunks_assemble_large_frame() {
        let payload = vec![0xAB; 70_000];
        let bytes = wire(&[Frame::binary(payload.clone())]);
        let cfg = FrameConfig {
            read_chunk_size: 512,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);

        let frame = reader.try_read_frame().unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn oversized_frame_rejected() {
        let bytes = wire(&[Frame::binary(vec![0u8; 1024])]);
        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);
        assert!(matches!(
            reader.try_read_frame(),
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }

    #[test]
    fn interrupted_read_retries() {
        struct InterruptedOnce {
            interrupted: bool,
            data: Cursor<Vec<u8>>,
        }

        impl Read for InterruptedOnce {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(std::io::Error::from(ErrorKind::Interrupted));
                }
                self.data.read(buf)
            }
        }

        let mut reader = FrameReader::new(InterruptedOnce {
            interrupted: false,
            data: Cursor::new(wire(&[Frame::text("ok")])),
        });
        assert_eq!(reader.try_read_frame().unwrap(), Some(Frame::text("ok")));
    }

    #[test]
    fn other_io_errors_propagate() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::ConnectionReset))
            }
        }

        let mut reader = FrameReader::new(Broken);
        let err = reader.try_read_frame().unwrap_err();
        assert!(err.is_io());
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::ConnectionReset));
    }

    #[test]
    #[cfg(unix)]
    fn reads_from_nonblocking_socket_pair() {
        use std::io::Write;

        let (mut left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        right.set_nonblocking(true).unwrap();
        let mut reader = FrameReader::new(right);

        assert_eq!(reader.try_read_frame().unwrap(), None);
        left.write_all(&wire(&[Frame::text("ping")])).unwrap();
        assert_eq!(reader.try_read_frame().unwrap(), Some(Frame::text("ping")));
    }
}
