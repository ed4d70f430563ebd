use std::io::{Read, Write};

use framewire_frame::{Frame, FrameConfig, FrameError, FrameReader, FrameWriter};
use framewire_transport::WireStream;
use tracing::{debug, trace};

use crate::error::Result;
use crate::transport::{MessageTransport, ReadOutcome};

/// Frame transport over a non-blocking byte stream.
///
/// Each frame is counted as written only once all of its bytes have been
/// accepted by the stream. A frame cut short by a full socket buffer stays
/// at the front of the caller's queue and is finished on the next attempt.
pub struct FramedTransport<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    in_flight: bool,
    wants_writable: bool,
    shutdown_handle: Option<WireStream>,
}

impl<R: Read, W: Write> FramedTransport<R, W> {
    pub fn new(reader: FrameReader<R>, writer: FrameWriter<W>) -> Self {
        Self {
            reader,
            writer,
            in_flight: false,
            wants_writable: false,
            shutdown_handle: None,
        }
    }

    /// The last flush stalled and the driver should wait for writability.
    pub fn wants_writable(&self) -> bool {
        self.wants_writable
    }

    /// Bytes of a partially written frame still waiting for the stream.
    pub fn pending_bytes(&self) -> usize {
        self.writer.pending_bytes()
    }

    pub fn reader(&self) -> &FrameReader<R> {
        &self.reader
    }

    pub fn writer(&self) -> &FrameWriter<W> {
        &self.writer
    }

    pub fn reader_mut(&mut self) -> &mut FrameReader<R> {
        &mut self.reader
    }

    pub fn writer_mut(&mut self) -> &mut FrameWriter<W> {
        &mut self.writer
    }

    fn stalled(&mut self, last_spin: bool) -> usize {
        if last_spin && !self.wants_writable {
            trace!(pending = self.writer.pending_bytes(), "waiting for writability");
            self.wants_writable = true;
        }
        0
    }
}

impl FramedTransport<WireStream, WireStream> {
    /// Split a connected stream into a non-blocking frame transport.
    pub fn from_stream(stream: WireStream, config: FrameConfig) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let write_half = stream.try_clone()?;
        let shutdown_handle = stream.try_clone()?;
        let reader = FrameReader::with_config(stream, config.clone());
        let writer = FrameWriter::with_config(write_half, config);
        Ok(Self {
            shutdown_handle: Some(shutdown_handle),
            ..Self::new(reader, writer)
        })
    }
}

impl<R: Read, W: Write> MessageTransport for FramedTransport<R, W> {
    type Message = Frame;

    fn read_messages(&mut self, buf: &mut Vec<Frame>) -> Result<ReadOutcome> {
        match self.reader.try_read_frame() {
            Ok(Some(frame)) => {
                buf.push(frame);
                Ok(ReadOutcome::Messages(1))
            }
            Ok(None) => Ok(ReadOutcome::Idle),
            Err(FrameError::ConnectionClosed) => Ok(ReadOutcome::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn write_messages(&mut self, msgs: &[Frame], last_spin: bool) -> Result<usize> {
        let mut written = 0;
        if self.in_flight {
            if !self.writer.flush_pending()? {
                return Ok(self.stalled(last_spin));
            }
            self.in_flight = false;
            written = 1;
        }

        for frame in msgs.iter().skip(written) {
            if let Err(err) = self.writer.queue(frame) {
                if written == 0 {
                    return Err(err.into());
                }
                debug!(written, error = %err, "write attempt ends before unencodable frame");
                break;
            }
            if !self.writer.flush_pending()? {
                self.in_flight = true;
                break;
            }
            written += 1;
        }

        if written == 0 {
            return Ok(self.stalled(last_spin));
        }
        self.wants_writable = false;
        Ok(written)
    }

    fn close(&mut self) -> Result<()> {
        self.writer.discard_pending();
        self.in_flight = false;
        if let Some(stream) = self.shutdown_handle.take() {
            stream.shutdown()?;
        }
        Ok(())
    }
}
