//! In-memory connection for exercising pipelines without a socket.

use std::collections::VecDeque;

use tracing::warn;

use crate::config::ChannelConfig;
use crate::connection::{Connection, FlushOutcome};
use crate::error::{ChannelError, Result};
use crate::pipeline::RecordingPipeline;
use crate::transport::{MessageTransport, ReadOutcome};

/// Transport backed by two in-memory queues.
#[derive(Debug)]
pub struct LoopbackTransport<M> {
    inbound: VecDeque<M>,
    outbound: VecDeque<M>,
    eof: bool,
    closed: bool,
}

impl<M> LoopbackTransport<M> {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            outbound: VecDeque::new(),
            eof: false,
            closed: false,
        }
    }

    /// Make `msg` available to the next read.
    pub fn push_inbound(&mut self, msg: M) {
        self.inbound.push_back(msg);
    }

    /// Report end of stream once the inbound queue is drained.
    pub fn set_eof(&mut self) {
        self.eof = true;
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    pub fn pop_outbound(&mut self) -> Option<M> {
        self.outbound.pop_front()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<M> Default for LoopbackTransport<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone> MessageTransport for LoopbackTransport<M> {
    type Message = M;

    fn read_messages(&mut self, buf: &mut Vec<M>) -> Result<ReadOutcome> {
        match self.inbound.pop_front() {
            Some(msg) => {
                buf.push(msg);
                Ok(ReadOutcome::Messages(1))
            }
            None if self.eof => Ok(ReadOutcome::Eof),
            None => Ok(ReadOutcome::Idle),
        }
    }

    fn write_messages(&mut self, msgs: &[M], _last_spin: bool) -> Result<usize> {
        self.outbound.extend(msgs.iter().cloned());
        Ok(msgs.len())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

pub type LoopbackConnection<M> = Connection<LoopbackTransport<M>, RecordingPipeline<M>>;

/// A registered connection over a [`LoopbackTransport`] that records
/// whatever reaches its pipeline.
///
/// Errors raised while reading are held back and re-raised by the next
/// operation. Only the first is kept; later ones are logged and dropped.
#[derive(Debug)]
pub struct EmbeddedConnection<M: Clone + 'static> {
    conn: LoopbackConnection<M>,
    first_error: Option<ChannelError>,
}

impl<M: Clone + 'static> EmbeddedConnection<M> {
    pub fn new() -> Result<Self> {
        Self::with_config(ChannelConfig::default())
    }

    pub fn with_config(config: ChannelConfig) -> Result<Self> {
        let mut conn =
            Connection::new(LoopbackTransport::new(), RecordingPipeline::new(), config)?;
        conn.register()?;
        Ok(Self {
            conn,
            first_error: None,
        })
    }

    /// Feed `msgs` through the read path. Returns whether anything is
    /// waiting in [`read_inbound`](Self::read_inbound).
    pub fn write_inbound(&mut self, msgs: impl IntoIterator<Item = M>) -> Result<bool> {
        self.ensure_open()?;
        for msg in msgs {
            self.conn.transport_mut().push_inbound(msg);
        }
        while self.conn.is_open() && self.conn.transport().inbound_len() > 0 {
            self.conn.begin_read();
            let summary = self.conn.read();
            self.collect_errors();
            if summary.delivered == 0 {
                break;
            }
        }
        self.run_pending_tasks();
        self.check_exception()?;
        Ok(self.conn.pipeline().received_len() > 0)
    }

    /// Queue `msgs` and flush them through the write path. Returns whether
    /// anything is waiting in [`read_outbound`](Self::read_outbound).
    pub fn write_outbound(&mut self, msgs: impl IntoIterator<Item = M>) -> Result<bool> {
        self.ensure_open()?;
        for msg in msgs {
            self.conn.write(msg)?;
        }
        match self.conn.flush() {
            Ok(FlushOutcome::Complete) => {}
            Ok(FlushOutcome::Stalled { pending }) => {
                warn!(pending, "loopback flush stalled");
            }
            Err(err) => self.record_exception(err),
        }
        self.run_pending_tasks();
        self.check_exception()?;
        Ok(self.conn.transport().outbound_len() > 0)
    }

    /// Signal end of stream on the inbound side and run the read path.
    pub fn write_eof(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.conn.transport_mut().set_eof();
        self.conn.begin_read();
        while self.conn.is_open() {
            let summary = self.conn.read();
            self.collect_errors();
            if summary.delivered == 0 && !summary.close_requested {
                break;
            }
        }
        self.run_pending_tasks();
        self.check_exception()
    }

    /// Oldest message delivered to the pipeline.
    pub fn read_inbound(&mut self) -> Option<M> {
        self.conn.pipeline_mut().pop_received()
    }

    /// Oldest message written by the connection.
    pub fn read_outbound(&mut self) -> Option<M> {
        self.conn.transport_mut().pop_outbound()
    }

    /// Close the connection. Returns whether any messages are still buffered
    /// on either side.
    pub fn finish(&mut self) -> Result<bool> {
        self.conn.close();
        self.run_pending_tasks();
        self.check_exception()?;
        Ok(self.conn.pipeline().received_len() > 0 || self.conn.transport().outbound_len() > 0)
    }

    /// Queue a task on the connection's event loop.
    pub fn schedule(
        &mut self,
        task: impl FnOnce(&mut LoopbackConnection<M>) + 'static,
    ) -> Result<()> {
        self.conn.execute(task)
    }

    /// Run queued tasks. Errors they surface are recorded.
    pub fn run_pending_tasks(&mut self) -> usize {
        let ran = self.conn.run_pending_tasks();
        self.collect_errors();
        ran
    }

    /// Re-raise the first recorded error, if any.
    pub fn check_exception(&mut self) -> Result<()> {
        match self.first_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    pub fn is_active(&self) -> bool {
        self.conn.is_active()
    }

    pub fn connection(&self) -> &LoopbackConnection<M> {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut LoopbackConnection<M> {
        &mut self.conn
    }

    fn collect_errors(&mut self) {
        for err in self.conn.pipeline_mut().take_errors() {
            self.record_exception(err);
        }
    }

    fn record_exception(&mut self, cause: ChannelError) {
        if self.first_error.is_none() {
            self.first_error = Some(cause);
        } else {
            warn!(error = %cause, "more than one error raised; only the first is reported");
        }
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.conn.is_open() {
            return Ok(());
        }
        self.record_exception(ChannelError::Closed);
        self.check_exception()
    }
}
