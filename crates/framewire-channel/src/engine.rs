//! Read and write loops shared by every message-oriented transport.
//!
//! A read drains the transport into a batch, bounded by
//! `max_messages_per_read`, then hands the batch to the pipeline in order.
//! A write retries the transport up to `write_spin_count` times before
//! yielding. Neither loop blocks: waiting for readiness is the caller's job.

use tracing::{debug, trace};

use crate::error::{ChannelError, Result};
use crate::pipeline::Pipeline;
use crate::state::ChannelHandle;
use crate::transport::{MessageTransport, ReadOutcome};

/// Why a read invocation stopped gathering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The transport had nothing more to give.
    Exhausted,
    /// The peer closed the stream.
    EndOfStream,
    /// The batch reached `max_messages_per_read`.
    Limit,
    /// Auto-read is off, so only one burst was taken.
    SingleBurst,
    /// The decode primitive raised an error.
    Fault,
    /// The channel was already closed; nothing was read.
    Closed,
}

impl StopReason {
    /// True when more data may be waiting in the transport.
    pub fn is_suspension(self) -> bool {
        matches!(self, Self::Limit | Self::SingleBurst)
    }
}

/// Bookkeeping for one read invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSummary {
    pub delivered: usize,
    pub stop: StopReason,
    pub close_requested: bool,
}

/// Drives a [`MessageTransport`] on behalf of one connection.
#[derive(Debug)]
pub struct MessageEngine<M> {
    batch: Vec<M>,
}

impl<M> MessageEngine<M> {
    pub fn new() -> Self {
        Self { batch: Vec::new() }
    }

    /// Run one read cycle and deliver its results to `pipeline`.
    ///
    /// Decode faults become `exception_caught` events. End of stream and
    /// I/O-class faults additionally request a close.
    pub fn read<T, P, C>(
        &mut self,
        transport: &mut T,
        pipeline: &mut P,
        channel: &mut C,
    ) -> ReadSummary
    where
        T: MessageTransport<Message = M>,
        P: Pipeline<M> + ?Sized,
        C: ChannelHandle + ?Sized,
    {
        if !channel.is_open() {
            return ReadSummary {
                delivered: 0,
                stop: StopReason::Closed,
                close_requested: false,
            };
        }

        let max = channel.config().max_messages_per_read;
        let auto_read = channel.config().auto_read;
        if !auto_read {
            channel.clear_read_interest();
        }

        let mut closed = false;
        let mut fault = None;
        let stop = loop {
            match transport.read_messages(&mut self.batch) {
                Ok(ReadOutcome::Messages(0)) | Ok(ReadOutcome::Idle) => break StopReason::Exhausted,
                Ok(ReadOutcome::Eof) => {
                    closed = true;
                    break StopReason::EndOfStream;
                }
                Ok(ReadOutcome::Messages(_)) => {
                    if self.batch.len() >= max || !auto_read {
                        break if self.batch.len() >= max {
                            StopReason::Limit
                        } else {
                            StopReason::SingleBurst
                        };
                    }
                }
                Err(err) => {
                    closed = err.is_io();
                    fault = Some(err);
                    break StopReason::Fault;
                }
            }
        };

        let delivered = self.batch.len();
        for msg in self.batch.drain(..) {
            pipeline.message_received(msg);
        }
        pipeline.batch_complete();

        let mut close_requested = false;
        if fault.is_some() || closed {
            if let Some(cause) = fault {
                debug!(error = %cause, io = cause.is_io(), "read fault");
                pipeline.exception_caught(cause);
            }
            if closed && channel.is_open() {
                channel.request_close();
                close_requested = true;
            }
        } else if stop.is_suspension() {
            pipeline.read_suspended();
        }

        trace!(delivered, stop = ?stop, close_requested, "read cycle complete");
        ReadSummary {
            delivered,
            stop,
            close_requested,
        }
    }

    /// Attempt to write `msgs`, spinning up to `write_spin_count` times.
    ///
    /// Returns how many messages were written. `Ok(0)` means the transport
    /// would not take anything; call again once it is writable.
    pub fn write<T, C>(&self, transport: &mut T, msgs: &[M], channel: &C) -> Result<usize>
    where
        T: MessageTransport<Message = M>,
        C: ChannelHandle + ?Sized,
    {
        if !channel.is_open() {
            return Err(ChannelError::Closed);
        }

        let spins = channel.config().write_spin_count.max(1);
        for remaining in (0..spins).rev() {
            let written = transport.write_messages(msgs, remaining == 0)?;
            if written > 0 {
                return Ok(written);
            }
        }

        debug!(spins, pending = msgs.len(), "write stalled");
        Ok(0)
    }
}

impl<M> Default for MessageEngine<M> {
    fn default() -> Self {
        Self::new()
    }
}
