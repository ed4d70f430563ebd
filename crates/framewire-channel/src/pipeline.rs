use std::collections::VecDeque;

use crate::error::ChannelError;

/// Receives the events a connection produces, in order.
///
/// Messages handed to [`message_received`](Pipeline::message_received) are
/// owned by the pipeline from then on; the read batch they came from is
/// cleared before the read returns.
pub trait Pipeline<M> {
    fn message_received(&mut self, msg: M);

    /// Every message of the current read has been delivered.
    fn batch_complete(&mut self) {}

    /// The read stopped on its per-cycle limit or because auto-read is off,
    /// with more data possibly waiting.
    fn read_suspended(&mut self) {}

    fn exception_caught(&mut self, cause: ChannelError);

    fn channel_closed(&mut self) {}
}

impl<M, P: Pipeline<M> + ?Sized> Pipeline<M> for &mut P {
    fn message_received(&mut self, msg: M) {
        (**self).message_received(msg)
    }

    fn batch_complete(&mut self) {
        (**self).batch_complete()
    }

    fn read_suspended(&mut self) {
        (**self).read_suspended()
    }

    fn exception_caught(&mut self, cause: ChannelError) {
        (**self).exception_caught(cause)
    }

    fn channel_closed(&mut self) {
        (**self).channel_closed()
    }
}

impl<M, P: Pipeline<M> + ?Sized> Pipeline<M> for Box<P> {
    fn message_received(&mut self, msg: M) {
        (**self).message_received(msg)
    }

    fn batch_complete(&mut self) {
        (**self).batch_complete()
    }

    fn read_suspended(&mut self) {
        (**self).read_suspended()
    }

    fn exception_caught(&mut self, cause: ChannelError) {
        (**self).exception_caught(cause)
    }

    fn channel_closed(&mut self) {
        (**self).channel_closed()
    }
}

/// Pipeline that keeps everything it is given.
#[derive(Debug)]
pub struct RecordingPipeline<M> {
    received: VecDeque<M>,
    errors: Vec<ChannelError>,
    batches: usize,
    suspensions: usize,
    closed: bool,
}

impl<M> RecordingPipeline<M> {
    pub fn new() -> Self {
        Self {
            received: VecDeque::new(),
            errors: Vec::new(),
            batches: 0,
            suspensions: 0,
            closed: false,
        }
    }

    /// Oldest message not yet taken.
    pub fn pop_received(&mut self) -> Option<M> {
        self.received.pop_front()
    }

    pub fn received(&self) -> impl Iterator<Item = &M> {
        self.received.iter()
    }

    pub fn received_len(&self) -> usize {
        self.received.len()
    }

    /// Errors recorded since the last call, oldest first.
    pub fn take_errors(&mut self) -> Vec<ChannelError> {
        std::mem::take(&mut self.errors)
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of `batch_complete` events seen.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Number of `read_suspended` events seen.
    pub fn suspensions(&self) -> usize {
        self.suspensions
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<M> Default for RecordingPipeline<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Pipeline<M> for RecordingPipeline<M> {
    fn message_received(&mut self, msg: M) {
        self.received.push_back(msg);
    }

    fn batch_complete(&mut self) {
        self.batches += 1;
    }

    fn read_suspended(&mut self) {
        self.suspensions += 1;
    }

    fn exception_caught(&mut self, cause: ChannelError) {
        self.errors.push(cause);
    }

    fn channel_closed(&mut self) {
        self.closed = true;
    }
}
