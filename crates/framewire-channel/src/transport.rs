use crate::error::Result;

/// What one call to the decode primitive produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many messages were appended to the batch.
    Messages(usize),
    /// Nothing available right now.
    Idle,
    /// The peer closed the stream.
    Eof,
}

impl ReadOutcome {
    /// Interpret a raw count: positive is messages, zero is idle, negative
    /// is end of stream.
    pub fn from_count(count: isize) -> Self {
        match count {
            n if n > 0 => Self::Messages(n.unsigned_abs()),
            0 => Self::Idle,
            _ => Self::Eof,
        }
    }
}

/// Transport-specific primitives driven by the engine.
pub trait MessageTransport {
    type Message;

    /// Decode whatever is available into `buf` without blocking.
    fn read_messages(&mut self, buf: &mut Vec<Self::Message>) -> Result<ReadOutcome>;

    /// Write from the front of `msgs` without blocking and return how many
    /// were fully written. `msgs` always starts at the first message not yet
    /// acknowledged. `last_spin` is set on the final attempt of a flush.
    fn write_messages(&mut self, msgs: &[Self::Message], last_spin: bool) -> Result<usize>;

    /// Release the underlying resource.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
