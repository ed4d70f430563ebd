use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::engine::{MessageEngine, ReadSummary};
use crate::error::{ChannelError, Result};
use crate::event_loop::EventLoop;
use crate::pipeline::Pipeline;
use crate::state::{ChannelCore, ChannelHandle, ChannelState};
use crate::transport::MessageTransport;

/// Result of [`Connection::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every queued message was written.
    Complete,
    /// The transport stopped taking data; flush again once it is writable.
    Stalled { pending: usize },
}

/// One connection: a transport, the pipeline its messages go to, and the
/// engine that moves them.
///
/// A connection is driven from a single thread. After [`register`] every
/// read, flush, and queued task must run on the registering thread.
///
/// [`register`]: Connection::register
pub struct Connection<T: MessageTransport, P> {
    core: ChannelCore,
    transport: T,
    pipeline: P,
    engine: MessageEngine<T::Message>,
    outbound: VecDeque<T::Message>,
    event_loop: Option<EventLoop<Connection<T, P>>>,
}

impl<T, P> Connection<T, P>
where
    T: MessageTransport,
    P: Pipeline<T::Message>,
{
    pub fn new(transport: T, pipeline: P, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: ChannelCore::new(config),
            transport,
            pipeline,
            engine: MessageEngine::new(),
            outbound: VecDeque::new(),
            event_loop: None,
        })
    }

    pub fn id(&self) -> u64 {
        self.core.id()
    }

    pub fn state(&self) -> ChannelState {
        self.core.state()
    }

    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    pub fn config(&self) -> &ChannelConfig {
        self.core.config()
    }

    /// Bind the connection to the calling thread and mark it active.
    pub fn register(&mut self) -> Result<()> {
        if self.event_loop.is_some() {
            return Err(ChannelError::AlreadyRegistered);
        }
        self.core.mark_active()?;
        self.event_loop = Some(EventLoop::bind_current());
        debug!(channel = self.id(), "channel registered");
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.event_loop.is_some()
    }

    /// Whether the driver should poll this connection for readability.
    pub fn wants_read(&self) -> bool {
        self.core.wants_read()
    }

    /// Re-arm reading after a single-burst read with auto-read off.
    pub fn begin_read(&mut self) {
        self.core.set_read_interest();
    }

    pub fn set_auto_read(&mut self, auto_read: bool) {
        self.core.set_auto_read(auto_read);
    }

    /// Handle one readiness signal.
    pub fn read(&mut self) -> ReadSummary {
        self.assert_in_event_loop();
        let summary = self
            .engine
            .read(&mut self.transport, &mut self.pipeline, &mut self.core);
        self.finish_close();
        summary
    }

    /// Queue `msg` for the next flush.
    pub fn write(&mut self, msg: T::Message) -> Result<()> {
        if !self.core.is_open() {
            return Err(ChannelError::Closed);
        }
        self.outbound.push_back(msg);
        Ok(())
    }

    /// Write queued messages until the queue is empty or the transport
    /// stops taking data.
    ///
    /// A message that cannot be encoded is dropped from the queue and its
    /// error returned; messages before it are already written. An I/O-class
    /// error closes the connection.
    pub fn flush(&mut self) -> Result<FlushOutcome> {
        self.assert_in_event_loop();
        while !self.outbound.is_empty() {
            let pending = self.outbound.make_contiguous();
            match self.engine.write(&mut self.transport, pending, &self.core) {
                Ok(0) => {
                    return Ok(FlushOutcome::Stalled {
                        pending: self.outbound.len(),
                    })
                }
                Ok(written) => {
                    let written = written.min(self.outbound.len());
                    self.outbound.drain(..written);
                }
                Err(err) => {
                    if err.is_io() {
                        warn!(channel = self.id(), error = %err, "write failed; closing");
                        self.close();
                    } else if !matches!(err, ChannelError::Closed) {
                        debug!(channel = self.id(), error = %err, "dropping unwritable message");
                        self.outbound.pop_front();
                    }
                    return Err(err);
                }
            }
        }
        Ok(FlushOutcome::Complete)
    }

    pub fn write_and_flush(&mut self, msg: T::Message) -> Result<FlushOutcome> {
        self.write(msg)?;
        self.flush()
    }

    /// Messages queued but not yet written.
    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    /// Queue `task` on this connection's event loop.
    pub fn execute(&mut self, task: impl FnOnce(&mut Self) + 'static) -> Result<()> {
        self.event_loop
            .as_mut()
            .ok_or(ChannelError::NotRegistered)?
            .execute(task)
    }

    /// Run queued tasks, including tasks they queue, until none remain.
    pub fn run_pending_tasks(&mut self) -> usize {
        self.assert_in_event_loop();
        let mut ran = 0;
        loop {
            let tasks = match self.event_loop.as_mut() {
                Some(event_loop) => event_loop.take_tasks(),
                None => return ran,
            };
            if tasks.is_empty() {
                return ran;
            }
            for task in tasks {
                task(self);
                ran += 1;
            }
        }
    }

    /// Close the connection. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        self.core.request_close();
        self.finish_close()
    }

    /// Close and tear down the event loop. Returns how many queued tasks
    /// were dropped.
    pub fn shutdown(&mut self) -> usize {
        self.close();
        self.event_loop
            .as_mut()
            .map(EventLoop::shutdown)
            .unwrap_or(0)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    fn finish_close(&mut self) -> bool {
        if !self.core.take_close_pending() {
            return false;
        }
        if !self.outbound.is_empty() {
            debug!(
                channel = self.id(),
                dropped = self.outbound.len(),
                "discarding unflushed messages"
            );
            self.outbound.clear();
        }
        if let Err(err) = self.transport.close() {
            debug!(channel = self.id(), error = %err, "transport close failed");
        }
        self.pipeline.channel_closed();
        true
    }

    fn assert_in_event_loop(&self) {
        debug_assert!(
            self.event_loop
                .as_ref()
                .map_or(true, EventLoop::in_event_loop),
            "connection {} driven off its event loop thread",
            self.id()
        );
    }
}

impl<T, P> std::fmt::Debug for Connection<T, P>
where
    T: MessageTransport,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.core.id())
            .field("state", &self.core.state())
            .field("pending_outbound", &self.outbound.len())
            .field("event_loop", &self.event_loop)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::pipeline::RecordingPipeline;
    use crate::transport::ReadOutcome;

    /// Accepts up to `budget` messages per call; rejects any message
    /// equal to `poison`.
    #[derive(Default)]
    struct Sink {
        inbound: VecDeque<u32>,
        budget: usize,
        poison: Option<u32>,
        broken: bool,
        written: Vec<u32>,
        closes: usize,
    }

    impl MessageTransport for Sink {
        type Message = u32;

        fn read_messages(&mut self, buf: &mut Vec<u32>) -> Result<ReadOutcome> {
            match self.inbound.pop_front() {
                Some(msg) => {
                    buf.push(msg);
                    Ok(ReadOutcome::Messages(1))
                }
                None => Ok(ReadOutcome::Idle),
            }
        }

        fn write_messages(&mut self, msgs: &[u32], _last_spin: bool) -> Result<usize> {
            if self.broken {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
            }
            let mut n = 0;
            for &msg in msgs.iter().take(self.budget) {
                if Some(msg) == self.poison {
                    if n == 0 {
                        return Err(ChannelError::decode("poisoned message"));
                    }
                    break;
                }
                self.written.push(msg);
                n += 1;
            }
            Ok(n)
        }

        fn close(&mut self) -> Result<()> {
            self.closes += 1;
            Ok(())
        }
    }

    type TestConnection = Connection<Sink, RecordingPipeline<u32>>;

    fn connection(sink: Sink) -> TestConnection {
        let mut conn = Connection::new(sink, RecordingPipeline::new(), ChannelConfig::default())
            .unwrap();
        conn.register().unwrap();
        conn
    }

    #[test]
    fn rejects_invalid_config() {
        let err = Connection::new(
            Sink::default(),
            RecordingPipeline::new(),
            ChannelConfig::default().with_write_spin_count(0),
        )
        .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidConfig(_)));
    }

    #[test]
    fn register_once() {
        let mut conn = connection(Sink::default());
        assert!(conn.is_active());
        assert!(conn.is_registered());
        assert!(matches!(
            conn.register(),
            Err(ChannelError::AlreadyRegistered)
        ));
    }

    #[test]
    fn flush_drains_queue_in_order() {
        let mut conn = connection(Sink {
            budget: 2,
            ..Sink::default()
        });
        for msg in 1..=5 {
            conn.write(msg).unwrap();
        }

        assert_eq!(conn.flush().unwrap(), FlushOutcome::Complete);
        assert_eq!(conn.transport().written, vec![1, 2, 3, 4, 5]);
        assert_eq!(conn.pending_outbound(), 0);
    }

    #[test]
    fn flush_reports_stall() {
        let mut conn = connection(Sink::default());
        conn.write(1).unwrap();
        conn.write(2).unwrap();

        assert_eq!(conn.flush().unwrap(), FlushOutcome::Stalled { pending: 2 });

        conn.transport_mut().budget = 8;
        assert_eq!(conn.flush().unwrap(), FlushOutcome::Complete);
        assert_eq!(conn.transport().written, vec![1, 2]);
    }

    #[test]
    fn unencodable_message_dropped_alone() {
        let mut conn = connection(Sink {
            budget: 8,
            poison: Some(3),
            ..Sink::default()
        });
        for msg in 1..=4 {
            conn.write(msg).unwrap();
        }

        assert!(conn.flush().is_err());
        assert_eq!(conn.transport().written, vec![1, 2]);
        assert_eq!(conn.pending_outbound(), 1);
        assert!(conn.is_open());

        assert_eq!(conn.flush().unwrap(), FlushOutcome::Complete);
        assert_eq!(conn.transport().written, vec![1, 2, 4]);
    }

    #[test]
    fn io_write_error_closes() {
        let mut conn = connection(Sink {
            broken: true,
            ..Sink::default()
        });
        conn.write(1).unwrap();

        let err = conn.flush().unwrap_err();
        assert!(err.is_io());
        assert!(!conn.is_open());
        assert_eq!(conn.pending_outbound(), 0);
        assert!(conn.pipeline().is_closed());
        assert!(matches!(conn.write(2), Err(ChannelError::Closed)));
    }

    #[test]
    fn close_is_idempotent() {
        let mut conn = connection(Sink::default());
        assert!(conn.close());
        assert!(!conn.close());
        assert_eq!(conn.transport().closes, 1);
        assert_eq!(conn.state(), ChannelState::Closed);
    }

    #[test]
    fn tasks_may_queue_tasks() {
        let mut conn = connection(Sink {
            budget: 8,
            ..Sink::default()
        });
        conn.execute(|c| {
            c.write(1).unwrap();
            c.execute(|c| {
                c.flush().unwrap();
            })
            .unwrap();
        })
        .unwrap();

        assert_eq!(conn.run_pending_tasks(), 2);
        assert_eq!(conn.transport().written, vec![1]);
    }

    #[test]
    fn execute_requires_registration() {
        let mut conn =
            Connection::new(Sink::default(), RecordingPipeline::new(), ChannelConfig::default())
                .unwrap();
        assert!(matches!(
            conn.execute(|_| {}),
            Err(ChannelError::NotRegistered)
        ));
    }

    #[test]
    fn shutdown_drops_tasks_and_closes() {
        let mut conn = connection(Sink::default());
        conn.execute(|c| {
            c.write(1).unwrap();
        })
        .unwrap();

        assert_eq!(conn.shutdown(), 1);
        assert!(!conn.is_open());
        assert!(matches!(
            conn.execute(|_| {}),
            Err(ChannelError::EventLoopShutdown)
        ));
        assert_eq!(conn.run_pending_tasks(), 0);
    }

    #[test]
    fn read_after_close_is_noop() {
        let mut conn = connection(Sink {
            inbound: VecDeque::from([7]),
            ..Sink::default()
        });
        let summary = conn.read();
        assert_eq!(summary.delivered, 1);
        assert_eq!(conn.pipeline_mut().pop_received(), Some(7));

        conn.close();
        let summary = conn.read();
        assert_eq!(summary.delivered, 0);
        assert_eq!(conn.transport().closes, 1);
    }
}
