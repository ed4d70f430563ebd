use std::collections::VecDeque;
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::error::{ChannelError, Result};

/// A deferred unit of work run against the loop's context.
pub type Task<C> = Box<dyn FnOnce(&mut C) + 'static>;

/// Single-threaded task queue bound to the thread that created it.
///
/// Nothing here is shared between threads: a connection and its loop live
/// on the same thread for the connection's whole life.
pub struct EventLoop<C> {
    owner: ThreadId,
    tasks: VecDeque<Task<C>>,
    shut_down: bool,
}

impl<C> EventLoop<C> {
    /// Create a loop owned by the calling thread.
    pub fn bind_current() -> Self {
        Self {
            owner: thread::current().id(),
            tasks: VecDeque::new(),
            shut_down: false,
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// True when called from the owning thread.
    pub fn in_event_loop(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Queue `task` to run on the next drain.
    pub fn execute(&mut self, task: impl FnOnce(&mut C) + 'static) -> Result<()> {
        if self.shut_down {
            return Err(ChannelError::EventLoopShutdown);
        }
        self.tasks.push_back(Box::new(task));
        Ok(())
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Take every queued task, leaving the queue empty.
    pub fn take_tasks(&mut self) -> VecDeque<Task<C>> {
        std::mem::take(&mut self.tasks)
    }

    /// Reject further tasks and drop those still queued. Returns how many
    /// were dropped.
    pub fn shutdown(&mut self) -> usize {
        let dropped = self.tasks.len();
        self.tasks.clear();
        if !self.shut_down {
            self.shut_down = true;
            debug!(dropped, "event loop shut down");
        }
        dropped
    }
}

impl<C> std::fmt::Debug for EventLoop<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("owner", &self.owner)
            .field("pending_tasks", &self.tasks.len())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}
