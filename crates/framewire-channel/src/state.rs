use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Connection lifecycle: `Open -> Active -> Closed`, closing is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Constructed but not yet bound to an event loop.
    Open,
    /// Registered and exchanging data.
    Active,
    /// Closed; no further reads or writes.
    Closed,
}

impl ChannelState {
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Closed)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The view of its channel that the engine needs.
pub trait ChannelHandle {
    fn is_open(&self) -> bool;

    fn is_active(&self) -> bool;

    fn config(&self) -> &ChannelConfig;

    /// Stop asking for readiness until the caller re-arms reads.
    fn clear_read_interest(&mut self);

    /// Ask for the channel to be closed. A no-op once closed.
    fn request_close(&mut self);
}

/// Lifecycle state, config, and read interest of one connection.
#[derive(Debug)]
pub struct ChannelCore {
    id: u64,
    state: ChannelState,
    config: ChannelConfig,
    read_interest: bool,
    close_pending: bool,
}

impl ChannelCore {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            state: ChannelState::Open,
            config,
            read_interest: true,
            close_pending: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// `Open -> Active`.
    pub fn mark_active(&mut self) -> Result<()> {
        match self.state {
            ChannelState::Open => {
                self.state = ChannelState::Active;
                Ok(())
            }
            ChannelState::Active => Err(ChannelError::AlreadyRegistered),
            ChannelState::Closed => Err(ChannelError::Closed),
        }
    }

    /// Whether the connection wants to hear about readability.
    pub fn wants_read(&self) -> bool {
        self.read_interest && self.state.is_open()
    }

    /// Re-arm read interest after a single-burst read.
    pub fn set_read_interest(&mut self) {
        self.read_interest = true;
    }

    pub fn set_auto_read(&mut self, auto_read: bool) {
        self.config.auto_read = auto_read;
        if auto_read {
            self.read_interest = true;
        }
    }

    /// Returns true exactly once after a close was requested.
    pub(crate) fn take_close_pending(&mut self) -> bool {
        std::mem::take(&mut self.close_pending)
    }
}

impl ChannelHandle for ChannelCore {
    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn clear_read_interest(&mut self) {
        self.read_interest = false;
    }

    fn request_close(&mut self) {
        if !self.state.is_open() {
            return;
        }
        debug!(channel = self.id, from = %self.state, "closing channel");
        self.state = ChannelState::Closed;
        self.read_interest = false;
        self.close_pending = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut core = ChannelCore::new(ChannelConfig::default());
        assert_eq!(core.state(), ChannelState::Open);
        assert!(core.is_open());
        assert!(!core.is_active());

        core.mark_active().unwrap();
        assert!(core.is_active());
        assert!(matches!(
            core.mark_active(),
            Err(ChannelError::AlreadyRegistered)
        ));

        core.request_close();
        assert_eq!(core.state(), ChannelState::Closed);
        assert!(core.take_close_pending());
        assert!(!core.take_close_pending());

        core.request_close();
        assert!(!core.take_close_pending());
        assert!(matches!(core.mark_active(), Err(ChannelError::Closed)));
    }

    #[test]
    fn read_interest() {
        let mut core = ChannelCore::new(ChannelConfig::default().with_auto_read(false));
        assert!(core.wants_read());
        core.clear_read_interest();
        assert!(!core.wants_read());
        core.set_read_interest();
        assert!(core.wants_read());

        core.clear_read_interest();
        core.set_auto_read(true);
        assert!(core.wants_read());
        assert!(core.config().auto_read);

        core.request_close();
        assert!(!core.wants_read());
    }

    #[test]
    fn ids_are_unique() {
        let a = ChannelCore::new(ChannelConfig::default());
        let b = ChannelCore::new(ChannelConfig::default());
        assert_ne!(a.id(), b.id());
    }
}
