use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Per-connection limits and toggles read by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Upper bound on messages gathered by one read invocation. Default: 16.
    pub max_messages_per_read: usize,
    /// Keep reading on every readiness signal. When off, each read is a
    /// single burst and read interest must be re-armed by the caller.
    /// Default: true.
    pub auto_read: bool,
    /// Write attempts per flush before yielding to the event loop. Default: 16.
    pub write_spin_count: usize,
}

impl ChannelConfig {
    pub const DEFAULT_MAX_MESSAGES_PER_READ: usize = 16;
    pub const DEFAULT_WRITE_SPIN_COUNT: usize = 16;

    pub fn with_max_messages_per_read(mut self, max: usize) -> Self {
        self.max_messages_per_read = max;
        self
    }

    pub fn with_auto_read(mut self, auto_read: bool) -> Self {
        self.auto_read = auto_read;
        self
    }

    pub fn with_write_spin_count(mut self, spins: usize) -> Self {
        self.write_spin_count = spins;
        self
    }

    /// Check the numeric limits are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_messages_per_read == 0 {
            return Err(ChannelError::InvalidConfig(
                "max_messages_per_read must be at least 1".to_string(),
            ));
        }
        if self.write_spin_count == 0 {
            return Err(ChannelError::InvalidConfig(
                "write_spin_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_messages_per_read: Self::DEFAULT_MAX_MESSAGES_PER_READ,
            auto_read: true,
            write_spin_count: Self::DEFAULT_WRITE_SPIN_COUNT,
        }
    }
}
