//! Linear, capped reconnect delay for the socket bridge.

use crate::config::BackoffConfig;

/// Delay schedule applied between consecutive bridge failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketBackoff {
    config: BackoffConfig,
    next_ms: u32,
}

impl SocketBackoff {
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            next_ms: config.initial_ms,
        }
    }

    /// Delay that the next failure will wait.
    #[must_use]
    pub const fn peek_ms(&self) -> u32 {
        self.next_ms
    }

    /// Returns the delay for this failure and lengthens the next one.
    pub fn next_delay_ms(&mut self) -> u32 {
        let delay = self.next_ms;
        self.next_ms = delay
            .saturating_add(self.config.step_ms)
            .min(self.config.ceiling_ms);
        delay
    }

    pub fn reset(&mut self) {
        self.next_ms = self.config.initial_ms;
    }
}

impl Default for SocketBackoff {
    fn default() -> Self {
        Self::new(BackoffConfig::DEFAULT)
    }
}
