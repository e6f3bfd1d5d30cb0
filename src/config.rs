//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::DISCONNECT_TIMEOUT;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Read / write timeout for socket operations.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Idle interval after which a keep-alive packet is sent. Must stay
    /// below the server's 45 second disconnection window.
    #[serde(default = "default_keep_alive", with = "humantime_serde")]
    pub keep_alive: Duration,

    /// Capacity of the broadcast message queue. New broadcasts are dropped
    /// while the queue is full.
    #[serde(default = "default_message_buffer")]
    pub message_buffer: usize,
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
}
fn default_message_buffer() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            keep_alive: default_keep_alive(),
            message_buffer: default_message_buffer(),
        }
    }
}

impl Config {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read / write timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the keep-alive interval.
    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Set the broadcast message queue capacity.
    pub fn with_message_buffer(mut self, size: usize) -> Self {
        self.message_buffer = size;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.message_buffer < 1 {
            return Err(Error::InvalidMessageBufferSize);
        }
        if self.keep_alive >= DISCONNECT_TIMEOUT {
            return Err(Error::InvalidKeepAlive);
        }
        Ok(())
    }
}
