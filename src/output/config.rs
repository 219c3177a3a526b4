//! Output configuration

use std::time::Duration;

use crate::framing::{WriterOptions, DEFAULT_BUFFER_SIZE};
use crate::net::DEFAULT_DIAL_TIMEOUT;
use crate::queue::OUTPUT_CHANNEL_SIZE;

/// Socket output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Connection establishment timeout for the default dialer
    pub dial_timeout: Duration,

    /// Timeout for writes and handshake reads (None = no timeout)
    pub timeout: Option<Duration>,

    /// Wait between failed connection attempts
    pub retry_interval: Duration,

    /// Period of the background flush
    pub flush_timeout: Duration,

    /// Writer buffer size
    pub buffer_size: usize,

    /// Capacity of the output queue
    pub channel_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            timeout: None,
            retry_interval: Duration::from_secs(10),
            flush_timeout: Duration::from_secs(5),
            buffer_size: DEFAULT_BUFFER_SIZE,
            channel_capacity: OUTPUT_CHANNEL_SIZE,
        }
    }
}

impl OutputConfig {
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn flush_timeout(mut self, interval: Duration) -> Self {
        self.flush_timeout = interval;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Writer options for a socket connection (always bidirectional)
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions::default()
            .bidirectional(true)
            .timeout(self.timeout)
            .buffer_size(self.buffer_size)
    }
}
