//! Input configuration

use std::time::Duration;

use crate::framing::{ReaderOptions, DEFAULT_MAX_PAYLOAD_SIZE};

/// Settings applied to each accepted connection
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Read timeout for the handshake and control frame writes (None = no timeout)
    pub timeout: Option<Duration>,

    /// Data frames above this size are skipped
    pub max_payload_size: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl InputConfig {
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Reader options for a socket connection (always bidirectional)
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions::default()
            .bidirectional(true)
            .timeout(self.timeout)
            .max_payload_size(self.max_payload_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InputConfig::default();
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_payload_size, 96 * 1024);
    }

    #[test]
    fn test_reader_options() {
        let config = InputConfig::default()
            .timeout(Some(Duration::from_secs(2)))
            .max_payload_size(512);
        let options = config.reader_options();

        assert!(options.bidirectional);
        assert_eq!(options.timeout, Some(Duration::from_secs(2)));
        assert_eq!(options.max_payload_size, 512);
        assert!(options.content_type.is_some());
    }
}
