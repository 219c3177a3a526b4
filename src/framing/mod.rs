//! Frame Streams framing
//!
//! A frame stream is a sequence of length-prefixed data frames bracketed by
//! control frames:
//!
//! ```text
//! Writer                                   Reader
//!   |                                        |
//!   |------- READY (content types) -------->|   bidirectional only
//!   |<------ ACCEPT (content type) ---------|   bidirectional only
//!   |------- START (content type) --------->|
//!   |------- data frame ------------------->|
//!   |------- data frame ------------------->|
//!   |------- STOP ------------------------->|
//!   |<------ FINISH ------------------------|   bidirectional only
//! ```
//!
//! Socket transports use the bidirectional form; files are unidirectional.

pub mod control;
pub mod reader;
pub mod writer;

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::Bytes;

pub use control::{ControlFrame, ControlType, MAX_CONTROL_FRAME_SIZE};
pub use reader::FrameReader;
pub use writer::FrameWriter;

/// Content type carried by dnstap frame streams
pub const DNSTAP_CONTENT_TYPE: &[u8] = b"protobuf:dnstap.Dnstap";

/// Default upper bound on a data frame payload
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 96 * 1024;

/// Default writer buffer size; a full buffer is written out immediately
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Options for [`FrameReader`]
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Content type to accept; `None` accepts whatever the writer offers
    pub content_type: Option<Bytes>,

    /// Use the bidirectional handshake (READY/ACCEPT, STOP/FINISH)
    pub bidirectional: bool,

    /// Timeout for handshake reads and control frame writes
    pub timeout: Option<Duration>,

    /// Larger data frames are discarded and reported as too large
    pub max_payload_size: u32,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            content_type: Some(Bytes::from_static(DNSTAP_CONTENT_TYPE)),
            bidirectional: false,
            timeout: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl ReaderOptions {
    pub fn bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn content_type(mut self, content_type: Option<Bytes>) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Options for [`FrameWriter`]
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Content type announced to the reader
    pub content_type: Bytes,

    /// Use the bidirectional handshake
    pub bidirectional: bool,

    /// Timeout for every write/flush and for handshake reads
    pub timeout: Option<Duration>,

    /// Bytes buffered before a write goes to the stream
    pub buffer_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            content_type: Bytes::from_static(DNSTAP_CONTENT_TYPE),
            bidirectional: false,
            timeout: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl WriterOptions {
    pub fn bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn content_type(mut self, content_type: Bytes) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Run `fut` under an optional timeout; expiry is an `io::ErrorKind::TimedOut`
pub(crate) async fn with_timeout<F, T, E>(timeout: Option<Duration>, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<io::Error>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("frame stream operation timed out after {:?}", limit),
            )
            .into()),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let reader = ReaderOptions::default();
        assert_eq!(reader.content_type.as_deref(), Some(DNSTAP_CONTENT_TYPE));
        assert!(!reader.bidirectional);
        assert_eq!(reader.timeout, None);
        assert_eq!(reader.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);

        let writer = WriterOptions::default();
        assert_eq!(&writer.content_type[..], DNSTAP_CONTENT_TYPE);
        assert_eq!(writer.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_option_builders() {
        let reader = ReaderOptions::default()
            .bidirectional(true)
            .timeout(Some(Duration::from_secs(1)))
            .max_payload_size(16)
            .content_type(None);
        assert!(reader.bidirectional);
        assert_eq!(reader.timeout, Some(Duration::from_secs(1)));
        assert_eq!(reader.max_payload_size, 16);
        assert!(reader.content_type.is_none());

        let writer = WriterOptions::default()
            .bidirectional(true)
            .buffer_size(128)
            .content_type(Bytes::from_static(b"test"));
        assert!(writer.bidirectional);
        assert_eq!(writer.buffer_size, 128);
        assert_eq!(&writer.content_type[..], b"test");
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: io::Result<()> = with_timeout(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::TimedOut);

        let result: io::Result<u8> = with_timeout(None, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
