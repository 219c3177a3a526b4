//! Error types
//!
//! Runtime failures inside the input and output loops are logged and handled
//! where they happen; these types surface from constructors and from the
//! framing layer.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying stream or socket error (timeouts included)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Frame Streams protocol violation
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// A data frame exceeded the configured maximum and was discarded
    #[error("data frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    /// Address could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Payload could not be parsed into a message
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl Error {
    /// True for the recoverable oversized-frame condition
    pub fn is_too_large(&self) -> bool {
        matches!(self, Error::FrameTooLarge { .. })
    }

    /// True when the peer went away mid-frame
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Frame Streams protocol errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// Escape sequence expected but a data frame length was read
    #[error("expected control frame, got data frame of {0} bytes")]
    ExpectedControl(u32),

    /// Control frame of an unexpected type
    #[error("unexpected control frame: expected {expected}, got {actual}")]
    UnexpectedControl {
        expected: &'static str,
        actual: &'static str,
    },

    /// Unknown control frame type
    #[error("unknown control frame type {0:#x}")]
    UnknownControlType(u32),

    /// Unknown control field type
    #[error("unknown control field type {0:#x}")]
    UnknownFieldType(u32),

    /// Control frame longer than the protocol allows
    #[error("control frame too large: {0} bytes")]
    ControlTooLarge(u32),

    /// Control frame truncated or inconsistent
    #[error("malformed control frame: {0}")]
    Malformed(&'static str),

    /// Peer offered or started with a content type we do not accept
    #[error("content type mismatch")]
    ContentTypeMismatch,
}

impl From<FramingError> for io::Error {
    fn from(err: FramingError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_is_recoverable() {
        let err = Error::FrameTooLarge { size: 10, max: 5 };
        assert!(err.is_too_large());
        assert_eq!(err.to_string(), "data frame too large: 10 bytes (max 5)");

        let err = Error::from(FramingError::ContentTypeMismatch);
        assert!(!err.is_too_large());
    }

    #[test]
    fn test_into_io_error_keeps_kind() {
        let err = Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);

        let io_err: io::Error = Error::from(FramingError::Malformed("short")).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_unexpected_eof() {
        let err = Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(err.is_unexpected_eof());
        assert!(!Error::InvalidAddress("x".into()).is_unexpected_eof());
    }
}
