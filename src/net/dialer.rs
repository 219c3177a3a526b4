//! Outbound connection establishment
//!
//! [`SocketOutput`](crate::output::SocketOutput) dials through a [`Dialer`],
//! so tests and embedders can replace the connector (custom timeouts,
//! keepalive settings, fault injection).

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::address::SocketAddress;
use super::stream::Connection;

/// Default time allowed for connection establishment
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Replaceable connector
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Stream produced by a successful dial
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Establish one connection to `address`
    async fn dial(&self, address: &SocketAddress) -> io::Result<Self::Stream>;
}

/// Dialer for TCP and unix-domain sockets with a connect timeout
#[derive(Debug, Clone)]
pub struct NetDialer {
    timeout: Duration,
}

impl NetDialer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for NetDialer {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_TIMEOUT)
    }
}

#[async_trait]
impl Dialer for NetDialer {
    type Stream = Connection;

    async fn dial(&self, address: &SocketAddress) -> io::Result<Connection> {
        match tokio::time::timeout(self.timeout, Connection::connect(address)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("dial {} timed out after {:?}", address, self.timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Listener;

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to find a port nobody listens on
        let listener = Listener::bind(&"127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dialer = NetDialer::new(Duration::from_secs(1));
        assert!(dialer.dial(&addr).await.is_err());
    }

    #[tokio::test]
    async fn test_dial_connects() {
        let listener = Listener::bind(&"127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dialer = NetDialer::default();
        assert_eq!(dialer.timeout(), DEFAULT_DIAL_TIMEOUT);
        let (conn, accepted) = tokio::join!(dialer.dial(&addr), listener.accept());
        assert!(conn.is_ok());
        assert!(accepted.is_ok());
    }
}
