//! Socket addresses
//!
//! Outputs dial and inputs listen on either a TCP `host:port` or a unix-domain
//! socket path. The core does not care which.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

const UNIX_PREFIX: &str = "unix:";

/// A TCP or unix-domain socket address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SocketAddress {
    /// TCP `host:port`, resolved at dial/bind time
    Tcp(String),
    /// Unix-domain socket path
    Unix(PathBuf),
}

impl SocketAddress {
    /// Network name, as reported in logs
    pub fn network(&self) -> &'static str {
        match self {
            SocketAddress::Tcp(_) => "tcp",
            SocketAddress::Unix(_) => "unix",
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, SocketAddress::Unix(_))
    }
}

impl From<SocketAddr> for SocketAddress {
    fn from(addr: SocketAddr) -> Self {
        SocketAddress::Tcp(addr.to_string())
    }
}

impl From<PathBuf> for SocketAddress {
    fn from(path: PathBuf) -> Self {
        SocketAddress::Unix(path)
    }
}

impl FromStr for SocketAddress {
    type Err = Error;

    /// `unix:/path`, any string containing `/`, or `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(Error::InvalidAddress(s.to_string()));
            }
            return Ok(SocketAddress::Unix(PathBuf::from(path)));
        }
        if s.contains('/') {
            return Ok(SocketAddress::Unix(PathBuf::from(s)));
        }

        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(SocketAddress::Tcp(s.to_string()))
            }
            _ => Err(Error::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketAddress::Tcp(addr) => write!(f, "{}", addr),
            SocketAddress::Unix(path) => write!(f, "{}{}", UNIX_PREFIX, path.display()),
        }
    }
}
