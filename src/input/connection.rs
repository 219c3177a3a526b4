//! Per-connection frame reader

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::Level;

use crate::codec::Decoder;
use crate::framing::ReaderOptions;
use crate::logging::SharedLogger;
use crate::queue::FrameSender;

/// Drains one connection into the sink queue
///
/// Ends at end of stream (EOF or STOP, silently), on a decode error (logged)
/// or when the sink is closed. Errors never escape to other connections.
pub struct ConnectionReader {
    id: u64,
    peer: Option<SocketAddr>,
    logger: SharedLogger,
}

impl ConnectionReader {
    pub fn new(id: u64, peer: Option<SocketAddr>, logger: SharedLogger) -> Self {
        Self { id, peer, logger }
    }

    /// Handshake on `stream`, then forward frames to `sink`
    ///
    /// Returns the number of frames delivered.
    pub async fn run<S>(&self, stream: S, options: ReaderOptions, sink: &FrameSender) -> u64
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut decoder = match Decoder::new(stream, options).await {
            Ok(decoder) => decoder,
            Err(e) => {
                self.logger.log(
                    Level::WARN,
                    format_args!("connection {}: open input{} failed: {}", self.id, self.origin(), e),
                );
                return 0;
            }
        };
        self.drain(&mut decoder, sink).await
    }

    /// Forward frames from an established decoder to `sink`
    pub async fn drain<S>(&self, decoder: &mut Decoder<S>, sink: &FrameSender) -> u64
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut delivered = 0;
        loop {
            match decoder.decode_frame().await {
                Ok(Some(frame)) => {
                    if sink.send(frame).await.is_err() {
                        self.logger.log(
                            Level::DEBUG,
                            format_args!("connection {}: sink closed", self.id),
                        );
                        break;
                    }
                    delivered += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    self.logger.log(
                        Level::WARN,
                        format_args!("connection {}: decode failed: {}", self.id, e),
                    );
                    break;
                }
            }
        }
        if decoder.skipped() > 0 {
            self.logger.log(
                Level::INFO,
                format_args!(
                    "connection {}: skipped {} oversized frames",
                    self.id,
                    decoder.skipped()
                ),
            );
        }
        delivered
    }

    pub(crate) fn origin(&self) -> Origin {
        Origin(self.peer)
    }
}

/// Formats as ` from <peer>` for TCP connections, empty otherwise
pub(crate) struct Origin(Option<SocketAddr>);

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(peer) => write!(f, " from {}", peer),
            None => Ok(()),
        }
    }
}
