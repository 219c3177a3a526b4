//! Reconnecting socket output
//!
//! Sends frames to one collector over a bidirectional frame stream and keeps
//! the connection alive across failures.
//!
//! ```text
//!  frame ──> backlog ──> writer buffer ──> socket
//!              ▲              │
//!              │              └── flush (buffer full, flush tick, close)
//!              └── cleared once a flush succeeds; replayed after a failure
//! ```
//!
//! - Dial failures and handshake failures are logged, then retried after
//!   `retry_interval`, without bound.
//! - A write failure drops the connection; the next attempt re-dials
//!   immediately and replays the backlog.
//! - A failed periodic flush drops the connection and wakes the run loop,
//!   which re-dials and replays the backlog without waiting for a new frame.
//! - The state lock is held across a write or a flush, never across dialing
//!   or the retry sleep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Level;

use super::config::OutputConfig;
use super::Output;
use crate::error::Result;
use crate::framing::FrameWriter;
use crate::logging::{null_logger, SharedLogger};
use crate::net::{Dialer, NetDialer, SocketAddress};
use crate::queue::{FrameSender, OutputQueue};

/// Connection state shared by the run loop and the flush task
#[derive(Debug)]
struct OutputState<S> {
    writer: Option<FrameWriter<S>>,
    /// Frames not yet confirmed by a successful flush
    backlog: Vec<Bytes>,
    /// Prefix of `backlog` already handed to the current writer
    written: usize,
    last_write: Option<Instant>,
}

impl<S> OutputState<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    fn new() -> Self {
        Self {
            writer: None,
            backlog: Vec::new(),
            written: 0,
            last_write: None,
        }
    }

    fn install(&mut self, writer: FrameWriter<S>) {
        self.writer = Some(writer);
        self.written = 0;
    }

    fn teardown(&mut self) {
        self.writer = None;
        self.written = 0;
    }

    /// Hand every unwritten backlog frame to the writer
    async fn write_pending(&mut self, flush: bool) -> Result<()> {
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return Ok(()),
        };

        while self.written < self.backlog.len() {
            writer.write(&self.backlog[self.written]).await?;
            self.written += 1;
            self.last_write = Some(Instant::now());
            if writer.buffered() == 0 {
                self.backlog.drain(..self.written);
                self.written = 0;
            }
        }

        if flush {
            writer.flush().await?;
            self.backlog.clear();
            self.written = 0;
        }
        Ok(())
    }

    /// Flush buffered frames if there are any
    async fn flush(&mut self) -> Result<bool> {
        let writer = match self.writer.as_mut() {
            Some(writer) if writer.buffered() > 0 => writer,
            _ => return Ok(false),
        };
        writer.flush().await?;
        self.backlog.drain(..self.written);
        self.written = 0;
        Ok(true)
    }

    fn is_drained(&self) -> bool {
        self.backlog.is_empty()
    }
}

/// Output that delivers frames to a collector socket, reconnecting as needed
pub struct SocketOutput<D: Dialer = NetDialer> {
    address: SocketAddress,
    config: OutputConfig,
    dialer: D,
    queue: OutputQueue,
    logger: RwLock<SharedLogger>,
    state: Arc<Mutex<OutputState<D::Stream>>>,
    /// Signalled by the flush task after it tears down a connection
    reconnect: Arc<Notify>,
}

impl SocketOutput<NetDialer> {
    /// Output to `address` with default settings
    pub fn new(address: SocketAddress) -> Self {
        Self::with_config(address, OutputConfig::default())
    }

    pub fn with_config(address: SocketAddress, config: OutputConfig) -> Self {
        let dialer = NetDialer::new(config.dial_timeout);
        Self::with_dialer(address, config, dialer)
    }
}

impl<D: Dialer> SocketOutput<D> {
    /// Output using a custom dialer; `config.dial_timeout` is not applied
    pub fn with_dialer(address: SocketAddress, config: OutputConfig, dialer: D) -> Self {
        Self {
            queue: OutputQueue::new(config.channel_capacity),
            address,
            config,
            dialer,
            logger: RwLock::new(null_logger()),
            state: Arc::new(Mutex::new(OutputState::new())),
            reconnect: Arc::new(Notify::new()),
        }
    }

    /// Set the logger; takes effect for a run loop started afterwards
    pub fn set_logger(&self, logger: SharedLogger) {
        *self.logger.write() = logger;
    }

    /// Time of the last frame handed to a writer
    pub async fn last_write(&self) -> Option<Instant> {
        self.state.lock().await.last_write
    }

    fn log(&self, level: Level, args: std::fmt::Arguments<'_>) {
        self.logger.read().log(level, args);
    }

    /// Dial and handshake until a writer is installed
    ///
    /// Waits `retry_interval` after a failed dial and after a failed
    /// handshake alike, rather than re-dialing at once when the peer accepted
    /// the connection but broke off the handshake.
    async fn ensure_writer(&self) {
        loop {
            if self.state.lock().await.writer.is_some() {
                return;
            }

            let stream = match self.dialer.dial(&self.address).await {
                Ok(stream) => stream,
                Err(e) => {
                    self.log(Level::WARN, format_args!("{}: dial failed: {}", self.address, e));
                    tokio::time::sleep(self.config.retry_interval).await;
                    continue;
                }
            };

            match FrameWriter::new(stream, self.config.writer_options()).await {
                Ok(writer) => {
                    self.state.lock().await.install(writer);
                    self.log(Level::INFO, format_args!("{}: connected", self.address));
                    return;
                }
                Err(e) => {
                    self.log(
                        Level::WARN,
                        format_args!("{}: handshake failed: {}", self.address, e),
                    );
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }

    /// Write the backlog, reconnecting until it succeeds
    async fn write_backlog(&self, flush: bool) {
        loop {
            self.ensure_writer().await;

            let mut state = self.state.lock().await;
            if state.writer.is_none() {
                // Torn down by the flush task in between
                continue;
            }
            match state.write_pending(flush).await {
                Ok(()) => return,
                Err(e) => {
                    self.log(Level::WARN, format_args!("{}: write failed: {}", self.address, e));
                    state.teardown();
                }
            }
        }
    }

    fn spawn_flusher(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let reconnect = Arc::clone(&self.reconnect);
        let logger = self.logger.read().clone();
        let address = self.address.to_string();
        let period = self.config.flush_timeout.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let mut state = state.lock().await;
                match state.flush().await {
                    Ok(true) => tracing::trace!(addr = %address, "Periodic flush"),
                    Ok(false) => {}
                    Err(e) => {
                        logger.log(Level::WARN, format_args!("{}: flush failed: {}", address, e));
                        state.teardown();
                        reconnect.notify_one();
                    }
                }
            }
        })
    }

    /// Deliver what is left and end the stream
    async fn finish(&self) {
        let drained = self.state.lock().await.is_drained();
        if !drained {
            self.write_backlog(true).await;
        }

        let writer = self.state.lock().await.writer.take();
        if let Some(writer) = writer {
            if let Err(e) = writer.close().await {
                self.log(Level::DEBUG, format_args!("{}: close failed: {}", self.address, e));
            }
        }
    }
}

#[async_trait]
impl<D: Dialer> Output for SocketOutput<D> {
    fn output_channel(&self) -> FrameSender {
        self.queue.sender()
    }

    async fn run_output_loop(&self) {
        let mut reader = match self.queue.take_reader() {
            Some(reader) => reader,
            None => {
                self.log(
                    Level::WARN,
                    format_args!("{}: output loop already started", self.address),
                );
                return;
            }
        };

        let flusher = self.spawn_flusher();

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.reconnect.notified() => {
                    self.write_backlog(true).await;
                    continue;
                }
                frame = reader.recv() => frame,
            };
            let frame = match frame {
                Some(frame) => frame,
                None => break,
            };
            if frame.is_empty() || frame.len() > u32::MAX as usize {
                self.log(
                    Level::WARN,
                    format_args!("{}: dropping frame of {} bytes", self.address, frame.len()),
                );
                continue;
            }
            self.state.lock().await.backlog.push(frame);
            self.write_backlog(false).await;
        }

        flusher.abort();
        let _ = flusher.await;

        self.finish().await;
        self.queue.mark_done();
    }

    async fn close(&self) {
        self.queue.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tokio::io::{duplex, DuplexStream};
    use tokio::sync::mpsc;

    use super::*;
    use crate::framing::{FrameReader, ReaderOptions};
    use crate::logging::test_support::CollectingLogger;

    /// Dialer handing the far end of every connection to the test
    struct DuplexDialer {
        accepted: mpsc::UnboundedSender<DuplexStream>,
    }

    #[async_trait]
    impl Dialer for DuplexDialer {
        type Stream = DuplexStream;

        async fn dial(&self, _address: &SocketAddress) -> io::Result<DuplexStream> {
            let (client, server) = duplex(64 * 1024);
            self.accepted
                .send(server)
                .map_err(|_| io::Error::from(io::ErrorKind::ConnectionRefused))?;
            Ok(client)
        }
    }

    fn socket_output(config: OutputConfig) -> (Arc<SocketOutput<DuplexDialer>>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (accepted, conns) = mpsc::unbounded_channel();
        let address: SocketAddress = "127.0.0.1:6000".parse().unwrap();
        let output = SocketOutput::with_dialer(address, config, DuplexDialer { accepted });
        (Arc::new(output), conns)
    }

    async fn collector(stream: DuplexStream) -> FrameReader<DuplexStream> {
        FrameReader::new(stream, ReaderOptions::default().bidirectional(true))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_periodic_flush_delivers_without_close() {
        let config = OutputConfig::default().flush_timeout(Duration::from_millis(50));
        let (output, mut conns) = socket_output(config);

        let running = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.run_output_loop().await })
        };

        output.output_channel().send(Bytes::from_static(b"live")).await.unwrap();

        let mut reader = collector(conns.recv().await.unwrap()).await;
        let frame = tokio::time::timeout(Duration::from_secs(2), reader.read_frame())
            .await
            .expect("flush task should push the frame out")
            .unwrap();
        assert_eq!(frame.unwrap(), Bytes::from_static(b"live"));
        assert!(output.last_write().await.is_some());

        let closing = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.close().await })
        };
        assert!(reader.read_frame().await.unwrap().is_none());
        closing.await.unwrap();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_flush_replays_backlog() {
        let config = OutputConfig::default().flush_timeout(Duration::from_millis(50));
        let (output, mut conns) = socket_output(config);
        let logger = Arc::new(CollectingLogger::default());
        output.set_logger(logger.clone());

        let running = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.run_output_loop().await })
        };

        output.output_channel().send(Bytes::from_static(b"first")).await.unwrap();

        // First collector completes the handshake, then goes away
        drop(collector(conns.recv().await.unwrap()).await);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(logger.contains("flush failed"));

        output.output_channel().send(Bytes::from_static(b"second")).await.unwrap();

        let closing = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.close().await })
        };

        let mut reader = collector(conns.recv().await.unwrap()).await;
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), Bytes::from_static(b"first"));
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), Bytes::from_static(b"second"));
        assert!(reader.read_frame().await.unwrap().is_none());

        closing.await.unwrap();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_flush_reconnects_without_new_frame() {
        let config = OutputConfig::default()
            .flush_timeout(Duration::from_millis(50))
            .retry_interval(Duration::from_millis(50));
        let (output, mut conns) = socket_output(config);

        let running = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.run_output_loop().await })
        };

        output.output_channel().send(Bytes::from_static(b"only")).await.unwrap();
        drop(collector(conns.recv().await.unwrap()).await);

        let second = tokio::time::timeout(Duration::from_secs(2), conns.recv())
            .await
            .expect("output should re-dial after the failed flush")
            .unwrap();
        let mut reader = collector(second).await;
        let frame = tokio::time::timeout(Duration::from_secs(2), reader.read_frame())
            .await
            .expect("backlog should be replayed")
            .unwrap();
        assert_eq!(frame.unwrap(), Bytes::from_static(b"only"));

        let closing = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.close().await })
        };
        assert!(reader.read_frame().await.unwrap().is_none());
        closing.await.unwrap();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_failure_is_retried() {
        let config = OutputConfig::default()
            .flush_timeout(Duration::from_millis(50))
            .retry_interval(Duration::from_millis(50));
        let (output, mut conns) = socket_output(config);
        let logger = Arc::new(CollectingLogger::default());
        output.set_logger(logger.clone());

        let running = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.run_output_loop().await })
        };

        output.output_channel().send(Bytes::from_static(b"retried")).await.unwrap();

        // First peer hangs up before sending ACCEPT
        drop(conns.recv().await.unwrap());

        let second = tokio::time::timeout(Duration::from_secs(2), conns.recv())
            .await
            .expect("output should re-dial after the failed handshake")
            .unwrap();
        let mut reader = collector(second).await;
        let frame = tokio::time::timeout(Duration::from_secs(2), reader.read_frame())
            .await
            .expect("frame should reach the second peer")
            .unwrap();
        assert_eq!(frame.unwrap(), Bytes::from_static(b"retried"));
        assert!(logger.contains("handshake failed"));

        let closing = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.close().await })
        };
        assert!(reader.read_frame().await.unwrap().is_none());
        closing.await.unwrap();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_frames_dropped() {
        let (output, mut conns) = socket_output(OutputConfig::default());
        let logger = Arc::new(CollectingLogger::default());
        output.set_logger(logger.clone());

        let running = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.run_output_loop().await })
        };

        output.output_channel().send(Bytes::new()).await.unwrap();
        output.output_channel().send(Bytes::from_static(b"kept")).await.unwrap();

        let closing = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.close().await })
        };

        let mut reader = collector(conns.recv().await.unwrap()).await;
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), Bytes::from_static(b"kept"));
        assert!(reader.read_frame().await.unwrap().is_none());

        closing.await.unwrap();
        running.await.unwrap();
        assert!(logger.contains("dropping frame of 0 bytes"));
    }
}
