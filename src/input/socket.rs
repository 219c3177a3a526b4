//! Multiplexed socket input
//!
//! Accepts producer connections on one listener and reads every connection
//! concurrently into a single sink queue.
//!
//! ```text
//!             accept loop
//!                 │
//!     ┌───────────┼───────────┐
//!     ▼           ▼           ▼
//!  worker 1    worker 2    worker N     (one task per connection,
//!     │           │           │          registered by id)
//!     └───────────┴─────┬─────┘
//!                       ▼
//!                   sink queue
//! ```
//!
//! Shutdown: `close()` stops the accept loop, which then force-closes every
//! registered connection, joins the workers, and signals `wait()`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::Level;

use super::config::InputConfig;
use super::connection::ConnectionReader;
use super::registry::ConnectionRegistry;
use super::Input;
use crate::error::Result;
use crate::logging::{null_logger, SharedLogger};
use crate::net::{Connection, Listener, SocketAddress};
use crate::queue::FrameSender;
use crate::signal::Signal;

/// Frame input serving many producer connections on one listener
pub struct SocketInput {
    listener: Mutex<Option<Listener>>,
    local_addr: Option<SocketAddress>,
    settings: RwLock<InputConfig>,
    logger: RwLock<SharedLogger>,
    registry: Arc<ConnectionRegistry>,
    next_id: AtomicU64,
    shutdown: Signal,
    done: Signal,
}

impl SocketInput {
    /// Create an input over an already bound listener
    pub fn new(listener: Listener) -> Self {
        Self::with_config(listener, InputConfig::default())
    }

    /// Create an input with custom per-connection settings
    pub fn with_config(listener: Listener, config: InputConfig) -> Self {
        Self {
            local_addr: listener.local_addr().ok(),
            listener: Mutex::new(Some(listener)),
            settings: RwLock::new(config),
            logger: RwLock::new(null_logger()),
            registry: Arc::new(ConnectionRegistry::new()),
            next_id: AtomicU64::new(1),
            shutdown: Signal::new(),
            done: Signal::new(),
        }
    }

    /// Bind a listener on `address`
    pub async fn bind(address: &SocketAddress) -> Result<Self> {
        let listener = Listener::bind(address).await?;
        tracing::debug!(addr = %address, "Socket input listening");
        Ok(Self::new(listener))
    }

    /// Bind a unix-domain listener, replacing any file at `path`
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind(&SocketAddress::Unix(path.as_ref().to_path_buf())).await
    }

    /// Handshake timeout for connections accepted from now on
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.settings.write().timeout = timeout;
    }

    /// Payload limit for connections accepted from now on
    pub fn set_max_payload_size(&self, size: u32) {
        self.settings.write().max_payload_size = size;
    }

    pub fn set_logger(&self, logger: SharedLogger) {
        *self.logger.write() = logger;
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Option<&SocketAddress> {
        self.local_addr.as_ref()
    }

    /// Number of connections currently open
    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    /// Stop accepting connections
    ///
    /// Returns immediately; use [`Input::wait`] to wait for the connections
    /// to be torn down.
    pub fn close(&self) {
        // Not yet running: release the listener now
        let idle = self.listener.lock().take();
        if idle.is_some() {
            drop(idle);
            self.release_socket_file();
        }
        self.shutdown.fire();
    }

    fn log(&self, level: Level, args: std::fmt::Arguments<'_>) {
        self.logger.read().log(level, args);
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<()>,
        conn: Connection,
        peer: Option<std::net::SocketAddr>,
        sink: &FrameSender,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let closed = self.registry.insert(id, peer);

        let logger = self.logger.read().clone();
        let options = self.settings.read().reader_options();
        let reader = ConnectionReader::new(id, peer, Arc::clone(&logger));
        let registry = Arc::clone(&self.registry);
        let sink = sink.clone();
        let addr = self.addr_label();

        logger.log(
            Level::INFO,
            format_args!("{}: accepted connection {}{}", addr, id, reader.origin()),
        );

        workers.spawn(async move {
            tokio::select! {
                _ = closed => {}
                _ = reader.run(conn, options, &sink) => {}
            }
            registry.remove(id);
            logger.log(
                Level::INFO,
                format_args!("{}: closed connection {}{}", addr, id, reader.origin()),
            );
        });
    }

    fn addr_label(&self) -> String {
        match self.local_addr {
            Some(ref addr) => addr.to_string(),
            None => "listener".to_string(),
        }
    }

    fn release_socket_file(&self) {
        if let Some(SocketAddress::Unix(ref path)) = self.local_addr {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    self.log(
                        Level::DEBUG,
                        format_args!("{}: remove socket file failed: {}", path.display(), e),
                    );
                }
            }
        }
    }
}

#[async_trait]
impl Input for SocketInput {
    async fn read_into(&self, output: FrameSender) {
        let listener = self.listener.lock().take();
        let listener = match listener {
            Some(listener) => listener,
            None => {
                self.log(
                    Level::WARN,
                    format_args!("{}: listener already closed or in use", self.addr_label()),
                );
                self.done.fire();
                return;
            }
        };

        let mut workers = JoinSet::new();
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        self.log(Level::ERROR, format_args!("connection worker failed: {}", e));
                    }
                    continue;
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((conn, peer)) => self.spawn_worker(&mut workers, conn, peer, &output),
                Err(e) => {
                    self.log(
                        Level::WARN,
                        format_args!("{}: accept failed: {}", self.addr_label(), e),
                    );
                }
            }
        }

        drop(listener);
        self.release_socket_file();

        let open = self.registry.close_all();
        self.log(
            Level::INFO,
            format_args!(
                "listener has been closed, closing all {} active connections",
                open
            ),
        );

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                self.log(Level::ERROR, format_args!("connection worker failed: {}", e));
            }
        }
        self.done.fire();
    }

    async fn wait(&self) {
        self.done.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::framing::{FrameWriter, WriterOptions};
    use crate::logging::test_support::CollectingLogger;
    use crate::queue::channel;

    async fn tcp_input() -> Arc<SocketInput> {
        let input = SocketInput::bind(&"127.0.0.1:0".parse().unwrap()).await.unwrap();
        Arc::new(input)
    }

    #[tokio::test]
    async fn test_single_tcp_producer() {
        let input = tcp_input().await;
        let addr = input.local_addr().unwrap().clone();
        let (tx, mut rx) = channel(8);

        let running = {
            let input = Arc::clone(&input);
            tokio::spawn(async move { input.read_into(tx).await })
        };

        let conn = Connection::connect(&addr).await.unwrap();
        let options = WriterOptions::default().bidirectional(true);
        let mut writer = FrameWriter::new(conn, options).await.unwrap();
        writer.write(b"query").await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"query"));

        input.close();
        input.wait().await;
        running.await.unwrap();
        assert_eq!(input.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_handshake_failure_is_isolated() {
        let input = tcp_input().await;
        let logger = Arc::new(CollectingLogger::default());
        input.set_logger(logger.clone());
        input.set_timeout(Some(Duration::from_millis(50)));
        let addr = input.local_addr().unwrap().clone();
        let (tx, mut rx) = channel(8);

        let running = {
            let input = Arc::clone(&input);
            tokio::spawn(async move { input.read_into(tx).await })
        };

        // Silent peer: times out in the handshake
        let _silent = Connection::connect(&addr).await.unwrap();

        let conn = Connection::connect(&addr).await.unwrap();
        let mut writer = FrameWriter::new(conn, WriterOptions::default().bidirectional(true))
            .await
            .unwrap();
        writer.write(b"ok").await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"ok"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(logger.contains("connection 1: open input"));

        input.close();
        input.wait().await;
        running.await.unwrap();
        assert!(logger.contains("closing all"));
    }

    #[tokio::test]
    async fn test_close_before_read_into() {
        let input = tcp_input().await;
        let addr = input.local_addr().unwrap().clone();
        input.close();

        assert!(Connection::connect(&addr).await.is_err());

        let (tx, _rx) = channel(1);
        input.read_into(tx).await;
        input.wait().await;
    }
}
