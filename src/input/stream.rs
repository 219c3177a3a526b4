//! Single-stream input
//!
//! Reads one already-open frame stream: a file written by
//! [`FileOutput`](crate::output::FileOutput) or a connected socket.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::Level;

use super::connection::ConnectionReader;
use super::Input;
use crate::codec::Decoder;
use crate::error::Result;
use crate::framing::ReaderOptions;
use crate::logging::{null_logger, SharedLogger};
use crate::queue::FrameSender;
use crate::signal::Signal;

/// Frame input over one stream
pub struct FrameStreamInput<S> {
    decoder: Mutex<Option<Decoder<S>>>,
    logger: RwLock<SharedLogger>,
    done: Signal,
}

impl<S> FrameStreamInput<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Handshake on `stream` with the dnstap content type
    pub async fn new(stream: S, bidirectional: bool, timeout: Option<Duration>) -> Result<Self> {
        let options = ReaderOptions::default()
            .bidirectional(bidirectional)
            .timeout(timeout);
        Self::with_options(stream, options).await
    }

    pub async fn with_options(stream: S, options: ReaderOptions) -> Result<Self> {
        let decoder = Decoder::new(stream, options).await?;
        Ok(Self {
            decoder: Mutex::new(Some(decoder)),
            logger: RwLock::new(null_logger()),
            done: Signal::new(),
        })
    }

    pub fn set_logger(&self, logger: SharedLogger) {
        *self.logger.write() = logger;
    }
}

impl FrameStreamInput<File> {
    /// Open a unidirectional frame stream file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path).await?;
        Self::new(file, false, None).await
    }
}

#[async_trait]
impl<S> Input for FrameStreamInput<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_into(&self, output: FrameSender) {
        let logger = self.logger.read().clone();
        let decoder = self.decoder.lock().await.take();
        match decoder {
            Some(mut decoder) => {
                let reader = ConnectionReader::new(1, None, logger);
                reader.drain(&mut decoder, &output).await;
            }
            None => logger.log(Level::WARN, format_args!("frame stream already consumed")),
        }
        self.done.fire();
    }

    async fn wait(&self) {
        self.done.wait().await;
    }
}
