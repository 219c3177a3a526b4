//! File output
//!
//! Writes a unidirectional frame stream (START, data, STOP) that
//! [`FrameStreamInput::open`](crate::input::FrameStreamInput::open) reads back.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs::File;
use tokio::sync::Mutex;
use tracing::Level;

use super::Output;
use crate::error::Result;
use crate::framing::{FrameWriter, WriterOptions};
use crate::logging::{null_logger, SharedLogger};
use crate::queue::{FrameSender, OutputQueue, OUTPUT_CHANNEL_SIZE};

/// Output writing frames to a file
pub struct FileOutput {
    path: PathBuf,
    queue: OutputQueue,
    writer: Mutex<Option<FrameWriter<File>>>,
    logger: RwLock<SharedLogger>,
}

impl FileOutput {
    /// Create (or truncate) `path` and write the stream header
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        let writer = FrameWriter::new(file, WriterOptions::default()).await?;
        tracing::debug!(path = %path.display(), "File output created");

        Ok(Self {
            path,
            queue: OutputQueue::new(OUTPUT_CHANNEL_SIZE),
            writer: Mutex::new(Some(writer)),
            logger: RwLock::new(null_logger()),
        })
    }

    pub fn set_logger(&self, logger: SharedLogger) {
        *self.logger.write() = logger;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn log(&self, level: Level, args: std::fmt::Arguments<'_>) {
        self.logger.read().log(level, args);
    }
}

#[async_trait]
impl Output for FileOutput {
    fn output_channel(&self) -> FrameSender {
        self.queue.sender()
    }

    async fn run_output_loop(&self) {
        let reader = self.queue.take_reader();
        let writer = self.writer.lock().await.take();
        let (mut reader, mut writer) = match (reader, writer) {
            (Some(reader), Some(writer)) => (reader, writer),
            _ => {
                self.log(
                    Level::WARN,
                    format_args!("{}: output loop already started", self.path.display()),
                );
                return;
            }
        };

        while let Some(frame) = reader.recv().await {
            if let Err(e) = writer.write(&frame).await {
                self.log(
                    Level::WARN,
                    format_args!("{}: write failed: {}", self.path.display(), e),
                );
                continue;
            }
            if reader.is_empty() {
                if let Err(e) = writer.flush().await {
                    self.log(
                        Level::WARN,
                        format_args!("{}: flush failed: {}", self.path.display(), e),
                    );
                }
            }
        }

        if let Err(e) = writer.close().await {
            self.log(
                Level::WARN,
                format_args!("{}: close failed: {}", self.path.display(), e),
            );
        }
        self.queue.mark_done();
    }

    async fn close(&self) {
        self.queue.close().await;
    }
}
