//! Frame Streams writer
//!
//! Data frames are appended to an in-memory buffer and written to the stream
//! when the buffer reaches `buffer_size` or on an explicit [`FrameWriter::flush`].

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::control::{read_control, ControlFrame, ControlType};
use super::{with_timeout, WriterOptions};
use crate::error::{Error, FramingError, Result};

/// Writes data frames to a frame stream
#[derive(Debug)]
pub struct FrameWriter<S> {
    stream: S,
    options: WriterOptions,
    buffer: BytesMut,
}

impl<S> FrameWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream` and run the writer side of the handshake
    ///
    /// Bidirectional: READY, wait for ACCEPT naming our content type, START.
    /// Unidirectional: START only.
    pub async fn new(stream: S, options: WriterOptions) -> Result<Self> {
        let mut writer = Self {
            buffer: BytesMut::with_capacity(options.buffer_size),
            stream,
            options,
        };
        let timeout = writer.options.timeout;
        with_timeout(timeout, writer.handshake()).await?;
        Ok(writer)
    }

    async fn handshake(&mut self) -> Result<()> {
        let content_type = self.options.content_type.clone();

        if self.options.bidirectional {
            let ready = ControlFrame::with_content_type(ControlType::Ready, &content_type);
            self.send_control(&ready).await?;

            let accept = read_control(&mut self.stream)
                .await?
                .expect(ControlType::Accept)?;
            if !accept.content_types.iter().any(|ct| *ct == content_type) {
                return Err(FramingError::ContentTypeMismatch.into());
            }
        }

        let start = ControlFrame::with_content_type(ControlType::Start, &content_type);
        self.send_control(&start).await?;

        tracing::debug!(
            bidirectional = self.options.bidirectional,
            "Frame stream writer started"
        );
        Ok(())
    }

    async fn send_control(&mut self, frame: &ControlFrame) -> Result<()> {
        let wire = frame.to_bytes();
        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Append one data frame
    ///
    /// The frame goes to the stream once the buffer fills; call
    /// [`flush`](Self::flush) to push it out sooner. Empty frames would be
    /// read back as a control escape and are rejected.
    pub async fn write(&mut self, frame: &[u8]) -> Result<()> {
        if frame.is_empty() {
            return Err(Error::InvalidPayload("empty data frame".into()));
        }
        let len = u32::try_from(frame.len())
            .map_err(|_| Error::InvalidPayload(format!("frame of {} bytes", frame.len())))?;

        self.buffer.reserve(4 + frame.len());
        self.buffer.put_u32(len);
        self.buffer.put_slice(frame);

        if self.buffer.len() >= self.options.buffer_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Bytes appended but not yet written to the stream
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Write out buffered frames
    ///
    /// The buffer is kept on failure.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let timeout = self.options.timeout;
        let stream = &mut self.stream;
        let buffer = &self.buffer;
        with_timeout(timeout, async {
            stream.write_all(buffer).await?;
            stream.flush().await
        })
        .await
        .map_err(Error::Io)?;

        tracing::trace!(bytes = self.buffer.len(), "Flushed frame buffer");
        self.buffer.clear();
        Ok(())
    }

    /// Flush, send STOP, wait for FINISH when bidirectional, and shut down
    pub async fn close(mut self) -> Result<()> {
        self.flush().await?;

        let timeout = self.options.timeout;
        let bidirectional = self.options.bidirectional;
        with_timeout(timeout, async {
            self.send_control(&ControlFrame::new(ControlType::Stop)).await?;
            if bidirectional {
                read_control(&mut self.stream)
                    .await?
                    .expect(ControlType::Finish)?;
            }
            self.stream.shutdown().await?;
            Ok::<(), Error>(())
        })
        .await
    }
}
