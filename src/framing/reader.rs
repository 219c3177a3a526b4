//! Frame Streams reader
//!
//! Performs the reader side of the handshake on construction, then yields
//! data frames until STOP or end of file.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::control::{read_control, read_control_body, ControlFrame, ControlType, CONTROL_ESCAPE};
use super::{with_timeout, ReaderOptions};
use crate::error::{Error, FramingError, Result};

/// Reads data frames from a frame stream
#[derive(Debug)]
pub struct FrameReader<S> {
    stream: BufReader<S>,
    options: ReaderOptions,
    content_type: Option<Bytes>,
    finished: bool,
}

impl<S> FrameReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream` and run the handshake
    ///
    /// The handshake is bounded by `options.timeout`. The stream is only
    /// written to in bidirectional mode.
    pub async fn new(stream: S, options: ReaderOptions) -> Result<Self> {
        let mut reader = Self {
            stream: BufReader::new(stream),
            options,
            content_type: None,
            finished: false,
        };
        let timeout = reader.options.timeout;
        with_timeout(timeout, reader.handshake()).await?;
        Ok(reader)
    }

    async fn handshake(&mut self) -> Result<()> {
        if self.options.bidirectional {
            let ready = read_control(&mut self.stream)
                .await?
                .expect(ControlType::Ready)?;
            let accepted = self.select_content_type(&ready)?;

            let accept = ControlFrame {
                kind: ControlType::Accept,
                content_types: accepted.into_iter().collect(),
            };
            self.send_control(&accept).await?;
        }

        let start = read_control(&mut self.stream)
            .await?
            .expect(ControlType::Start)?;
        if let Some(ref wanted) = self.options.content_type {
            if !start.allows(wanted) {
                return Err(FramingError::ContentTypeMismatch.into());
            }
        }
        self.content_type = start.content_types.into_iter().next();

        tracing::debug!(
            bidirectional = self.options.bidirectional,
            content_type = ?self.content_type,
            "Frame stream started"
        );
        Ok(())
    }

    fn select_content_type(&self, ready: &ControlFrame) -> Result<Option<Bytes>> {
        match self.options.content_type {
            None => Ok(ready.content_types.first().cloned()),
            Some(ref wanted) => {
                if ready.content_types.iter().any(|ct| ct == wanted) {
                    Ok(Some(wanted.clone()))
                } else {
                    Err(FramingError::ContentTypeMismatch.into())
                }
            }
        }
    }

    async fn send_control(&mut self, frame: &ControlFrame) -> Result<()> {
        let wire = frame.to_bytes();
        let stream = self.stream.get_mut();
        stream.write_all(&wire).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read the next data frame
    ///
    /// Returns `Ok(None)` at end of stream (STOP or EOF at a frame boundary).
    /// A frame larger than `max_payload_size` is discarded and reported as
    /// [`Error::FrameTooLarge`]; the next call continues with the following
    /// frame.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }
        if self.stream.fill_buf().await?.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        let len = self.stream.read_u32().await?;
        if len == CONTROL_ESCAPE {
            return self.read_stop().await;
        }

        let max = self.options.max_payload_size;
        if len > max {
            self.discard(len).await?;
            tracing::debug!(size = len, max = max, "Discarded oversized frame");
            return Err(Error::FrameTooLarge { size: len, max });
        }

        let mut buf = BytesMut::zeroed(len as usize);
        self.stream.read_exact(&mut buf).await?;
        Ok(Some(buf.freeze()))
    }

    async fn read_stop(&mut self) -> Result<Option<Bytes>> {
        read_control_body(&mut self.stream)
            .await?
            .expect(ControlType::Stop)?;
        self.finished = true;

        if self.options.bidirectional {
            let finish = ControlFrame::new(ControlType::Finish);
            let timeout = self.options.timeout;
            // The peer may hang up right after STOP; the stream is over either way.
            if let Err(e) = with_timeout(timeout, self.send_control(&finish)).await {
                tracing::debug!(error = %e, "Failed to send FINISH");
            }
        }
        Ok(None)
    }

    async fn discard(&mut self, len: u32) -> Result<()> {
        let mut limited = (&mut self.stream).take(u64::from(len));
        let copied = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        if copied < u64::from(len) {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(())
    }

    /// Content type announced in START, if any
    pub fn content_type(&self) -> Option<&Bytes> {
        self.content_type.as_ref()
    }

    pub fn is_bidirectional(&self) -> bool {
        self.options.bidirectional
    }
}
