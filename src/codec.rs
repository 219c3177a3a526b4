//! Message codec over frame streams
//!
//! [`Decoder`] turns a frame stream into messages and skips data frames that
//! exceed the payload limit. [`Encoder`] writes messages as data frames.
//! Payloads are opaque here; [`Message`] is the hook for typed records.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::framing::{FrameReader, FrameWriter, ReaderOptions, WriterOptions};

/// A record carried in one data frame
pub trait Message: Sized {
    fn from_frame(frame: Bytes) -> Result<Self>;
    fn to_frame(&self) -> Bytes;
}

impl Message for Bytes {
    fn from_frame(frame: Bytes) -> Result<Self> {
        Ok(frame)
    }

    fn to_frame(&self) -> Bytes {
        self.clone()
    }
}

impl Message for Vec<u8> {
    fn from_frame(frame: Bytes) -> Result<Self> {
        Ok(frame.to_vec())
    }

    fn to_frame(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

/// Reads messages from a frame stream
#[derive(Debug)]
pub struct Decoder<S> {
    reader: FrameReader<S>,
    skipped: u64,
}

impl<S> Decoder<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the reader handshake on `stream`
    pub async fn new(stream: S, options: ReaderOptions) -> Result<Self> {
        Ok(Self {
            reader: FrameReader::new(stream, options).await?,
            skipped: 0,
        })
    }

    /// Next data frame; `Ok(None)` at end of stream
    ///
    /// Oversized frames are counted and skipped, never returned.
    pub async fn decode_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.reader.read_frame().await {
                Err(e) if e.is_too_large() => {
                    self.skipped += 1;
                    tracing::debug!(error = %e, skipped = self.skipped, "Skipping data frame");
                }
                other => return other,
            }
        }
    }

    /// Next message; `Ok(None)` at end of stream
    pub async fn decode<M: Message>(&mut self) -> Result<Option<M>> {
        match self.decode_frame().await? {
            Some(frame) => M::from_frame(frame).map(Some),
            None => Ok(None),
        }
    }

    /// Number of oversized frames skipped so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Writes messages to a frame stream
#[derive(Debug)]
pub struct Encoder<S> {
    writer: FrameWriter<S>,
}

impl<S> Encoder<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the writer handshake on `stream`
    pub async fn new(stream: S, options: WriterOptions) -> Result<Self> {
        Ok(Self {
            writer: FrameWriter::new(stream, options).await?,
        })
    }

    /// Buffer one message as a data frame
    pub async fn encode<M: Message>(&mut self, message: &M) -> Result<()> {
        self.writer.write(&message.to_frame()).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await
    }

    pub fn buffered(&self) -> usize {
        self.writer.buffered()
    }

    /// Flush and end the stream
    pub async fn close(self) -> Result<()> {
        self.writer.close().await
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;
    use crate::error::Error;

    /// Toy message type with a one-byte tag
    #[derive(Debug, PartialEq)]
    struct Tagged(u8, Vec<u8>);

    impl Message for Tagged {
        fn from_frame(frame: Bytes) -> Result<Self> {
            match frame.split_first() {
                Some((tag, rest)) => Ok(Tagged(*tag, rest.to_vec())),
                None => Err(Error::InvalidPayload("missing tag".into())),
            }
        }

        fn to_frame(&self) -> Bytes {
            let mut out = vec![self.0];
            out.extend_from_slice(&self.1);
            Bytes::from(out)
        }
    }

    #[tokio::test]
    async fn test_typed_messages() {
        let (client, server) = duplex(64 * 1024);

        let writer = tokio::spawn(async move {
            let mut encoder = Encoder::new(client, WriterOptions::default()).await.unwrap();
            encoder.encode(&Tagged(1, b"query".to_vec())).await.unwrap();
            encoder.encode(&Tagged(2, b"response".to_vec())).await.unwrap();
            encoder.close().await.unwrap();
        });

        let mut decoder = Decoder::new(server, ReaderOptions::default()).await.unwrap();
        assert_eq!(
            decoder.decode::<Tagged>().await.unwrap(),
            Some(Tagged(1, b"query".to_vec()))
        );
        assert_eq!(
            decoder.decode::<Tagged>().await.unwrap(),
            Some(Tagged(2, b"response".to_vec()))
        );
        assert_eq!(decoder.decode::<Tagged>().await.unwrap(), None);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frames_skipped() {
        let (client, server) = duplex(64 * 1024);

        let writer = tokio::spawn(async move {
            let mut encoder = Encoder::new(client, WriterOptions::default()).await.unwrap();
            encoder.encode(&Bytes::from(vec![1u8; 200])).await.unwrap();
            encoder.encode(&Bytes::from_static(b"small")).await.unwrap();
            encoder.encode(&Bytes::from(vec![2u8; 300])).await.unwrap();
            encoder.encode(&b"tail".to_vec()).await.unwrap();
            encoder.close().await.unwrap();
        });

        let options = ReaderOptions::default().max_payload_size(100);
        let mut decoder = Decoder::new(server, options).await.unwrap();

        assert_eq!(decoder.decode_frame().await.unwrap().unwrap(), Bytes::from_static(b"small"));
        assert_eq!(decoder.decode::<Vec<u8>>().await.unwrap().unwrap(), b"tail".to_vec());
        assert!(decoder.decode_frame().await.unwrap().is_none());
        assert_eq!(decoder.skipped(), 2);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_encode_error_is_returned() {
        let (client, _server) = duplex(1024);
        let mut encoder = Encoder::new(client, WriterOptions::default()).await.unwrap();

        let err = encoder.encode(&Bytes::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
        assert_eq!(encoder.buffered(), 0);
    }
}
