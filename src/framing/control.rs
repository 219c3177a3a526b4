//! Frame Streams control frames
//!
//! ```text
//! +-----------+-----------+-----------+--------------------------------+
//! | escape(4) | length(4) | type(4)   | fields...                      |
//! | 0x0000000 | body size | ACCEPT .. | field type(4) len(4) bytes(N)  |
//! +-----------+-----------+-----------+--------------------------------+
//! ```
//!
//! All integers are big-endian. The only field type is CONTENT_TYPE.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{FramingError, Result};

/// Length value that marks a control frame
pub const CONTROL_ESCAPE: u32 = 0;

/// Largest control frame body accepted
pub const MAX_CONTROL_FRAME_SIZE: u32 = 512;

const FIELD_CONTENT_TYPE: u32 = 0x01;

/// Control frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    Accept = 0x01,
    Start = 0x02,
    Stop = 0x03,
    Ready = 0x04,
    Finish = 0x05,
}

impl ControlType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x01 => Some(ControlType::Accept),
            0x02 => Some(ControlType::Start),
            0x03 => Some(ControlType::Stop),
            0x04 => Some(ControlType::Ready),
            0x05 => Some(ControlType::Finish),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlType::Accept => "ACCEPT",
            ControlType::Start => "START",
            ControlType::Stop => "STOP",
            ControlType::Ready => "READY",
            ControlType::Finish => "FINISH",
        }
    }
}

/// A decoded control frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub kind: ControlType,
    pub content_types: Vec<Bytes>,
}

impl ControlFrame {
    /// Control frame without fields
    pub fn new(kind: ControlType) -> Self {
        Self {
            kind,
            content_types: Vec::new(),
        }
    }

    /// Control frame carrying one content type
    pub fn with_content_type(kind: ControlType, content_type: &[u8]) -> Self {
        Self {
            kind,
            content_types: vec![Bytes::copy_from_slice(content_type)],
        }
    }

    /// Size of the body (type + fields), excluding escape and length
    pub fn body_len(&self) -> usize {
        4 + self
            .content_types
            .iter()
            .map(|ct| 8 + ct.len())
            .sum::<usize>()
    }

    /// Append the full wire form (escape, length, body) to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        let body_len = self.body_len();
        buf.reserve(8 + body_len);
        buf.put_u32(CONTROL_ESCAPE);
        buf.put_u32(body_len as u32);
        buf.put_u32(self.kind as u32);
        for ct in &self.content_types {
            buf.put_u32(FIELD_CONTENT_TYPE);
            buf.put_u32(ct.len() as u32);
            buf.put_slice(ct);
        }
    }

    /// Wire form as a standalone buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a control frame body (type + fields)
    pub fn decode(mut body: Bytes) -> std::result::Result<Self, FramingError> {
        if body.remaining() < 4 {
            return Err(FramingError::Malformed("missing control type"));
        }
        let raw_kind = body.get_u32();
        let kind =
            ControlType::from_u32(raw_kind).ok_or(FramingError::UnknownControlType(raw_kind))?;

        let mut content_types = Vec::new();
        while body.has_remaining() {
            if body.remaining() < 8 {
                return Err(FramingError::Malformed("truncated field header"));
            }
            let field = body.get_u32();
            let len = body.get_u32() as usize;
            if field != FIELD_CONTENT_TYPE {
                return Err(FramingError::UnknownFieldType(field));
            }
            if body.remaining() < len {
                return Err(FramingError::Malformed("truncated field"));
            }
            content_types.push(body.split_to(len));
        }

        Ok(Self {
            kind,
            content_types,
        })
    }

    /// Fail unless this frame is of the given type
    pub fn expect(self, kind: ControlType) -> std::result::Result<Self, FramingError> {
        if self.kind == kind {
            Ok(self)
        } else {
            Err(FramingError::UnexpectedControl {
                expected: kind.name(),
                actual: self.kind.name(),
            })
        }
    }

    /// True if `content_type` is listed, or if no content type is listed at all
    pub fn allows(&self, content_type: &[u8]) -> bool {
        self.content_types.is_empty() || self.content_types.iter().any(|ct| ct == content_type)
    }
}

/// Read an escape-prefixed control frame
pub(crate) async fn read_control<R>(reader: &mut R) -> Result<ControlFrame>
where
    R: AsyncRead + Unpin,
{
    let escape = reader.read_u32().await?;
    if escape != CONTROL_ESCAPE {
        return Err(FramingError::ExpectedControl(escape).into());
    }
    read_control_body(reader).await
}

/// Read the length and body of a control frame whose escape was consumed
pub(crate) async fn read_control_body<R>(reader: &mut R) -> Result<ControlFrame>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len > MAX_CONTROL_FRAME_SIZE {
        return Err(FramingError::ControlTooLarge(len).into());
    }
    let mut body = BytesMut::zeroed(len as usize);
    reader.read_exact(&mut body).await?;

    let frame = ControlFrame::decode(body.freeze())?;
    tracing::trace!(kind = frame.kind.name(), "Received control frame");
    Ok(frame)
}
