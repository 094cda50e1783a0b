//! Length-prefixed JSON framing.
//!
//! Every message on a Rondo connection is a 4-byte big-endian payload length
//! followed by exactly that many bytes of UTF-8 JSON. A message therefore
//! never depends on how the transport happens to split reads.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted payload, header excluded.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;
pub const FRAME_HEADER_BYTES: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame length cannot be zero")]
    ZeroLength,
    #[error("frame length {length} exceeds max {limit}")]
    TooLarge { length: usize, limit: usize },
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid worker id {0:?}")]
    InvalidWorkerId(String),
}

/// Serialize `msg` into a complete frame (header + payload).
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Bytes, WireError> {
    let payload = serde_json::to_vec(msg)?;
    if payload.is_empty() {
        return Err(WireError::ZeroLength);
    }
    if payload.len() > MAX_FRAME_BYTES {
        return Err(WireError::TooLarge {
            length: payload.len(),
            limit: MAX_FRAME_BYTES,
        });
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_BYTES + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

/// Decode a frame payload (header already stripped).
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, WireError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Read one frame. Returns `Ok(None)` when the peer closed the connection
/// before sending a header.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<Option<T>, WireError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_BYTES];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_be_bytes(header) as usize;
    if length == 0 {
        return Err(WireError::ZeroLength);
    }
    if length > MAX_FRAME_BYTES {
        return Err(WireError::TooLarge {
            length,
            limit: MAX_FRAME_BYTES,
        });
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    decode_payload(&payload).map(Some)
}

/// Encode and write one frame, flushing afterwards.
pub async fn write_frame<T, W>(writer: &mut W, msg: &T) -> Result<(), WireError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
