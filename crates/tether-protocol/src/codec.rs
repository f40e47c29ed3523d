//! Length-prefixed postcard framing and payload marshalling.
//!
//! Frames carry the handshake and RPC envelopes; inner call payloads are
//! marshalled separately with [`marshal`] / [`unmarshal`] so the envelope
//! can move opaque bytes without knowing the caller's types.

use crate::error::{ProtocolError, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16 MiB). Inbound length prefixes beyond this are
/// rejected before any allocation happens.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Write one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let payload = postcard::to_allocvec(value)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(postcard::from_bytes(&payload)?)
}

/// Marshal an inner call payload to bytes.
pub fn marshal<T>(value: &T) -> Result<Bytes>
where
    T: Serialize + ?Sized,
{
    Ok(Bytes::from(postcard::to_allocvec(value)?))
}

/// Unmarshal an inner call payload from bytes.
pub fn unmarshal<T>(bytes: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    Ok(postcard::from_bytes(bytes)?)
}
