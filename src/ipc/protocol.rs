//! Framing: `[u32 little-endian length][JSON IpcMessage]`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::IpcError;
use crate::ipc::messages::IpcMessage;

pub const LENGTH_PREFIX_SIZE: usize = 4;
/// Frames of this many bytes or more are rejected.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

fn check_length(length: usize) -> Result<(), IpcError> {
    if length == 0 || length >= MAX_MESSAGE_SIZE {
        return Err(IpcError::MalformedFrame(format!("invalid frame length {length}")));
    }
    Ok(())
}

/// Length-prefixed encoding of `message`.
pub fn encode_message(message: &IpcMessage) -> Result<Vec<u8>, IpcError> {
    let body = serde_json::to_vec(message).map_err(|e| IpcError::Encode(e.to_string()))?;
    check_length(body.len())?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    // bounded by MAX_MESSAGE_SIZE
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode one frame from the front of `data`.
///
/// Returns the message and the number of bytes consumed, or `None` if `data`
/// does not yet hold a complete frame.
pub fn decode_message(data: &[u8]) -> Result<Option<(IpcMessage, usize)>, IpcError> {
    let Some(prefix) = data.get(..LENGTH_PREFIX_SIZE) else {
        return Ok(None);
    };
    let mut length = [0u8; LENGTH_PREFIX_SIZE];
    length.copy_from_slice(prefix);
    let length = u32::from_le_bytes(length) as usize;
    check_length(length)?;
    let Some(body) = data.get(LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + length) else {
        return Ok(None);
    };
    let message = serde_json::from_slice(body)?;
    Ok(Some((message, LENGTH_PREFIX_SIZE + length)))
}

pub async fn write_message<W>(writer: &mut W, message: &IpcMessage) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_message(message)?;
    trace!(kind = ?message.kind, request_id = message.request_id, bytes = frame.len(), "ipc write");
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Next message, or `None` on a clean end of stream before a frame starts.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<IpcMessage>, IpcError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(IpcError::ConnectionClosed)
            };
        }
        filled += n;
    }
    let length = u32::from_le_bytes(prefix) as usize;
    check_length(length)?;

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => IpcError::ConnectionClosed,
        _ => IpcError::Io(e),
    })?;
    let message: IpcMessage = serde_json::from_slice(&body)?;
    trace!(kind = ?message.kind, request_id = message.request_id, bytes = length, "ipc read");
    Ok(Some(message))
}
