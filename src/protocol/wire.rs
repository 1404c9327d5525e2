//! Wire framing
//!
//! Every message travels as a 4-byte big-endian length followed by its body.
//! Frames are reassembled from the stream before a body is decoded.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

use super::Message;
use crate::error::OverlayError;

/// Size of the length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Read a length-prefixed frame from the buffer.
/// Returns `None` until the whole frame has arrived.
pub fn read_frame(buf: &mut BytesMut) -> Result<Option<Bytes>> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if length > MAX_FRAME_LEN {
        warn!("Frame of {} bytes exceeds the {} byte limit", length, MAX_FRAME_LEN);
        return Err(OverlayError::decode_error_with_source(
            "Frame too large",
            format!("{} bytes, limit {}", length, MAX_FRAME_LEN),
        )
        .into());
    }

    if buf.len() < LENGTH_PREFIX_LEN + length {
        buf.reserve(LENGTH_PREFIX_LEN + length - buf.len());
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_LEN);
    Ok(Some(buf.split_to(length).freeze()))
}

/// Write a length-prefixed frame to the buffer
pub fn write_frame(buf: &mut BytesMut, body: &[u8]) -> Result<()> {
    if body.len() > MAX_FRAME_LEN {
        return Err(OverlayError::decode_error_with_source(
            "Frame too large",
            format!("{} bytes, limit {}", body.len(), MAX_FRAME_LEN),
        )
        .into());
    }
    buf.reserve(LENGTH_PREFIX_LEN + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    Ok(())
}

/// A byte stream carrying framed messages in both directions
pub struct FramedConnection<S> {
    stream: S,
    read_buf: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedConnection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
        }
    }

    /// Read the next complete message.
    /// Returns `None` when the peer closes the stream between frames.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        loop {
            if let Some(frame) = read_frame(&mut self.read_buf)? {
                trace!("Reassembled frame of {} bytes", frame.len());
                return Message::deserialize(&frame).map(Some);
            }

            let read = self.stream.read_buf(&mut self.read_buf).await.map_err(|e| {
                OverlayError::network_error_full("Failed to read from stream", "peer", e.to_string())
            })?;

            if read == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(OverlayError::decode_error_with_source(
                    "Stream closed mid-frame",
                    format!("{} bytes pending", self.read_buf.len()),
                )
                .into());
            }
        }
    }

    /// Encode, frame and flush a message
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        let body = message.serialize()?;
        let mut frame = BytesMut::new();
        write_frame(&mut frame, &body)?;

        self.stream.write_all(&frame).await.map_err(|e| {
            OverlayError::network_error_full("Failed to write to stream", "peer", e.to_string())
        })?;
        self.stream.flush().await.map_err(|e| {
            OverlayError::network_error_full("Failed to flush stream", "peer", e.to_string())
        })?;
        trace!("Wrote {} message ({} bytes)", message.kind, frame.len());
        Ok(())
    }
}
