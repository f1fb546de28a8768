//
// Copyright 2026 the meshrpc Authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Codec interfaces and frame transport helpers.
//!
//! A [`Codec`] maps a whole [`Message`] to and from bytes inside a frame
//! buffer; a [`PayloadCodec`] maps only the payload. The trans handlers
//! move frames between the connection and the buffers with
//! [`write_frame`] / [`read_frame`], so codecs never touch the socket.

pub mod framed;
pub mod json;

pub use framed::DefaultCodec;
pub use json::JsonPayloadCodec;

use crate::context::Context;
use crate::error::RpcError;
use crate::remote::buffer::{ReaderBuffer, WriterBuffer};
use crate::remote::message::Message;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size accepted on read (16 MB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Encodes and decodes whole messages against frame buffers.
pub trait Codec: Send + Sync {
    /// Stable name of the wire format.
    fn name(&self) -> &'static str;

    /// Encodes `msg` into `out`.
    fn encode(&self, cx: &mut Context, msg: &mut Message, out: &mut WriterBuffer)
        -> Result<(), RpcError>;

    /// Decodes one message from `input` into `msg`.
    fn decode(
        &self,
        cx: &mut Context,
        msg: &mut Message,
        input: &mut ReaderBuffer,
    ) -> Result<(), RpcError>;
}

/// Encodes and decodes only the payload half of a message.
pub trait PayloadCodec: Send + Sync {
    /// Stable name of the payload format.
    fn name(&self) -> &'static str;

    /// Serializes the message's payload.
    fn marshal(&self, msg: &Message) -> Result<Vec<u8>, RpcError>;

    /// Deserializes `payload` into the message.
    fn unmarshal(&self, msg: &mut Message, payload: &[u8]) -> Result<(), RpcError>;
}

/// Writes one length-prefixed frame and flushes.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "frame size {} exceeds maximum {}",
                payload.len(),
                MAX_FRAME_SIZE
            ),
        ));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Reads one length-prefixed frame.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_bytes = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame size {} exceeds maximum {}", len, MAX_FRAME_SIZE),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"hello frame").await.unwrap();
        assert_eq!(&buffer[0..4], &11u32.to_be_bytes());

        let mut reader = &buffer[..];
        let payload = read_frame(&mut reader).await.unwrap();
        assert_eq!(payload, b"hello frame");
    }

    #[tokio::test]
    async fn test_oversize_frame_rejected_on_read() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_be_bytes());
        let mut reader = &buffer[..];
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_frame_errors() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&10u32.to_be_bytes());
        buffer.extend_from_slice(b"short");
        let mut reader = &buffer[..];
        assert!(read_frame(&mut reader).await.is_err());
    }
}
