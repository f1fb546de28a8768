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

//! Byte buffers the codec reads from and writes into.
//!
//! Codecs never touch the socket: the trans handler moves whole frames
//! between the connection and these buffers, so codec code stays
//! synchronous and testable against literal byte slices.

use crate::error::RpcError;
use std::io;

fn short_read(wanted: usize, have: usize) -> RpcError {
    RpcError::decode(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("need {} bytes, {} readable", wanted, have),
    ))
}

/// A read cursor over one received frame.
#[derive(Debug, Default)]
pub struct ReaderBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl ReaderBuffer {
    /// Wraps a frame.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read.
    pub fn readable_len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns the next `n` bytes without consuming them.
    pub fn peek(&self, n: usize) -> Result<&[u8], RpcError> {
        if self.readable_len() < n {
            return Err(short_read(n, self.readable_len()));
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Consumes and returns the next `n` bytes.
    pub fn next(&mut self, n: usize) -> Result<&[u8], RpcError> {
        if self.readable_len() < n {
            return Err(short_read(n, self.readable_len()));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Consumes the next `n` bytes into an owned vector.
    pub fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, RpcError> {
        Ok(self.next(n)?.to_vec())
    }

    /// Skips `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), RpcError> {
        if self.readable_len() < n {
            return Err(short_read(n, self.readable_len()));
        }
        self.pos += n;
        Ok(())
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, RpcError> {
        Ok(self.next(1)?[0])
    }

    /// Reads a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, RpcError> {
        let b = self.next(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, RpcError> {
        let b = self.next(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// An append-only buffer one outgoing frame is encoded into.
#[derive(Debug, Default)]
pub struct WriterBuffer {
    data: Vec<u8>,
}

impl WriterBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    /// Appends a big-endian u16.
    pub fn write_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a big-endian u32.
    pub fn write_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The encoded frame.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer, yielding the frame.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
