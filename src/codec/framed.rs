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

//! The default message codec.
//!
//! Frame body layout, all integers big-endian:
//!
//! ```text
//! +--------+------+------------+--------+-------------------+---------+
//! | seq u32|type u8|mlen u16    | method | n u16, n kv pairs | payload |
//! +--------+------+------------+--------+-------------------+---------+
//! ```
//!
//! Each kv pair is `klen u16, key, vlen u16, value`. The payload encoding
//! is delegated to a [`PayloadCodec`].

use crate::codec::{Codec, PayloadCodec};
use crate::context::Context;
use crate::error::RpcError;
use crate::remote::buffer::{ReaderBuffer, WriterBuffer};
use crate::remote::message::{Message, MessageType};
use std::io;
use std::sync::Arc;

fn field_error(detail: &str) -> RpcError {
    RpcError::encode(io::Error::new(io::ErrorKind::InvalidInput, detail.to_string()))
}

/// Default codec: compact header plus a pluggable payload codec.
pub struct DefaultCodec {
    payload: Arc<dyn PayloadCodec>,
}

impl DefaultCodec {
    /// Wraps a payload codec.
    pub fn new(payload: Arc<dyn PayloadCodec>) -> Self {
        Self { payload }
    }
}

impl Codec for DefaultCodec {
    fn name(&self) -> &'static str {
        "framed"
    }

    fn encode(
        &self,
        _cx: &mut Context,
        msg: &mut Message,
        out: &mut WriterBuffer,
    ) -> Result<(), RpcError> {
        out.write_u32(msg.seq_id());
        out.write_u8(msg.msg_type().as_u8());

        let method = msg.method().as_bytes();
        if method.len() > u16::MAX as usize {
            return Err(field_error("method name too long"));
        }
        out.write_u16(method.len() as u16);
        out.write_bytes(method);

        let entries: Vec<(String, String)> = msg
            .trans_entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if entries.len() > u16::MAX as usize {
            return Err(field_error("too many transport metadata entries"));
        }
        out.write_u16(entries.len() as u16);
        for (key, value) in entries {
            if key.len() > u16::MAX as usize || value.len() > u16::MAX as usize {
                return Err(field_error("transport metadata entry too long"));
            }
            out.write_u16(key.len() as u16);
            out.write_bytes(key.as_bytes());
            out.write_u16(value.len() as u16);
            out.write_bytes(value.as_bytes());
        }

        let payload = self.payload.marshal(msg)?;
        out.write_bytes(&payload);
        Ok(())
    }

    fn decode(
        &self,
        _cx: &mut Context,
        msg: &mut Message,
        input: &mut ReaderBuffer,
    ) -> Result<(), RpcError> {
        msg.set_seq_id(input.read_u32()?);
        msg.set_msg_type(MessageType::from_u8(input.read_u8()?)?);

        let method_len = input.read_u16()? as usize;
        let method = String::from_utf8(input.read_binary(method_len)?).map_err(RpcError::decode)?;
        msg.set_method(method);

        let n_entries = input.read_u16()?;
        for _ in 0..n_entries {
            let key_len = input.read_u16()? as usize;
            let key = String::from_utf8(input.read_binary(key_len)?).map_err(RpcError::decode)?;
            let value_len = input.read_u16()? as usize;
            let value =
                String::from_utf8(input.read_binary(value_len)?).map_err(RpcError::decode)?;
            msg.set_trans(key, value);
        }

        let payload = input.read_binary(input.readable_len())?;
        self.payload.unmarshal(msg, &payload)
    }
}
