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

//! Generic JSON payload codec.
//!
//! Calls can be made without generated stubs: payloads are
//! `serde_json::Value`s, so any serde-representable request travels as-is.
//! Blob payloads pass through untouched for codecs layered on top.

use crate::codec::PayloadCodec;
use crate::error::RpcError;
use crate::remote::message::{Message, Payload};

/// Reflection-style payload codec over `serde_json::Value`.
#[derive(Debug, Default)]
pub struct JsonPayloadCodec;

impl PayloadCodec for JsonPayloadCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn marshal(&self, msg: &Message) -> Result<Vec<u8>, RpcError> {
        match msg.payload() {
            Payload::Empty => Ok(b"null".to_vec()),
            Payload::Json(value) => serde_json::to_vec(value).map_err(RpcError::encode),
            Payload::Blob(bytes) => Ok(bytes.clone()),
        }
    }

    fn unmarshal(&self, msg: &mut Message, payload: &[u8]) -> Result<(), RpcError> {
        let value: serde_json::Value = serde_json::from_slice(payload).map_err(RpcError::decode)?;
        msg.set_payload(Payload::Json(value));
        Ok(())
    }
}
