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

//! The message container moved through the pipeline.

use crate::error::RpcError;
use std::collections::HashMap;
use std::io;

/// What kind of message is on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    /// A request expecting a reply.
    Call,
    /// A successful reply.
    Reply,
    /// An error reply; the payload carries the message.
    Exception,
    /// A request expecting no reply.
    Oneway,
}

impl MessageType {
    /// Wire encoding of the type.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::Call => 1,
            MessageType::Reply => 2,
            MessageType::Exception => 3,
            MessageType::Oneway => 4,
        }
    }

    /// Parses the wire encoding.
    pub fn from_u8(v: u8) -> Result<Self, RpcError> {
        match v {
            1 => Ok(MessageType::Call),
            2 => Ok(MessageType::Reply),
            3 => Ok(MessageType::Exception),
            4 => Ok(MessageType::Oneway),
            other => Err(RpcError::decode(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown message type {}", other),
            ))),
        }
    }
}

/// Which side of the wire this process is on for a given message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcRole {
    /// We sent the request.
    Client,
    /// We received the request.
    Server,
}

/// Message payload in one of its representations.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Payload {
    /// No payload yet.
    #[default]
    Empty,
    /// A structured value, used by the generic codec.
    Json(serde_json::Value),
    /// Raw bytes, used by pass-through codecs.
    Blob(Vec<u8>),
}

/// One request or reply moving through the pipeline, together with the
/// transport metadata attached by meta handlers.
#[derive(Clone, Debug)]
pub struct Message {
    role: RpcRole,
    msg_type: MessageType,
    method: String,
    seq_id: u32,
    payload: Payload,
    trans_info: HashMap<String, String>,
}

impl Message {
    /// Creates a message.
    pub fn new(role: RpcRole, msg_type: MessageType) -> Self {
        Self {
            role,
            msg_type,
            method: String::new(),
            seq_id: 0,
            payload: Payload::Empty,
            trans_info: HashMap::new(),
        }
    }

    /// A client-side request for `method`.
    pub fn new_call(method: impl Into<String>) -> Self {
        let mut msg = Self::new(RpcRole::Client, MessageType::Call);
        msg.method = method.into();
        msg
    }

    /// An empty client-side reply slot to decode into.
    pub fn new_reply() -> Self {
        Self::new(RpcRole::Client, MessageType::Reply)
    }

    /// The local role for this message.
    pub fn role(&self) -> RpcRole {
        self.role
    }

    /// The message type.
    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    /// Sets the message type (used during decode).
    pub fn set_msg_type(&mut self, t: MessageType) {
        self.msg_type = t;
    }

    /// The method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Sets the method name (used during decode).
    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    /// The correlation sequence id.
    pub fn seq_id(&self) -> u32 {
        self.seq_id
    }

    /// Stamps the correlation sequence id.
    pub fn set_seq_id(&mut self, seq_id: u32) {
        self.seq_id = seq_id;
    }

    /// The payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Replaces the payload.
    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    /// Reads one transport metadata entry.
    pub fn trans(&self, key: &str) -> Option<&str> {
        self.trans_info.get(key).map(String::as_str)
    }

    /// Sets one transport metadata entry.
    pub fn set_trans(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.trans_info.insert(key.into(), value.into());
    }

    /// All transport metadata entries.
    pub fn trans_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.trans_info
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// For an exception message: the error text carried in the payload.
    pub fn exception_message(&self) -> String {
        match &self.payload {
            Payload::Json(serde_json::Value::String(s)) => s.clone(),
            Payload::Json(v) => v.to_string(),
            Payload::Blob(b) => String::from_utf8_lossy(b).into_owned(),
            Payload::Empty => String::from("unknown remote error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for t in [
            MessageType::Call,
            MessageType::Reply,
            MessageType::Exception,
            MessageType::Oneway,
        ] {
            assert_eq!(MessageType::from_u8(t.as_u8()).unwrap(), t);
        }
        assert!(MessageType::from_u8(0).is_err());
    }

    #[test]
    fn test_new_call_defaults() {
        let msg = Message::new_call("Echo");
        assert_eq!(msg.role(), RpcRole::Client);
        assert_eq!(msg.msg_type(), MessageType::Call);
        assert_eq!(msg.method(), "Echo");
        assert_eq!(*msg.payload(), Payload::Empty);
    }

    #[test]
    fn test_exception_message_variants() {
        let mut msg = Message::new_reply();
        msg.set_payload(Payload::Json(serde_json::Value::String("boom".into())));
        assert_eq!(msg.exception_message(), "boom");

        msg.set_payload(Payload::Blob(b"raw boom".to_vec()));
        assert_eq!(msg.exception_message(), "raw boom");
    }
}
