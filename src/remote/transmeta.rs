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

//! Meta handlers: attaching and stripping transport-level metadata.
//!
//! [`TransMetaHandler`] is the bound handler that runs the configured
//! [`MetaHandler`]s before encode and after decode. On the server side,
//! after a successful read it additionally publishes the peer's method
//! name on the context and applies the metainfo transfer-forward step, so
//! transient values survive exactly one network boundary.

use crate::context::{Context, CTX_KEY_METHOD};
use crate::error::RpcError;
use crate::remote::message::{Message, MessageType, RpcRole};
use crate::remote::pipeline::BoundHandler;
use async_trait::async_trait;
use std::sync::Arc;

/// Wire prefix for transient metainfo entries.
const TRANSIENT_PREFIX: &str = "t:";
/// Wire prefix for persistent metainfo entries.
const PERSISTENT_PREFIX: &str = "p:";

/// Reads or writes transport-level metadata for one message.
#[async_trait]
pub trait MetaHandler: Send + Sync {
    /// Attaches metadata before encode.
    async fn write_meta(&self, cx: &mut Context, msg: &mut Message) -> Result<(), RpcError>;

    /// Strips metadata after decode.
    async fn read_meta(&self, cx: &mut Context, msg: &mut Message) -> Result<(), RpcError>;
}

/// The default meta handler: moves [`MetaInfo`](crate::metainfo::MetaInfo)
/// values between the context and the message's transport metadata.
///
/// Only transient and persistent values are written outbound;
/// transient-upstream values already crossed their one allowed hop.
#[derive(Debug, Default)]
pub struct MetainfoMetaHandler;

#[async_trait]
impl MetaHandler for MetainfoMetaHandler {
    async fn write_meta(&self, cx: &mut Context, msg: &mut Message) -> Result<(), RpcError> {
        let pairs: Vec<(String, String)> = cx
            .metainfo()
            .transient_entries()
            .map(|(k, v)| (format!("{}{}", TRANSIENT_PREFIX, k), v.to_string()))
            .chain(
                cx.metainfo()
                    .persistent_entries()
                    .map(|(k, v)| (format!("{}{}", PERSISTENT_PREFIX, k), v.to_string())),
            )
            .collect();
        for (k, v) in pairs {
            msg.set_trans(k, v);
        }
        Ok(())
    }

    async fn read_meta(&self, cx: &mut Context, msg: &mut Message) -> Result<(), RpcError> {
        let entries: Vec<(String, String)> = msg
            .trans_entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (key, value) in entries {
            if let Some(stripped) = key.strip_prefix(TRANSIENT_PREFIX) {
                cx.metainfo_mut().set_transient(stripped, value);
            } else if let Some(stripped) = key.strip_prefix(PERSISTENT_PREFIX) {
                cx.metainfo_mut().set_persistent(stripped, value);
            }
        }
        Ok(())
    }
}

/// Bound handler running the configured meta handlers around the codec.
pub struct TransMetaHandler {
    handlers: Vec<Arc<dyn MetaHandler>>,
}

impl TransMetaHandler {
    /// Wraps an ordered list of meta handlers.
    pub fn new(handlers: Vec<Arc<dyn MetaHandler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl BoundHandler for TransMetaHandler {
    async fn write(
        &self,
        cx: &mut Context,
        _ri: &crate::rpcinfo::RpcInfo,
        msg: &mut Message,
    ) -> Result<(), RpcError> {
        for handler in &self.handlers {
            handler.write_meta(cx, msg).await?;
        }
        Ok(())
    }

    async fn on_message(
        &self,
        cx: &mut Context,
        _ri: &crate::rpcinfo::RpcInfo,
        msg: &mut Message,
    ) -> Result<(), RpcError> {
        for handler in &self.handlers {
            handler.read_meta(cx, msg).await?;
        }
        if msg.role() == RpcRole::Server && msg.msg_type() != MessageType::Exception {
            // The decoded method name becomes the caller's from-method on
            // the next hop.
            cx.set_value(CTX_KEY_METHOD, msg.method().to_string());
            cx.metainfo_mut().transfer_forward();
        }
        Ok(())
    }
}
