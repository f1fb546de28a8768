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

//! The ordered hook pipeline around encode and decode.
//!
//! A [`TransPipeline`] composes bound handlers around one inner
//! [`TransHandler`] that talks to the connection. Both directions run the
//! handler list first→last; a handler wanting reverse order on one side
//! must reverse its own registration.

use crate::context::Context;
use crate::error::RpcError;
use crate::remote::message::Message;
use crate::remote::Conn;
use crate::rpcinfo::RpcInfo;
use async_trait::async_trait;
use std::sync::Arc;

/// Hooks running around encode/decode and connection lifecycle events.
///
/// All methods default to pass-through, so implementations override only
/// the events they care about.
#[async_trait]
pub trait BoundHandler: Send + Sync {
    /// Runs when a connection becomes active for the call.
    async fn on_active(&self, cx: &mut Context, ri: &RpcInfo) -> Result<(), RpcError> {
        let _ = (cx, ri);
        Ok(())
    }

    /// Runs when bytes become readable, before decode.
    async fn on_read(&self, cx: &mut Context, ri: &RpcInfo) -> Result<(), RpcError> {
        let _ = (cx, ri);
        Ok(())
    }

    /// Runs when the connection goes away.
    async fn on_inactive(&self, cx: &mut Context, ri: &RpcInfo) {
        let _ = (cx, ri);
    }

    /// Runs before encode on the outbound path.
    async fn write(&self, cx: &mut Context, ri: &RpcInfo, msg: &mut Message) -> Result<(), RpcError> {
        let _ = (cx, ri, msg);
        Ok(())
    }

    /// Runs after decode on the inbound path.
    async fn on_message(
        &self,
        cx: &mut Context,
        ri: &RpcInfo,
        msg: &mut Message,
    ) -> Result<(), RpcError> {
        let _ = (cx, ri, msg);
        Ok(())
    }
}

/// The innermost handler: moves one message across the connection.
#[async_trait]
pub trait TransHandler: Send + Sync {
    /// Encodes and flushes one message.
    async fn write(
        &self,
        cx: &mut Context,
        ri: &RpcInfo,
        conn: &mut dyn Conn,
        msg: &mut Message,
    ) -> Result<(), RpcError>;

    /// Reads and decodes one message.
    async fn read(
        &self,
        cx: &mut Context,
        ri: &RpcInfo,
        conn: &mut dyn Conn,
        msg: &mut Message,
    ) -> Result<(), RpcError>;

    /// Logging hook for errors that already have call context attached.
    fn on_error(&self, cx: &Context, ri: &RpcInfo, err: &RpcError) {
        let _ = cx;
        let remote = ri
            .to()
            .address()
            .map(|(network, addr)| format!("{}://{}", network, addr))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(remote = %remote, error = %err, "send request error");
    }
}

/// Ordered bound handlers wrapped around one trans handler.
pub struct TransPipeline {
    handlers: Vec<Arc<dyn BoundHandler>>,
    inner: Arc<dyn TransHandler>,
}

impl TransPipeline {
    /// Builds a pipeline. Handlers run in the given order on both
    /// directions.
    pub fn new(handlers: Vec<Arc<dyn BoundHandler>>, inner: Arc<dyn TransHandler>) -> Self {
        Self { handlers, inner }
    }

    /// Outbound: bound handlers first→last, then encode+flush.
    pub async fn write(
        &self,
        cx: &mut Context,
        ri: &RpcInfo,
        conn: &mut dyn Conn,
        msg: &mut Message,
    ) -> Result<(), RpcError> {
        for handler in &self.handlers {
            handler.write(cx, ri, msg).await?;
        }
        self.inner.write(cx, ri, conn, msg).await
    }

    /// Inbound: read+decode, then bound handlers first→last.
    pub async fn read(
        &self,
        cx: &mut Context,
        ri: &RpcInfo,
        conn: &mut dyn Conn,
        msg: &mut Message,
    ) -> Result<(), RpcError> {
        for handler in &self.handlers {
            handler.on_read(cx, ri).await?;
        }
        self.inner.read(cx, ri, conn, msg).await?;
        for handler in &self.handlers {
            handler.on_message(cx, ri, msg).await?;
        }
        Ok(())
    }

    /// Propagates connection activation to every handler.
    pub async fn on_active(&self, cx: &mut Context, ri: &RpcInfo) -> Result<(), RpcError> {
        for handler in &self.handlers {
            handler.on_active(cx, ri).await?;
        }
        Ok(())
    }

    /// Propagates connection teardown to every handler.
    pub async fn on_inactive(&self, cx: &mut Context, ri: &RpcInfo) {
        for handler in &self.handlers {
            handler.on_inactive(cx, ri).await;
        }
    }

    /// Forwards to the inner handler's error hook.
    pub fn on_error(&self, cx: &Context, ri: &RpcInfo, err: &RpcError) {
        self.inner.on_error(cx, ri, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpcinfo::{EndpointInfo, Invocation, RemoteInfo, RpcConfig, RpcStats};
    use parking_lot::Mutex;

    struct RecordingHandler {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl BoundHandler for RecordingHandler {
        async fn write(
            &self,
            _cx: &mut Context,
            _ri: &RpcInfo,
            _msg: &mut Message,
        ) -> Result<(), RpcError> {
            self.log.lock().push(format!("write:{}", self.name));
            Ok(())
        }

        async fn on_message(
            &self,
            _cx: &mut Context,
            _ri: &RpcInfo,
            _msg: &mut Message,
        ) -> Result<(), RpcError> {
            self.log.lock().push(format!("message:{}", self.name));
            Ok(())
        }
    }

    struct NoopTransHandler {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TransHandler for NoopTransHandler {
        async fn write(
            &self,
            _cx: &mut Context,
            _ri: &RpcInfo,
            _conn: &mut dyn Conn,
            _msg: &mut Message,
        ) -> Result<(), RpcError> {
            self.log.lock().push("encode".to_string());
            Ok(())
        }

        async fn read(
            &self,
            _cx: &mut Context,
            _ri: &RpcInfo,
            _conn: &mut dyn Conn,
            _msg: &mut Message,
        ) -> Result<(), RpcError> {
            self.log.lock().push("decode".to_string());
            Ok(())
        }
    }

    fn rpcinfo() -> Box<RpcInfo> {
        RpcInfo::alloc(
            EndpointInfo::new("caller", "m"),
            RemoteInfo::new("svc", "m"),
            RpcConfig::new(),
            RpcStats::noop(),
            Invocation::new("svc", "m"),
        )
    }

    #[tokio::test]
    async fn test_same_order_both_directions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = TransPipeline::new(
            vec![
                Arc::new(RecordingHandler {
                    name: "a",
                    log: log.clone(),
                }),
                Arc::new(RecordingHandler {
                    name: "b",
                    log: log.clone(),
                }),
            ],
            Arc::new(NoopTransHandler { log: log.clone() }),
        );

        let mut cx = Context::new();
        let ri = rpcinfo();
        let (mut conn, _other) = tokio::io::duplex(64);
        let mut msg = Message::new_call("m");

        pipeline.write(&mut cx, &ri, &mut conn, &mut msg).await.unwrap();
        pipeline.read(&mut cx, &ri, &mut conn, &mut msg).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "write:a", "write:b", "encode", "decode", "message:a", "message:b"
            ]
        );
        RpcInfo::recycle(ri);
    }
}
