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

//! Default client trans handler: the encode-flush-read-decode sequence.
//!
//! Socket operations run under the call's read/write timeout; any timeout
//! observed at this boundary (elapsed budget, a timeout `io::Error` from
//! the transport, or a timeout buried in a codec decode error) is
//! canonicalized to [`RpcError::RpcTimeout`] so inner kinds never leak.

use crate::codec::{read_frame, write_frame, Codec};
use crate::context::Context;
use crate::error::{is_io_timeout, RpcError};
use crate::remote::buffer::{ReaderBuffer, WriterBuffer};
use crate::remote::message::{Message, MessageType};
use crate::remote::pipeline::TransHandler;
use crate::remote::Conn;
use crate::rpcinfo::{RpcInfo, StatsEvent, StatsStatus};
use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Runs an I/O future under a budget, canonicalizing timeouts.
async fn bounded<T>(
    budget: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, RpcError> {
    let result = if budget.is_zero() {
        fut.await
    } else {
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(elapsed) => return Err(RpcError::timeout_with(elapsed)),
        }
    };
    result.map_err(|err| {
        if matches!(
            err.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        ) {
            RpcError::timeout_with(err)
        } else {
            RpcError::transport(err)
        }
    })
}

/// The default client-side [`TransHandler`].
pub struct ClientTransHandler {
    codec: Arc<dyn Codec>,
}

impl ClientTransHandler {
    /// Wraps a codec.
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    async fn write_inner(
        &self,
        cx: &mut Context,
        ri: &RpcInfo,
        conn: &mut dyn Conn,
        msg: &mut Message,
    ) -> Result<(), RpcError> {
        let mut out = WriterBuffer::new();
        self.codec.encode(cx, msg, &mut out)?;
        let frame = out.into_inner();

        let budget = ri.config().read_write_timeout();
        let cancel = cx.cancel_token().clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(RpcError::Cancelled),
            result = bounded(budget, write_frame(conn, &frame)) => result,
        }
    }

    async fn read_inner(
        &self,
        cx: &mut Context,
        ri: &RpcInfo,
        conn: &mut dyn Conn,
        msg: &mut Message,
    ) -> Result<(), RpcError> {
        let budget = ri.config().read_write_timeout();
        let cancel = cx.cancel_token().clone();
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Err(RpcError::Cancelled),
            result = bounded(budget, read_frame(conn)) => result?,
        };

        let mut input = ReaderBuffer::new(frame);
        self.codec.decode(cx, msg, &mut input).map_err(|err| {
            if is_io_timeout(&err) {
                RpcError::timeout_with(err)
            } else {
                err
            }
        })?;

        if msg.msg_type() == MessageType::Exception {
            return Err(RpcError::Remote {
                message: msg.exception_message(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TransHandler for ClientTransHandler {
    async fn write(
        &self,
        cx: &mut Context,
        ri: &RpcInfo,
        conn: &mut dyn Conn,
        msg: &mut Message,
    ) -> Result<(), RpcError> {
        ri.stats()
            .record(cx, StatsEvent::WriteStart, StatsStatus::Info, "");
        let result = self.write_inner(cx, ri, conn, msg).await;
        match &result {
            Ok(()) => ri
                .stats()
                .record(cx, StatsEvent::WriteFinish, StatsStatus::Info, ""),
            Err(err) => {
                ri.stats()
                    .record(cx, StatsEvent::WriteFinish, StatsStatus::Error, &err.to_string())
            }
        }
        result
    }

    async fn read(
        &self,
        cx: &mut Context,
        ri: &RpcInfo,
        conn: &mut dyn Conn,
        msg: &mut Message,
    ) -> Result<(), RpcError> {
        ri.stats()
            .record(cx, StatsEvent::ReadStart, StatsStatus::Info, "");
        let result = self.read_inner(cx, ri, conn, msg).await;
        match &result {
            Ok(()) => ri
                .stats()
                .record(cx, StatsEvent::ReadFinish, StatsStatus::Info, ""),
            Err(err) => {
                ri.stats()
                    .record(cx, StatsEvent::ReadFinish, StatsStatus::Error, &err.to_string())
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DefaultCodec, JsonPayloadCodec};
    use crate::remote::message::{Payload, RpcRole};
    use crate::rpcinfo::{
        BufferingRecorder, EndpointInfo, Invocation, RemoteInfo, RpcConfig, RpcStats,
    };
    use serde_json::json;

    fn handler() -> ClientTransHandler {
        ClientTransHandler::new(Arc::new(DefaultCodec::new(Arc::new(JsonPayloadCodec))))
    }

    fn rpcinfo(budget: Duration) -> Box<RpcInfo> {
        let mut cfg = RpcConfig::new();
        cfg.set_read_write_timeout(budget);
        RpcInfo::alloc(
            EndpointInfo::new("caller", "echo"),
            RemoteInfo::new("svc", "echo"),
            cfg,
            RpcStats::new(Arc::new(BufferingRecorder::new())),
            Invocation::new("svc", "echo"),
        )
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let handler = handler();
        let codec = DefaultCodec::new(Arc::new(JsonPayloadCodec));
        let (mut client, mut server) = tokio::io::duplex(4096);
        let mut cx = Context::new();
        let ri = rpcinfo(Duration::from_secs(1));

        let mut req = Message::new_call("Echo");
        req.set_seq_id(5);
        req.set_payload(Payload::Json(json!("ping")));
        handler.write(&mut cx, &ri, &mut client, &mut req).await.unwrap();

        // Decode what arrived and send a reply back.
        let frame = read_frame(&mut server).await.unwrap();
        let mut seen = Message::new(RpcRole::Server, MessageType::Call);
        codec
            .decode(&mut cx, &mut seen, &mut ReaderBuffer::new(frame))
            .unwrap();
        assert_eq!(seen.method(), "Echo");

        let mut reply = Message::new(RpcRole::Server, MessageType::Reply);
        reply.set_seq_id(5);
        reply.set_payload(Payload::Json(json!("pong")));
        let mut out = WriterBuffer::new();
        codec.encode(&mut cx, &mut reply, &mut out).unwrap();
        write_frame(&mut server, out.as_slice()).await.unwrap();

        let mut resp = Message::new_reply();
        handler.read(&mut cx, &ri, &mut client, &mut resp).await.unwrap();
        assert_eq!(*resp.payload(), Payload::Json(json!("pong")));
        RpcInfo::recycle(ri);
    }

    #[tokio::test]
    async fn test_read_budget_elapsed_is_rpc_timeout() {
        let handler = handler();
        let (mut client, _server) = tokio::io::duplex(64);
        let mut cx = Context::new();
        let ri = rpcinfo(Duration::from_millis(50));

        let mut resp = Message::new_reply();
        let err = handler
            .read(&mut cx, &ri, &mut client, &mut resp)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        RpcInfo::recycle(ri);
    }

    #[tokio::test]
    async fn test_codec_timeout_canonicalized() {
        // A codec that reports a deadline-exceeded during decode.
        struct TimeoutCodec;

        impl Codec for TimeoutCodec {
            fn name(&self) -> &'static str {
                "timeout"
            }
            fn encode(
                &self,
                _cx: &mut Context,
                _msg: &mut Message,
                _out: &mut WriterBuffer,
            ) -> Result<(), RpcError> {
                Ok(())
            }
            fn decode(
                &self,
                _cx: &mut Context,
                _msg: &mut Message,
                _input: &mut ReaderBuffer,
            ) -> Result<(), RpcError> {
                Err(RpcError::decode(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read deadline exceeded",
                )))
            }
        }

        let handler = ClientTransHandler::new(Arc::new(TimeoutCodec));
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut server, b"x").await.unwrap();

        let mut cx = Context::new();
        let ri = rpcinfo(Duration::from_secs(1));
        let mut resp = Message::new_reply();
        let err = handler
            .read(&mut cx, &ri, &mut client, &mut resp)
            .await
            .unwrap_err();
        assert!(
            matches!(err, RpcError::RpcTimeout { .. }),
            "got {:?} instead of RpcTimeout",
            err
        );
        RpcInfo::recycle(ri);
    }

    #[tokio::test]
    async fn test_exception_reply_is_remote_error() {
        let handler = handler();
        let codec = DefaultCodec::new(Arc::new(JsonPayloadCodec));
        let (mut client, mut server) = tokio::io::duplex(4096);
        let mut cx = Context::new();
        let ri = rpcinfo(Duration::from_secs(1));

        let mut exception = Message::new(RpcRole::Server, MessageType::Exception);
        exception.set_payload(Payload::Json(json!("service exploded")));
        let mut out = WriterBuffer::new();
        codec.encode(&mut cx, &mut exception, &mut out).unwrap();
        write_frame(&mut server, out.as_slice()).await.unwrap();

        let mut resp = Message::new_reply();
        let err = handler
            .read(&mut cx, &ri, &mut client, &mut resp)
            .await
            .unwrap_err();
        match err {
            RpcError::Remote { message } => assert_eq!(message, "service exploded"),
            other => panic!("expected Remote, got {:?}", other),
        }
        RpcInfo::recycle(ri);
    }

    #[tokio::test]
    async fn test_stats_events_recorded() {
        let handler = handler();
        let recorder = Arc::new(BufferingRecorder::new());
        let mut cfg = RpcConfig::new();
        cfg.set_read_write_timeout(Duration::from_secs(1));
        let ri = RpcInfo::alloc(
            EndpointInfo::new("caller", "echo"),
            RemoteInfo::new("svc", "echo"),
            cfg,
            RpcStats::new(recorder.clone()),
            Invocation::new("svc", "echo"),
        );

        let (mut client, _server) = tokio::io::duplex(4096);
        let mut cx = Context::new();
        let mut req = Message::new_call("Echo");
        handler.write(&mut cx, &ri, &mut client, &mut req).await.unwrap();

        assert_eq!(recorder.count(StatsEvent::WriteStart), 1);
        assert_eq!(recorder.count(StatsEvent::WriteFinish), 1);
        RpcInfo::recycle(ri);
    }
}
