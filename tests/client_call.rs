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

//! End-to-end client calls against a real TCP loopback server speaking the
//! framed protocol.

use async_trait::async_trait;
use meshrpc::callopt::CallOpt;
use meshrpc::client::{Client, ClientOptions, MiddlewareBuilder, MiddlewareFn};
use meshrpc::codec::{read_frame, write_frame, Codec, DefaultCodec, JsonPayloadCodec};
use meshrpc::discovery::{DiscoveryResult, Instance, Resolver};
use meshrpc::remote::buffer::{ReaderBuffer, WriterBuffer};
use meshrpc::remote::message::{Message, MessageType, Payload, RpcRole};
use meshrpc::remote::LongPool;
use meshrpc::rpcinfo::{BufferingRecorder, Network, RpcConfig, StatsEvent};
use meshrpc::{Context, RpcError};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Spawns an echo server. Method "boom" gets an exception reply; method
/// "sleep" never gets a reply.
async fn spawn_echo_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut conn, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let codec = DefaultCodec::new(Arc::new(JsonPayloadCodec));
                let mut cx = Context::new();
                loop {
                    let Ok(frame) = read_frame(&mut conn).await else {
                        return;
                    };
                    let mut req = Message::new(RpcRole::Server, MessageType::Call);
                    if codec
                        .decode(&mut cx, &mut req, &mut ReaderBuffer::new(frame))
                        .is_err()
                    {
                        return;
                    }
                    if req.method() == "sleep" {
                        continue;
                    }

                    let mut reply = if req.method() == "boom" {
                        let mut reply = Message::new(RpcRole::Server, MessageType::Exception);
                        reply.set_payload(Payload::Json(json!("server exploded")));
                        reply
                    } else {
                        let mut reply = Message::new(RpcRole::Server, MessageType::Reply);
                        reply.set_payload(req.payload().clone());
                        reply
                    };
                    reply.set_seq_id(req.seq_id());
                    // Reflect transport metadata so propagation is
                    // observable on the client side.
                    for (k, v) in req.trans_entries() {
                        reply.set_trans(k.to_string(), v.to_string());
                    }

                    let mut out = WriterBuffer::new();
                    if codec.encode(&mut cx, &mut reply, &mut out).is_err() {
                        return;
                    }
                    if write_frame(&mut conn, out.as_slice()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

struct StaticResolver {
    name: String,
    addr: String,
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, _cx: &Context, _key: &str) -> Result<DiscoveryResult, RpcError> {
        Ok(DiscoveryResult {
            cacheable: true,
            cache_key: "svc".to_string(),
            instances: vec![Arc::new(Instance::new(Network::Tcp, self.addr.clone()))],
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn client_for(addr: SocketAddr, name: &str) -> Client {
    let resolver = Arc::new(StaticResolver {
        name: name.to_string(),
        addr: addr.to_string(),
    });
    Client::new(ClientOptions::new("test-caller", "echo-svc", resolver)).unwrap()
}

#[tokio::test]
async fn test_resolved_call_roundtrip() {
    let addr = spawn_echo_server().await;
    let client = client_for(addr, "test_resolved_call_roundtrip");

    let mut cx = Context::new();
    let mut req = Message::new_call("echo");
    req.set_payload(Payload::Json(json!({"n": 42})));
    let mut resp = Message::new_reply();

    client
        .call(&mut cx, "echo", &mut req, &mut resp, &[])
        .await
        .unwrap();
    assert_eq!(*resp.payload(), Payload::Json(json!({"n": 42})));
    assert_eq!(resp.seq_id(), req.seq_id());
}

#[tokio::test]
async fn test_forced_host_port_call() {
    let addr = spawn_echo_server().await;
    // The resolver points nowhere; the call option must win.
    let resolver = Arc::new(StaticResolver {
        name: "test_forced_host_port_call".to_string(),
        addr: "127.0.0.1:1".to_string(),
    });
    let client = Client::new(ClientOptions::new("test-caller", "echo-svc", resolver)).unwrap();

    let mut cx = Context::new();
    let mut req = Message::new_call("echo");
    req.set_payload(Payload::Json(json!("forced")));
    let mut resp = Message::new_reply();

    client
        .call(
            &mut cx,
            "echo",
            &mut req,
            &mut resp,
            &[CallOpt::host_port(addr.to_string())],
        )
        .await
        .unwrap();
    assert_eq!(*resp.payload(), Payload::Json(json!("forced")));
}

#[tokio::test]
async fn test_exception_reply_surfaces_remote_error() {
    let addr = spawn_echo_server().await;
    let client = client_for(addr, "test_exception_reply");

    let mut cx = Context::new();
    let mut req = Message::new_call("boom");
    let mut resp = Message::new_reply();

    let err = client
        .call(&mut cx, "boom", &mut req, &mut resp, &[])
        .await
        .unwrap_err();
    match err {
        RpcError::Remote { message } => assert_eq!(message, "server exploded"),
        other => panic!("expected Remote, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rpc_timeout_option_bounds_call() {
    let addr = spawn_echo_server().await;
    let client = client_for(addr, "test_rpc_timeout_option");

    let mut cx = Context::new();
    let mut req = Message::new_call("sleep");
    let mut resp = Message::new_reply();

    let start = std::time::Instant::now();
    let err = client
        .call(
            &mut cx,
            "sleep",
            &mut req,
            &mut resp,
            &[CallOpt::rpc_timeout(Duration::from_millis(100))],
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "got {:?}", err);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancellation_distinct_from_timeout() {
    let addr = spawn_echo_server().await;
    let client = client_for(addr, "test_cancellation_distinct");

    let mut cx = Context::new();
    let cancel = cx.cancel_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let mut req = Message::new_call("sleep");
    let mut resp = Message::new_reply();
    let err = client
        .call(&mut cx, "sleep", &mut req, &mut resp, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Cancelled));
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn test_metainfo_crosses_one_hop() {
    let addr = spawn_echo_server().await;
    let client = client_for(addr, "test_metainfo_crosses_one_hop");

    let mut cx = Context::new();
    cx.metainfo_mut().set_transient("trace-id", "t-123");

    let mut req = Message::new_call("echo");
    req.set_payload(Payload::Json(json!(null)));
    let mut resp = Message::new_reply();
    client
        .call(&mut cx, "echo", &mut req, &mut resp, &[])
        .await
        .unwrap();

    // The echo server reflected the wire metadata back.
    assert_eq!(resp.trans("t:trace-id"), Some("t-123"));
}

#[tokio::test]
async fn test_pooled_calls_reuse_connection() {
    let addr = spawn_echo_server().await;
    let pool = Arc::new(LongPool::new(4));
    let resolver = Arc::new(StaticResolver {
        name: "test_pooled_calls_reuse".to_string(),
        addr: addr.to_string(),
    });
    let client = Client::new(
        ClientOptions::new("test-caller", "echo-svc", resolver).with_conn_pool(pool.clone()),
    )
    .unwrap();

    for _ in 0..3 {
        let mut cx = Context::new();
        let mut req = Message::new_call("echo");
        req.set_payload(Payload::Json(json!("pooled")));
        let mut resp = Message::new_reply();
        client
            .call(&mut cx, "echo", &mut req, &mut resp, &[])
            .await
            .unwrap();
    }
    // All three calls went through one retained connection.
    assert_eq!(pool.idle_len(Network::Tcp, &addr.to_string()), 1);
}

#[tokio::test]
async fn test_middleware_observes_and_stats_recorded() {
    let addr = spawn_echo_server().await;
    let recorder = Arc::new(BufferingRecorder::new());
    let resolver = Arc::new(StaticResolver {
        name: "test_middleware_observes".to_string(),
        addr: addr.to_string(),
    });

    let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen_in_mw = seen.clone();
    let builder: MiddlewareBuilder = Box::new(move |_cx| {
        let seen = seen_in_mw.clone();
        Box::new(MiddlewareFn(move |next| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            next
        }))
    });

    let client = Client::new(
        ClientOptions::new("test-caller", "echo-svc", resolver)
            .with_stats_recorder(recorder.clone())
            .with_middleware(builder)
            .with_default_config({
                let mut cfg = RpcConfig::new();
                cfg.set_rpc_timeout(Duration::from_secs(2));
                cfg
            }),
    )
    .unwrap();

    let mut cx = Context::new();
    let mut req = Message::new_call("echo");
    req.set_payload(Payload::Json(json!(1)));
    let mut resp = Message::new_reply();
    client
        .call(&mut cx, "echo", &mut req, &mut resp, &[])
        .await
        .unwrap();

    assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(recorder.count(StatsEvent::RpcStart), 1);
    assert_eq!(recorder.count(StatsEvent::RpcFinish), 1);
    assert_eq!(recorder.count(StatsEvent::ClientConnStart), 1);
    assert_eq!(recorder.count(StatsEvent::ClientConnFinish), 1);
    assert_eq!(recorder.count(StatsEvent::WriteStart), 1);
    assert_eq!(recorder.count(StatsEvent::ReadFinish), 1);
}
