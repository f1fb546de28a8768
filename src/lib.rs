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

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # meshrpc: async RPC client/server core
//!
//! meshrpc is the runtime core of a service-to-service RPC framework:
//!
//! - **Composable client pipeline**: a middleware chain over an endpoint
//!   function, with per-call options and a diagnostic trail
//! - **Pluggable discovery and balancing**: resolvers produce instance
//!   sets; balancers produce pickers; a process-wide cache keeps balancers
//!   fresh with a background refresher
//! - **Pooled transports**: a per-call connection wrapper over pluggable
//!   connection pools and dialers
//! - **Ordered meta-handler pipeline**: transport metadata hooks around
//!   encode/decode, with single-hop metainfo propagation
//! - **Typed error taxonomy**: kinds for programmatic handling, cause
//!   chains for diagnostics, canonicalized timeouts
//!
//! Wire codecs, concrete registries, and generated service stubs live
//! outside this crate, behind the [`codec::Codec`],
//! [`discovery::Resolver`], and [`client::Endpoint`] seams.
//!
//! ## A minimal call
//!
//! ```rust,no_run
//! use meshrpc::client::{Client, ClientOptions};
//! use meshrpc::callopt::CallOpt;
//! use meshrpc::remote::message::{Message, Payload};
//! use meshrpc::Context;
//! # use meshrpc::discovery::{DiscoveryResult, Resolver};
//! # use meshrpc::RpcError;
//! # use std::sync::Arc;
//! # struct StaticResolver;
//! # #[async_trait::async_trait]
//! # impl Resolver for StaticResolver {
//! #     async fn resolve(&self, _cx: &Context, _key: &str) -> Result<DiscoveryResult, RpcError> {
//! #         unimplemented!()
//! #     }
//! #     fn name(&self) -> &str { "static" }
//! # }
//!
//! # async fn example() -> Result<(), meshrpc::RpcError> {
//! let client = Client::new(ClientOptions::new("gateway", "greeter", Arc::new(StaticResolver)))?;
//!
//! let mut cx = Context::new();
//! let mut req = Message::new_call("Hello");
//! req.set_payload(Payload::Json(serde_json::json!({"name": "world"})));
//! let mut resp = Message::new_reply();
//!
//! client
//!     .call(&mut cx, "Hello", &mut req, &mut resp, &[
//!         CallOpt::rpc_timeout(std::time::Duration::from_millis(200)),
//!     ])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod acl;
pub mod callopt;
pub mod client;
pub mod codec;
pub mod context;
pub mod discovery;
pub mod error;
pub mod loadbalance;
pub mod metainfo;
pub mod remote;
pub mod rpcinfo;

pub use callopt::CallOpt;
pub use client::{Client, ClientOptions, Endpoint, Middleware, MiddlewareBuilder};
pub use context::{CancelToken, Context, CTX_KEY_METHOD};
pub use discovery::{Change, DiscoveryResult, Instance, Resolver};
pub use error::{BoxError, CodecSide, RpcError};
pub use loadbalance::{
    new_balancer_factory, Balancer, BalancerFactory, CacheOptions, LoadBalancer, Picker,
    Rebalancer, WeightedRoundRobin,
};
pub use metainfo::MetaInfo;
pub use remote::{ConnPool, ConnWrapper, LongPool, TransPipeline};
pub use rpcinfo::{
    ConfigLocks, EndpointInfo, InteractionMode, Network, RemoteInfo, RpcConfig, RpcInfo,
};
