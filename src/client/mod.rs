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

//! The client entry: call options, balancing, connection, pipeline.
//!
//! One call flows through: middleware chain → call-option application onto
//! a fresh per-call state → balancer lookup (skipped when an option forced
//! the address) → instance pick → connection acquisition → pipeline write
//! → pipeline read → connection release → state recycle.

pub mod middleware;

pub use middleware::{chain, BoxEndpoint, Endpoint, Middleware, MiddlewareBuilder, MiddlewareFn};

use crate::callopt::{self, CallOpt};
use crate::codec::{Codec, DefaultCodec, JsonPayloadCodec};
use crate::context::Context;
use crate::discovery::Resolver;
use crate::error::RpcError;
use crate::loadbalance::{new_balancer_factory, BalancerFactory, CacheOptions, LoadBalancer, WeightedRoundRobin};
use crate::remote::message::{Message, MessageType};
use crate::remote::{
    ClientTransHandler, ConnPool, ConnWrapper, DefaultDialer, DefaultHttpResolver, Dialer,
    HttpResolver, MetaHandler, MetainfoMetaHandler, TransMetaHandler, TransPipeline,
};
use crate::rpcinfo::{
    ConfigLocks, EndpointInfo, InteractionMode, Invocation, NoopRecorder, RemoteInfo, RpcConfig,
    RpcInfo, RpcStats, StatsEvent, StatsRecorder, StatsStatus,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// Everything a [`Client`] is built from.
///
/// Only the caller name, callee name, and resolver are required; the rest
/// defaults to the bundled implementations.
pub struct ClientOptions {
    caller: String,
    callee: String,
    resolver: Arc<dyn Resolver>,
    lb: Arc<dyn LoadBalancer>,
    cache_opts: CacheOptions,
    pool: Option<Arc<dyn ConnPool>>,
    dialer: Arc<dyn Dialer>,
    codec: Arc<dyn Codec>,
    meta_handlers: Vec<Arc<dyn MetaHandler>>,
    middlewares: Vec<MiddlewareBuilder>,
    http_resolver: Arc<dyn HttpResolver>,
    stats: Arc<dyn StatsRecorder>,
    default_config: RpcConfig,
    client_locks: ConfigLocks,
}

impl ClientOptions {
    /// Creates options for calls from `caller` to `callee`, resolved by
    /// `resolver`.
    pub fn new(
        caller: impl Into<String>,
        callee: impl Into<String>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            caller: caller.into(),
            callee: callee.into(),
            resolver,
            lb: Arc::new(WeightedRoundRobin::new()),
            cache_opts: CacheOptions::default(),
            pool: None,
            dialer: Arc::new(DefaultDialer),
            codec: Arc::new(DefaultCodec::new(Arc::new(JsonPayloadCodec))),
            meta_handlers: vec![Arc::new(MetainfoMetaHandler)],
            middlewares: Vec::new(),
            http_resolver: Arc::new(DefaultHttpResolver),
            stats: Arc::new(NoopRecorder),
            default_config: RpcConfig::default(),
            client_locks: ConfigLocks::new(),
        }
    }

    /// Replaces the load balancer.
    pub fn with_load_balancer(mut self, lb: Arc<dyn LoadBalancer>) -> Self {
        self.lb = lb;
        self
    }

    /// Tunes the balancer cache.
    pub fn with_cache_options(mut self, opts: CacheOptions) -> Self {
        self.cache_opts = opts;
        self
    }

    /// Installs a connection pool. Without one, every call dials.
    pub fn with_conn_pool(mut self, pool: Arc<dyn ConnPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Replaces the dialer.
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Replaces the wire codec.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Appends a meta handler.
    pub fn with_meta_handler(mut self, handler: Arc<dyn MetaHandler>) -> Self {
        self.meta_handlers.push(handler);
        self
    }

    /// Appends a middleware builder. Builders run per call; the first
    /// appended becomes the outermost decorator.
    pub fn with_middleware(mut self, builder: MiddlewareBuilder) -> Self {
        self.middlewares.push(builder);
        self
    }

    /// Replaces the HTTP resolver used by the `url` call option.
    pub fn with_http_resolver(mut self, resolver: Arc<dyn HttpResolver>) -> Self {
        self.http_resolver = resolver;
        self
    }

    /// Installs a stats recorder.
    pub fn with_stats_recorder(mut self, stats: Arc<dyn StatsRecorder>) -> Self {
        self.stats = stats;
        self
    }

    /// Sets the client-level default configuration. Fields pinned by call
    /// options win over these defaults.
    pub fn with_default_config(mut self, config: RpcConfig) -> Self {
        self.default_config = config;
        self
    }

    fn validate(&self) -> Result<(), RpcError> {
        if self.caller.is_empty() {
            return Err(RpcError::bad_option("caller name must not be empty"));
        }
        if self.callee.is_empty() {
            return Err(RpcError::bad_option("callee name must not be empty"));
        }
        Ok(())
    }
}

/// An RPC client for one callee service.
pub struct Client {
    opts: ClientOptions,
    factory: Arc<BalancerFactory>,
    pipeline: Arc<TransPipeline>,
}

impl Client {
    /// Validates the options and assembles the client.
    pub fn new(opts: ClientOptions) -> Result<Self, RpcError> {
        opts.validate()?;
        let factory = new_balancer_factory(
            opts.resolver.clone(),
            opts.lb.clone(),
            opts.cache_opts,
        );
        let pipeline = Arc::new(TransPipeline::new(
            vec![Arc::new(TransMetaHandler::new(opts.meta_handlers.clone()))],
            Arc::new(ClientTransHandler::new(opts.codec.clone())),
        ));
        Ok(Self {
            opts,
            factory,
            pipeline,
        })
    }

    /// Performs one call.
    ///
    /// `req` should be a [`Message::new_call`]; its sequence id and method
    /// are stamped here. `resp` receives the decoded reply (untouched for
    /// oneway calls).
    pub async fn call(
        &self,
        cx: &mut Context,
        method: &str,
        req: &mut Message,
        resp: &mut Message,
        call_opts: &[CallOpt],
    ) -> Result<(), RpcError> {
        let mut cfg = RpcConfig::new();
        let mut remote = RemoteInfo::new(&self.opts.callee, method);
        let diagnostic = callopt::apply(
            call_opts,
            &mut cfg,
            &mut remote,
            &self.opts.client_locks,
            &*self.opts.http_resolver,
        )?;
        if !diagnostic.is_empty() {
            tracing::debug!(options = %diagnostic, "call options applied");
        }
        self.apply_default_config(&mut cfg);

        let invocation = Invocation::new(&self.opts.callee, method);
        req.set_method(method);
        req.set_seq_id(invocation.seq_id());
        if cfg.interaction_mode() == InteractionMode::Oneway {
            req.set_msg_type(MessageType::Oneway);
        }

        let ri = RpcInfo::alloc(
            EndpointInfo::new(&self.opts.caller, method),
            remote,
            cfg,
            RpcStats::new(self.opts.stats.clone()),
            invocation,
        );
        ri.stats()
            .record(cx, StatsEvent::RpcStart, StatsStatus::Info, "");

        let base = Arc::new(BaseEndpoint {
            ri: Mutex::new(Some(ri)),
            pipeline: self.pipeline.clone(),
            factory: self.factory.clone(),
            pool: self.opts.pool.clone(),
            dialer: self.opts.dialer.clone(),
        });
        let endpoint = chain(&self.opts.middlewares, cx, base.clone());

        let result = endpoint.call(cx, req, resp).await;

        if let Some(ri) = base.ri.lock().take() {
            let (status, detail) = match &result {
                Ok(()) => (StatsStatus::Info, String::new()),
                Err(err) => (StatsStatus::Error, err.to_string()),
            };
            ri.stats()
                .record(cx, StatsEvent::RpcFinish, status, &detail);
            RpcInfo::recycle(ri);
        }
        result
    }

    /// Writes client defaults through the lock-respecting setters, so
    /// values pinned by call options survive.
    fn apply_default_config(&self, cfg: &mut RpcConfig) {
        let defaults = &self.opts.default_config;
        cfg.set_rpc_timeout(defaults.rpc_timeout());
        cfg.set_connect_timeout(defaults.connect_timeout());
        cfg.set_read_write_timeout(defaults.read_write_timeout());
        cfg.set_interaction_mode(defaults.interaction_mode());
    }
}

/// The innermost endpoint: everything after the middleware chain.
struct BaseEndpoint {
    ri: Mutex<Option<Box<RpcInfo>>>,
    pipeline: Arc<TransPipeline>,
    factory: Arc<BalancerFactory>,
    pool: Option<Arc<dyn ConnPool>>,
    dialer: Arc<dyn Dialer>,
}

#[async_trait]
impl Endpoint for BaseEndpoint {
    async fn call(
        &self,
        cx: &mut Context,
        req: &mut Message,
        resp: &mut Message,
    ) -> Result<(), RpcError> {
        let mut ri = match self.ri.lock().take() {
            Some(ri) => ri,
            None => {
                return Err(RpcError::transport(io::Error::new(
                    io::ErrorKind::Other,
                    "base endpoint invoked twice for one call",
                )))
            }
        };
        let result = self.invoke(cx, &mut ri, req, resp).await;
        *self.ri.lock() = Some(ri);
        result
    }
}

impl BaseEndpoint {
    async fn invoke(
        &self,
        cx: &mut Context,
        ri: &mut RpcInfo,
        req: &mut Message,
        resp: &mut Message,
    ) -> Result<(), RpcError> {
        // A host_port/url option forced the address; the balancer is only
        // consulted otherwise.
        if ri.to().instance().is_none() {
            let endpoint = EndpointInfo::new(ri.to().service(), ri.to().method());
            let balancer = self.factory.get(cx, &endpoint).await?;
            let picker = balancer.get_picker();
            let instance = picker.next(cx).ok_or(RpcError::NoDestAddress)?;
            ri.to_mut().set_instance_shared(instance);
        }

        let mut wrapper = ConnWrapper::acquire(self.pool.clone());
        if let Err(err) = wrapper.get_conn(cx, &*self.dialer, ri).await {
            wrapper.release_conn(Some(&err), ri);
            return Err(err);
        }

        let oneway = ri.config().interaction_mode() == InteractionMode::Oneway;
        let rpc_timeout = ri.config().rpc_timeout();
        let cancel = cx.cancel_token().clone();

        let mut result = match wrapper.conn_mut() {
            None => Err(RpcError::transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection lost before I/O",
            ))),
            Some(conn) => {
                let pipeline = &self.pipeline;
                let io = async {
                    pipeline.write(cx, ri, &mut *conn, req).await?;
                    if oneway {
                        return Ok(());
                    }
                    pipeline.read(cx, ri, &mut *conn, resp).await
                };
                if rpc_timeout.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => Err(RpcError::Cancelled),
                        result = io => result,
                    }
                } else {
                    tokio::select! {
                        _ = cancel.cancelled() => Err(RpcError::Cancelled),
                        result = tokio::time::timeout(rpc_timeout, io) => match result {
                            Ok(result) => result,
                            Err(elapsed) => Err(RpcError::timeout_with(elapsed)),
                        },
                    }
                }
            }
        };

        if result.is_ok() && !oneway && resp.seq_id() != req.seq_id() {
            result = Err(RpcError::decode(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "out of order reply: got seq {}, want {}",
                    resp.seq_id(),
                    req.seq_id()
                ),
            )));
        }

        if let Err(err) = &result {
            self.pipeline.on_error(cx, ri, err);
        }
        wrapper.release_conn(result.as_ref().err(), ri);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryResult;

    struct EmptyResolver;

    #[async_trait]
    impl Resolver for EmptyResolver {
        async fn resolve(&self, _cx: &Context, _key: &str) -> Result<DiscoveryResult, RpcError> {
            Ok(DiscoveryResult {
                cacheable: false,
                cache_key: String::new(),
                instances: Vec::new(),
            })
        }

        fn name(&self) -> &str {
            "client_mod_empty_resolver"
        }
    }

    #[test]
    fn test_options_validation() {
        let opts = ClientOptions::new("", "svc", Arc::new(EmptyResolver));
        assert!(Client::new(opts).is_err());
        let opts = ClientOptions::new("caller", "", Arc::new(EmptyResolver));
        assert!(Client::new(opts).is_err());
        let opts = ClientOptions::new("caller", "svc", Arc::new(EmptyResolver));
        assert!(Client::new(opts).is_ok());
    }

    #[tokio::test]
    async fn test_empty_resolution_is_no_dest() {
        let client =
            Client::new(ClientOptions::new("caller", "svc", Arc::new(EmptyResolver))).unwrap();
        let mut cx = Context::new();
        let mut req = Message::new_call("echo");
        let mut resp = Message::new_reply();
        let err = client
            .call(&mut cx, "echo", &mut req, &mut resp, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::NoDestAddress));
    }

    #[tokio::test]
    async fn test_forced_host_port_skips_resolver() {
        // Resolver yields nothing, but the call option forces the address,
        // so the failure must come from the dial instead.
        let client =
            Client::new(ClientOptions::new("caller", "svc", Arc::new(EmptyResolver))).unwrap();
        let mut cx = Context::new();
        let mut req = Message::new_call("echo");
        let mut resp = Message::new_reply();
        let err = client
            .call(
                &mut cx,
                "echo",
                &mut req,
                &mut resp,
                &[CallOpt::host_port("127.0.0.1:1")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::GetConnection { .. }));
    }
}
