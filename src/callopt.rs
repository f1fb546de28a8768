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

//! Per-call options applied on top of the client configuration.
//!
//! [`apply`] runs a sequence of [`CallOpt`]s against a call's config and
//! remote info, producing a diagnostic string of the form
//! `[opt1(arg),opt2(arg)]` (empty for an empty sequence, entries in input
//! order). Each option both mutates call state and records which fields it
//! pinned; after the loop the accumulated locks are written back so client
//! defaults applied later cannot overwrite pinned values.
//!
//! The bookkeeping block the options run against is drawn from a free-list
//! and recycled zeroed, including on the error path. A failing option
//! aborts the remaining sequence; partial application is observable in the
//! diagnostic string and harmless because no I/O has happened yet.

use crate::discovery::Instance;
use crate::error::RpcError;
use crate::remote::http::HttpResolver;
use crate::rpcinfo::{lock_bits, ConfigLocks, Network, RemoteInfo, RpcConfig, HTTP_HOST, HTTP_URL};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::OnceLock;
use std::time::Duration;

/// One per-call override.
#[derive(Clone, Debug)]
pub struct CallOpt(OptKind);

#[derive(Clone, Debug)]
enum OptKind {
    HostPort(String),
    Url(String),
    HttpHost(String),
    RpcTimeout(Duration),
    ConnectTimeout(Duration),
    Tag(&'static str, String),
}

impl CallOpt {
    /// Forces the target address, overriding the resolver. Accepts
    /// "host:port" or a unix socket path.
    pub fn host_port(hostport: impl Into<String>) -> Self {
        CallOpt(OptKind::HostPort(hostport.into()))
    }

    /// Resolves a URL to a host:port via the configured HTTP resolver and
    /// forces it as the target address. Also records the URL as a tag.
    pub fn url(url: impl Into<String>) -> Self {
        CallOpt(OptKind::Url(url.into()))
    }

    /// Sets the Host header value for RPC-over-HTTP.
    pub fn http_host(host: impl Into<String>) -> Self {
        CallOpt(OptKind::HttpHost(host.into()))
    }

    /// Pins the RPC timeout (and the read/write timeout) for this call.
    pub fn rpc_timeout(d: Duration) -> Self {
        CallOpt(OptKind::RpcTimeout(d))
    }

    /// Pins the connect timeout for this call.
    pub fn connect_timeout(d: Duration) -> Self {
        CallOpt(OptKind::ConnectTimeout(d))
    }

    /// Pins the discovery cluster for this call.
    pub fn cluster(cluster: impl Into<String>) -> Self {
        CallOpt(OptKind::Tag(crate::rpcinfo::CLUSTER_TAG, cluster.into()))
    }

    /// Pins the discovery IDC for this call.
    pub fn idc(idc: impl Into<String>) -> Self {
        CallOpt(OptKind::Tag(crate::rpcinfo::IDC_TAG, idc.into()))
    }

    fn apply(
        &self,
        cfg: &mut RpcConfig,
        svr: &mut RemoteInfo,
        locks: &mut ConfigLocks,
        http_resolver: &dyn HttpResolver,
        di: &mut String,
    ) -> Result<(), RpcError> {
        match &self.0 {
            OptKind::HostPort(hostport) => {
                let _ = write!(di, "host_port({})", hostport);
                svr.set_instance(parse_instance(hostport)?);
            }
            OptKind::Url(url) => {
                let _ = write!(di, "url({})", url);
                svr.set_tag(HTTP_URL, url.clone());
                let hostport = http_resolver.resolve(url).map_err(|e| {
                    RpcError::bad_option_with(format!("http resolve failed for '{}'", url), e)
                })?;
                svr.set_instance(parse_instance(&hostport)?);
            }
            OptKind::HttpHost(host) => {
                let _ = write!(di, "http_host({})", host);
                svr.set_tag(HTTP_HOST, host.clone());
            }
            OptKind::RpcTimeout(d) => {
                let _ = write!(di, "rpc_timeout({:?})", d);
                cfg.set_rpc_timeout(*d);
                locks.bits |= lock_bits::RPC_TIMEOUT;
                cfg.set_read_write_timeout(*d);
                locks.bits |= lock_bits::READ_WRITE_TIMEOUT;
            }
            OptKind::ConnectTimeout(d) => {
                let _ = write!(di, "connect_timeout({:?})", d);
                cfg.set_connect_timeout(*d);
                locks.bits |= lock_bits::CONNECT_TIMEOUT;
            }
            OptKind::Tag(key, value) => {
                let _ = write!(di, "{}({})", key, value);
                svr.set_tag(*key, value.clone());
                locks.tags.insert((*key).to_string());
            }
        }
        Ok(())
    }
}

/// Parses a forced target into an [`Instance`] with the default weight.
///
/// "host:port" parses as tcp; a filesystem path parses as unix. Anything
/// else is a bad option.
fn parse_instance(hostport: &str) -> Result<Instance, RpcError> {
    if hostport.parse::<std::net::SocketAddr>().is_ok() {
        return Ok(Instance::new(Network::Tcp, hostport));
    }
    if let Some((host, port)) = hostport.rsplit_once(':') {
        if !host.is_empty() && port.parse::<u16>().is_ok() {
            return Ok(Instance::new(Network::Tcp, hostport));
        }
    }
    if hostport.starts_with('/') || hostport.starts_with("./") {
        return Ok(Instance::new(Network::Unix, hostport));
    }
    Err(RpcError::bad_option(format!(
        "invalid host:port '{}'",
        hostport
    )))
}

#[derive(Default)]
struct CallOptionsBlock {
    locks: ConfigLocks,
}

impl CallOptionsBlock {
    fn zero(&mut self) {
        self.locks.zero();
    }
}

fn block_pool() -> &'static Mutex<Vec<Box<CallOptionsBlock>>> {
    static POOL: OnceLock<Mutex<Vec<Box<CallOptionsBlock>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(Vec::new()))
}

const MAX_POOLED_BLOCKS: usize = 128;

fn recycle(mut block: Box<CallOptionsBlock>) {
    block.zero();
    let mut pool = block_pool().lock();
    if pool.len() < MAX_POOLED_BLOCKS {
        pool.push(block);
    }
}

/// Applies call options to a call's config and remote info.
///
/// Returns the diagnostic trail recording each option's name and argument
/// in input order. `inherited` locks (e.g. from client-level options) are
/// merged before any option runs; all accumulated locks are written back
/// into `cfg` and `svr` before returning.
pub fn apply(
    opts: &[CallOpt],
    cfg: &mut RpcConfig,
    svr: &mut RemoteInfo,
    inherited: &ConfigLocks,
    http_resolver: &dyn HttpResolver,
) -> Result<String, RpcError> {
    let mut block = block_pool()
        .lock()
        .pop()
        .unwrap_or_else(|| Box::new(CallOptionsBlock::default()));
    block.locks.merge(inherited);

    let mut di = String::new();
    let mut run = || -> Result<(), RpcError> {
        if opts.is_empty() {
            return Ok(());
        }
        di.push('[');
        for (i, opt) in opts.iter().enumerate() {
            if i > 0 {
                di.push(',');
            }
            opt.apply(cfg, svr, &mut block.locks, http_resolver, &mut di)?;
        }
        di.push(']');
        Ok(())
    };

    match run() {
        Ok(()) => {
            block.locks.apply_locks(cfg, svr);
            recycle(block);
            Ok(di)
        }
        Err(err) => {
            recycle(block);
            Err(err)
        }
    }
}
