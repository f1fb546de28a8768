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

//! Per-call state passed through every layer of a call.
//!
//! An [`RpcInfo`] is allocated on call entry from a free-list, mutated only
//! while call options are applied, and treated as read-only once the call
//! reaches I/O. It is recycled exactly once, after the call's last observer
//! has finished. Double-recycle is a bug in the caller.

pub mod config;
pub mod remote;
pub mod stats;

pub use config::{lock_bits, ConfigLocks, InteractionMode, RpcConfig};
pub use remote::{
    Network, RemoteInfo, CLUSTER_TAG, CONN_RESET_TAG, HTTP_HOST, HTTP_URL, IDC_TAG,
};
pub use stats::{BufferingRecorder, NoopRecorder, RpcStats, StatsEvent, StatsRecorder, StatsStatus};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// The immutable caller half of a call: who is calling, from where.
#[derive(Clone, Debug, Default)]
pub struct EndpointInfo {
    service: String,
    method: String,
    tags: HashMap<String, String>,
}

impl EndpointInfo {
    /// Creates endpoint info for a service and method.
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            tags: HashMap::new(),
        }
    }

    /// The service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Attaches a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Reads a tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    fn zero(&mut self) {
        self.service.clear();
        self.method.clear();
        self.tags.clear();
    }
}

static NEXT_SEQ_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of one invocation: service, method, and a process-unique
/// sequence id used for reply correlation.
#[derive(Clone, Debug, Default)]
pub struct Invocation {
    seq_id: u32,
    service: String,
    method: String,
}

impl Invocation {
    /// Creates an invocation with a fresh sequence id.
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            seq_id: NEXT_SEQ_ID.fetch_add(1, Ordering::Relaxed),
            service: service.into(),
            method: method.into(),
        }
    }

    /// The sequence id stamped into the wire message.
    pub fn seq_id(&self) -> u32 {
        self.seq_id
    }

    /// The callee service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The callee method.
    pub fn method(&self) -> &str {
        &self.method
    }

    fn zero(&mut self) {
        self.seq_id = 0;
        self.service.clear();
        self.method.clear();
    }
}

/// The bag of per-call state: endpoints, config, stats, invocation.
#[derive(Debug)]
pub struct RpcInfo {
    from: EndpointInfo,
    to: RemoteInfo,
    config: RpcConfig,
    stats: RpcStats,
    invocation: Invocation,
}

fn rpcinfo_pool() -> &'static Mutex<Vec<Box<RpcInfo>>> {
    static POOL: OnceLock<Mutex<Vec<Box<RpcInfo>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(Vec::new()))
}

const MAX_POOLED_RPCINFO: usize = 256;

impl RpcInfo {
    /// Draws an `RpcInfo` from the free-list (or allocates) and fills it.
    pub fn alloc(
        from: EndpointInfo,
        to: RemoteInfo,
        config: RpcConfig,
        stats: RpcStats,
        invocation: Invocation,
    ) -> Box<RpcInfo> {
        let mut info = rpcinfo_pool().lock().pop().unwrap_or_else(|| {
            Box::new(RpcInfo {
                from: EndpointInfo::default(),
                to: RemoteInfo::default(),
                config: RpcConfig::default(),
                stats: RpcStats::noop(),
                invocation: Invocation::default(),
            })
        });
        info.from = from;
        info.to = to;
        info.config = config;
        info.stats = stats;
        info.invocation = invocation;
        info
    }

    /// Zeros the info and returns it to the free-list. Must be called
    /// exactly once, after the call's last observer has finished.
    pub fn recycle(mut info: Box<RpcInfo>) {
        info.zero();
        let mut pool = rpcinfo_pool().lock();
        if pool.len() < MAX_POOLED_RPCINFO {
            pool.push(info);
        }
    }

    /// The caller half.
    pub fn from(&self) -> &EndpointInfo {
        &self.from
    }

    /// The peer half.
    pub fn to(&self) -> &RemoteInfo {
        &self.to
    }

    /// Mutable peer half; only valid before the call reaches I/O.
    pub fn to_mut(&mut self) -> &mut RemoteInfo {
        &mut self.to
    }

    /// The call configuration.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Mutable configuration; only valid before the call reaches I/O.
    pub fn config_mut(&mut self) -> &mut RpcConfig {
        &mut self.config
    }

    /// The stats handle.
    pub fn stats(&self) -> &RpcStats {
        &self.stats
    }

    /// The invocation identity.
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    fn zero(&mut self) {
        self.from.zero();
        self.to.zero();
        self.config.zero();
        self.stats = RpcStats::noop();
        self.invocation.zero();
    }
}
