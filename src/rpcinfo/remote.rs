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

//! The mutable view of a call's peer half.

use crate::discovery::Instance;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Tag set by a transport when the peer signalled it will shut down; the
/// connection must be discarded instead of returned to the pool.
pub const CONN_RESET_TAG: &str = "crrst";

/// Tag recording the original URL of a `url` call option.
pub const HTTP_URL: &str = "http_url";

/// Tag carrying the Host header value for RPC-over-HTTP.
pub const HTTP_HOST: &str = "http_host";

/// Tag selecting a target cluster during service discovery.
pub const CLUSTER_TAG: &str = "cluster";

/// Tag selecting a target IDC during service discovery.
pub const IDC_TAG: &str = "idc";

/// Network kind of an instance address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    /// TCP (host:port).
    Tcp,
    /// Unix domain socket (filesystem path).
    Unix,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Unix => write!(f, "unix"),
        }
    }
}

/// Mutable information about the remote side of a call.
///
/// Unlike the frozen caller half, the peer half changes during a call: the
/// picked [`Instance`] is installed after load balancing, and tags are set
/// by call options and transports. Tags locked by call options refuse later
/// writes.
#[derive(Clone, Debug, Default)]
pub struct RemoteInfo {
    service: String,
    method: String,
    instance: Option<Arc<Instance>>,
    tags: HashMap<String, String>,
    locked_tags: HashSet<String>,
}

impl RemoteInfo {
    /// Creates remote info for the given service and method.
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    /// The callee service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The callee method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The concrete instance this call targets, once picked or forced.
    pub fn instance(&self) -> Option<&Arc<Instance>> {
        self.instance.as_ref()
    }

    /// Installs the target instance.
    pub fn set_instance(&mut self, instance: Instance) {
        self.instance = Some(Arc::new(instance));
    }

    /// Installs an already-shared target instance.
    pub fn set_instance_shared(&mut self, instance: Arc<Instance>) {
        self.instance = Some(instance);
    }

    /// The network and address of the target instance, if one is installed.
    pub fn address(&self) -> Option<(Network, &str)> {
        self.instance
            .as_ref()
            .map(|ins| (ins.network(), ins.address()))
    }

    /// Sets a tag. Returns `false` without writing when the tag is locked.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.locked_tags.contains(&key) {
            return false;
        }
        self.tags.insert(key, value.into());
        true
    }

    /// Reads a tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Pins a tag so later writes are refused.
    pub fn lock_tag(&mut self, key: &str) {
        self.locked_tags.insert(key.to_string());
    }

    /// Clears everything for reuse, keeping map allocations.
    pub fn zero(&mut self) {
        self.service.clear();
        self.method.clear();
        self.instance = None;
        self.tags.clear();
        self.locked_tags.clear();
    }
}
