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

//! Service discovery: instances, resolver results, and change diffing.

use crate::context::Context;
use crate::error::RpcError;
use crate::rpcinfo::{EndpointInfo, Network};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Default instance weight when the registry does not supply one.
pub const DEFAULT_WEIGHT: u32 = 10;

/// One reachable endpoint of a service.
///
/// Identity (and therefore equality and hashing) is the (network,
/// address) pair. Weight and tags are attributes, not identity.
#[derive(Clone, Debug)]
pub struct Instance {
    network: Network,
    address: String,
    weight: u32,
    tags: HashMap<String, String>,
}

impl Instance {
    /// Creates an instance with [`DEFAULT_WEIGHT`] and no tags.
    pub fn new(network: Network, address: impl Into<String>) -> Self {
        Self {
            network,
            address: address.into(),
            weight: DEFAULT_WEIGHT,
            tags: HashMap::new(),
        }
    }

    /// Sets the weight. Weights below 1 are clamped to 1.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }

    /// Attaches a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The network kind of the address.
    pub fn network(&self) -> Network {
        self.network
    }

    /// The concrete address ("host:port" for tcp, a path for unix).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The load-balancing weight, always ≥ 1.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Reads a tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.network == other.network && self.address == other.address
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.network.hash(state);
        self.address.hash(state);
    }
}

/// The outcome of one resolution.
///
/// When `cacheable` is `false`, consumers must not retain the result past
/// the current call.
#[derive(Clone, Debug, Default)]
pub struct DiscoveryResult {
    /// Whether the result may be cached and refreshed in the background.
    pub cacheable: bool,
    /// The resolver's cache key for this result.
    pub cache_key: String,
    /// The resolved instances, in resolver order.
    pub instances: Vec<Arc<Instance>>,
}

/// The difference between two resolutions of the same key.
///
/// Invariant: `added` and `removed` are disjoint; `updated` contains
/// instances present in both sets (by identity) whose attributes changed.
#[derive(Clone, Debug, Default)]
pub struct Change {
    /// The new result the diff was computed against.
    pub result: DiscoveryResult,
    /// Instances present now but not before.
    pub added: Vec<Arc<Instance>>,
    /// Instances present in both whose weight or tags changed.
    pub updated: Vec<Arc<Instance>>,
    /// Instances present before but not now.
    pub removed: Vec<Arc<Instance>>,
}

impl Change {
    /// Returns `true` if anything actually changed.
    pub fn has_change(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty() || !self.removed.is_empty()
    }
}

/// Translates a logical target into a set of concrete endpoints.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// The key used for resolver-internal caching of this endpoint.
    fn target(&self, cx: &Context, endpoint: &EndpointInfo) -> String {
        let _ = cx;
        endpoint.service().to_string()
    }

    /// Resolves the key into endpoints.
    async fn resolve(&self, cx: &Context, key: &str) -> Result<DiscoveryResult, RpcError>;

    /// Diffs two resolutions of `key`. The default compares instance sets
    /// by identity.
    fn diff(&self, key: &str, prev: &DiscoveryResult, curr: &DiscoveryResult) -> Change {
        let _ = key;
        default_diff(prev, curr)
    }

    /// Stable name of the resolver, used in cache keys.
    fn name(&self) -> &str;
}

/// Default instance-set diff: identity by (network, address); an instance
/// in both sets counts as updated when its weight or tags differ.
pub fn default_diff(prev: &DiscoveryResult, curr: &DiscoveryResult) -> Change {
    let prev_set: HashMap<&Instance, &Arc<Instance>> =
        prev.instances.iter().map(|i| (i.as_ref(), i)).collect();
    let curr_set: HashSet<&Instance> = curr.instances.iter().map(|i| i.as_ref()).collect();

    let mut added = Vec::new();
    let mut updated = Vec::new();
    for ins in &curr.instances {
        match prev_set.get(ins.as_ref()) {
            None => added.push(ins.clone()),
            Some(old) => {
                if old.weight() != ins.weight() || old.tags != ins.tags {
                    updated.push(ins.clone());
                }
            }
        }
    }

    let removed = prev
        .instances
        .iter()
        .filter(|ins| !curr_set.contains(ins.as_ref()))
        .cloned()
        .collect();

    Change {
        result: curr.clone(),
        added,
        updated,
        removed,
    }
}
