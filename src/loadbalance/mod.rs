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

//! Load balancing: pickers, balancers, and the process-wide balancer cache.

pub mod cache;
pub mod weighted;

pub use cache::{cache_key, new_balancer_factory, Balancer, BalancerFactory, CacheOptions};
pub use weighted::WeightedRoundRobin;

use crate::context::Context;
use crate::discovery::{Change, DiscoveryResult, Instance};
use std::sync::Arc;

/// A stateful selector yielding one instance per call.
///
/// `None` means "no instance available"; the caller maps that to a
/// retryable no-destination error.
pub trait Picker: Send + Sync {
    /// Picks the next instance for a call.
    fn next(&self, cx: &Context) -> Option<Arc<Instance>>;
}

/// Produces pickers from resolver results.
pub trait LoadBalancer: Send + Sync {
    /// Stable name, used in cache keys.
    fn name(&self) -> &str;

    /// Builds a picker over the given result.
    fn get_picker(&self, res: &DiscoveryResult) -> Box<dyn Picker>;

    /// Probes for the rebalance capability. Balancers that keep per-result
    /// state return themselves here so the cache refresher can update and
    /// release it.
    fn as_rebalancer(&self) -> Option<&dyn Rebalancer> {
        None
    }
}

/// Optional capability: react to instance-set changes pushed by the cache
/// refresher.
///
/// Implementations must swap their internal picker state atomically:
/// concurrent pickers see either the old or the new set, never a torn
/// intermediate.
pub trait Rebalancer: Send + Sync {
    /// Applies an instance-set change.
    fn rebalance(&self, change: &Change);

    /// Releases per-result state when a cache entry expires.
    fn delete(&self, change: &Change);
}
