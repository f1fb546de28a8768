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

//! Weighted round-robin load balancer.
//!
//! Instances are expanded into a slot array proportional to their weights
//! (normalized by the gcd of all weights), and a shared atomic cursor walks
//! the array. Per cacheable result the balancer keeps one slot array behind
//! an [`ArcSwap`] so the cache refresher can swap it atomically while
//! pickers keep reading their snapshot.

use crate::context::Context;
use crate::discovery::{Change, DiscoveryResult, Instance};
use crate::loadbalance::{LoadBalancer, Picker, Rebalancer};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Slots {
    slots: Vec<Arc<Instance>>,
}

struct Shared {
    slots: ArcSwap<Slots>,
    cursor: AtomicUsize,
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn expand(res: &DiscoveryResult) -> Slots {
    let norm = res
        .instances
        .iter()
        .map(|i| i.weight())
        .fold(0, gcd)
        .max(1);
    let mut slots = Vec::new();
    for ins in &res.instances {
        for _ in 0..(ins.weight() / norm).max(1) {
            slots.push(ins.clone());
        }
    }
    Slots { slots }
}

/// Weighted round-robin balancer. This is the default load balancer.
pub struct WeightedRoundRobin {
    state: RwLock<HashMap<String, Arc<Shared>>>,
}

impl WeightedRoundRobin {
    /// Creates an empty balancer.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }

    fn shared_for(&self, res: &DiscoveryResult) -> Arc<Shared> {
        if let Some(shared) = self.state.read().get(&res.cache_key) {
            return shared.clone();
        }
        let mut state = self.state.write();
        state
            .entry(res.cache_key.clone())
            .or_insert_with(|| {
                Arc::new(Shared {
                    slots: ArcSwap::from_pointee(expand(res)),
                    cursor: AtomicUsize::new(0),
                })
            })
            .clone()
    }
}

impl Default for WeightedRoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn name(&self) -> &str {
        "weight_round_robin"
    }

    fn get_picker(&self, res: &DiscoveryResult) -> Box<dyn Picker> {
        if res.cacheable && !res.cache_key.is_empty() {
            let shared = self.shared_for(res);
            let snapshot = shared.slots.load_full();
            Box::new(WrrPicker {
                slots: snapshot,
                shared,
            })
        } else {
            // One-shot result: private cursor, nothing retained.
            let shared = Arc::new(Shared {
                slots: ArcSwap::from_pointee(expand(res)),
                cursor: AtomicUsize::new(0),
            });
            let snapshot = shared.slots.load_full();
            Box::new(WrrPicker {
                slots: snapshot,
                shared,
            })
        }
    }

    fn as_rebalancer(&self) -> Option<&dyn Rebalancer> {
        Some(self)
    }
}

impl Rebalancer for WeightedRoundRobin {
    fn rebalance(&self, change: &Change) {
        let state = self.state.read();
        if let Some(shared) = state.get(&change.result.cache_key) {
            shared.slots.store(Arc::new(expand(&change.result)));
        }
    }

    fn delete(&self, change: &Change) {
        self.state.write().remove(&change.result.cache_key);
    }
}

struct WrrPicker {
    /// Snapshot taken when the picker was built; stable for its lifetime.
    slots: Arc<Slots>,
    /// Shared cursor so concurrent pickers interleave instead of colliding.
    shared: Arc<Shared>,
}

impl Picker for WrrPicker {
    fn next(&self, _cx: &Context) -> Option<Arc<Instance>> {
        if self.slots.slots.is_empty() {
            return None;
        }
        let idx = self.shared.cursor.fetch_add(1, Ordering::Relaxed);
        Some(self.slots.slots[idx % self.slots.slots.len()].clone())
    }
}
