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

//! Process-wide cache of balancers keyed by (resolver, lb, options).
//!
//! [`new_balancer_factory`] is the sole construction point: the same
//! (resolver name, balancer name, options) triple always yields the same
//! factory. Each factory owns a second-level cache from resolution key to
//! [`Balancer`] entry, kept fresh by one background task per factory.
//!
//! The refresher wakes every `refresh_interval`: entries past their expire
//! deadline are evicted (with [`Rebalancer::delete`] when the capability is
//! present); live entries are re-resolved and diffed, and changes are
//! pushed through [`Rebalancer::rebalance`]. Pickers taken from a balancer
//! observe either the old or the new instance set, never a torn
//! intermediate.

use crate::context::{CancelToken, Context};
use crate::discovery::{Change, DiscoveryResult, Resolver};
use crate::error::RpcError;
use crate::loadbalance::{LoadBalancer, Picker};
use crate::rpcinfo::EndpointInfo;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Default interval between background refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Default idle time after which a cache entry expires.
pub const DEFAULT_EXPIRE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Tuning for one balancer cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheOptions {
    /// How often the refresher re-resolves live entries. Must be > 0.
    pub refresh_interval: Duration,
    /// How long an entry lives without being fetched. Must exceed
    /// `refresh_interval`.
    pub expire_interval: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            expire_interval: DEFAULT_EXPIRE_INTERVAL,
        }
    }
}

impl CacheOptions {
    fn normalized(mut self) -> Self {
        if self.refresh_interval.is_zero() {
            self.refresh_interval = DEFAULT_REFRESH_INTERVAL;
        }
        if self.expire_interval <= self.refresh_interval {
            self.expire_interval = DEFAULT_EXPIRE_INTERVAL.max(self.refresh_interval * 3);
        }
        self
    }
}

/// Formats a duration the way the upstream runtime prints one: `15s`,
/// `5m0s`, `1h30m0s`, `500ms`, `1.5s`.
fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return fractional(nanos, 1_000, "µs");
    }
    if nanos < 1_000_000_000 {
        return fractional(nanos, 1_000_000, "ms");
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || mins > 0 {
        out.push_str(&format!("{}m", mins));
    }
    if d.subsec_nanos() == 0 {
        out.push_str(&format!("{}s", secs));
    } else {
        let mut frac = format!("{:09}", d.subsec_nanos());
        while frac.ends_with('0') {
            frac.pop();
        }
        out.push_str(&format!("{}.{}s", secs, frac));
    }
    out
}

fn fractional(nanos: u128, unit: u128, suffix: &str) -> String {
    let whole = nanos / unit;
    let rem = nanos % unit;
    if rem == 0 {
        return format!("{}{}", whole, suffix);
    }
    let width: usize = match unit {
        1_000 => 3,
        _ => 6,
    };
    let mut frac = format!("{:0width$}", rem, width = width);
    while frac.ends_with('0') {
        frac.pop();
    }
    format!("{}.{}{}", whole, frac, suffix)
}

/// The first-level cache key: resolver name, balancer name, and formatted
/// options.
pub fn cache_key(resolver: &str, balancer: &str, opts: CacheOptions) -> String {
    format!(
        "{}|{}|{{{} {}}}",
        resolver,
        balancer,
        format_duration(opts.refresh_interval),
        format_duration(opts.expire_interval)
    )
}

fn factories() -> &'static Mutex<HashMap<String, Arc<BalancerFactory>>> {
    static FACTORIES: OnceLock<Mutex<HashMap<String, Arc<BalancerFactory>>>> = OnceLock::new();
    FACTORIES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the process-wide factory for the triple, creating and starting
/// it on first use.
///
/// Stability contract: as long as `resolver.name()` and `lb.name()` are
/// stable, two calls with equal options return the same factory object.
pub fn new_balancer_factory(
    resolver: Arc<dyn Resolver>,
    lb: Arc<dyn LoadBalancer>,
    opts: CacheOptions,
) -> Arc<BalancerFactory> {
    let opts = opts.normalized();
    let key = cache_key(resolver.name(), lb.name(), opts);
    let mut map = factories().lock();
    if let Some(factory) = map.get(&key) {
        return factory.clone();
    }
    let factory = BalancerFactory::start(resolver, lb, opts);
    map.insert(key, factory.clone());
    factory
}

/// A cached balancer: an atomically refreshable resolver result plus the
/// load balancer that builds pickers over it.
pub struct Balancer {
    /// The resolver key this entry re-resolves with.
    target: String,
    res: ArcSwap<DiscoveryResult>,
    lb: Arc<dyn LoadBalancer>,
    expire_at: Mutex<Instant>,
}

impl Balancer {
    fn new(target: String, res: DiscoveryResult, lb: Arc<dyn LoadBalancer>, ttl: Duration) -> Self {
        Self {
            target,
            res: ArcSwap::from_pointee(res),
            lb,
            expire_at: Mutex::new(Instant::now() + ttl),
        }
    }

    /// Builds a picker over the current snapshot.
    pub fn get_picker(&self) -> Box<dyn Picker> {
        self.lb.get_picker(&self.res.load())
    }

    /// The current resolver result snapshot.
    pub fn result(&self) -> Arc<DiscoveryResult> {
        self.res.load_full()
    }
}

/// Owner of cached balancers and their refresh lifecycle.
pub struct BalancerFactory {
    resolver: Arc<dyn Resolver>,
    lb: Arc<dyn LoadBalancer>,
    opts: CacheOptions,
    cache: Arc<RwLock<HashMap<String, Arc<Balancer>>>>,
    stop: CancelToken,
    refresher: Mutex<Option<JoinHandle<()>>>,
    refresher_started: std::sync::atomic::AtomicBool,
}

impl BalancerFactory {
    fn start(
        resolver: Arc<dyn Resolver>,
        lb: Arc<dyn LoadBalancer>,
        opts: CacheOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            resolver,
            lb,
            opts,
            cache: Arc::new(RwLock::new(HashMap::new())),
            stop: CancelToken::new(),
            refresher: Mutex::new(None),
            refresher_started: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Spawns the refresher on first use. Deferred to the first `get` so
    /// factory construction does not require a running runtime.
    fn ensure_refresher(&self) {
        use std::sync::atomic::Ordering;
        if self
            .refresher_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let task = RefreshTask {
                resolver: self.resolver.clone(),
                lb: self.lb.clone(),
                opts: self.opts,
                cache: self.cache.clone(),
                stop: self.stop.clone(),
            };
            *self.refresher.lock() = Some(tokio::spawn(task.run()));
        }
    }

    /// Resolves the endpoint and returns a balancer for the result.
    ///
    /// Cacheable results share one balancer per resolution key; fetching a
    /// cached entry pushes its expire deadline out by `expire_interval`.
    /// Non-cacheable results get a fresh, unretained balancer.
    pub async fn get(
        &self,
        cx: &Context,
        endpoint: &EndpointInfo,
    ) -> Result<Arc<Balancer>, RpcError> {
        self.ensure_refresher();
        let target = self.resolver.target(cx, endpoint);
        let mut res = self.resolver.resolve(cx, &target).await?;

        if !res.cacheable {
            return Ok(Arc::new(Balancer::new(
                target,
                res,
                self.lb.clone(),
                self.opts.expire_interval,
            )));
        }

        // Balancer state downstream is keyed by the result's cache key, so
        // prefix it with the resolver name to keep resolvers from colliding.
        res.cache_key = format!("{}:{}", self.resolver.name(), res.cache_key);
        let key = res.cache_key.clone();

        if let Some(entry) = self.cache.read().get(&key) {
            *entry.expire_at.lock() = Instant::now() + self.opts.expire_interval;
            return Ok(entry.clone());
        }

        let mut cache = self.cache.write();
        if let Some(entry) = cache.get(&key) {
            *entry.expire_at.lock() = Instant::now() + self.opts.expire_interval;
            return Ok(entry.clone());
        }
        let entry = Arc::new(Balancer::new(
            target,
            res,
            self.lb.clone(),
            self.opts.expire_interval,
        ));
        cache.insert(key, entry.clone());
        Ok(entry)
    }

    /// Number of live cache entries. Mostly useful for diagnostics.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Stops the background refresher and waits for it to exit.
    pub async fn close(&self) {
        self.stop.cancel();
        let handle = self.refresher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// The state one background refresher runs over; shares the entry map
/// with its factory.
struct RefreshTask {
    resolver: Arc<dyn Resolver>,
    lb: Arc<dyn LoadBalancer>,
    opts: CacheOptions,
    cache: Arc<RwLock<HashMap<String, Arc<Balancer>>>>,
    stop: CancelToken,
}

impl RefreshTask {
    async fn run(self) {
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => return,
                _ = tokio::time::sleep(self.opts.refresh_interval) => {}
            }

            let entries: Vec<(String, Arc<Balancer>)> = self
                .cache
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let now = Instant::now();

            for (key, entry) in entries {
                if now > *entry.expire_at.lock() {
                    self.cache.write().remove(&key);
                    if let Some(rb) = self.lb.as_rebalancer() {
                        let old = entry.res.load_full();
                        rb.delete(&Change {
                            result: DiscoveryResult {
                                cacheable: true,
                                cache_key: key.clone(),
                                instances: Vec::new(),
                            },
                            removed: old.instances.clone(),
                            ..Default::default()
                        });
                    }
                    continue;
                }

                let cx = Context::new();
                match self.resolver.resolve(&cx, &entry.target).await {
                    Err(err) => {
                        tracing::warn!(target = %entry.target, error = %err, "balancer refresh: resolve failed");
                    }
                    Ok(mut new_res) => {
                        new_res.cache_key = key.clone();
                        let old = entry.res.load_full();
                        let change = self.resolver.diff(&key, &old, &new_res);
                        if change.has_change() {
                            entry.res.store(Arc::new(new_res));
                            if let Some(rb) = self.lb.as_rebalancer() {
                                rb.rebalance(&change);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Instance;
    use crate::loadbalance::WeightedRoundRobin;
    use crate::rpcinfo::Network;
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct FixedResolver {
        name: String,
        cache_key: String,
        instances: Vec<Arc<Instance>>,
    }

    #[async_trait]
    impl Resolver for FixedResolver {
        async fn resolve(&self, _cx: &Context, _key: &str) -> Result<DiscoveryResult, RpcError> {
            Ok(DiscoveryResult {
                cacheable: true,
                cache_key: self.cache_key.clone(),
                instances: self.instances.clone(),
            })
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn test_cache_key_literal() {
        let opts = CacheOptions {
            refresh_interval: Duration::from_secs(15),
            expire_interval: Duration::from_secs(5 * 60),
        };
        assert_eq!(cache_key("hello", "world", opts), "hello|world|{15s 5m0s}");
    }

    #[test]
    fn test_format_duration_cases() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(15)), "15s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m0s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
    }

    #[tokio::test]
    async fn test_factory_deduplicated_by_triple() {
        let resolver = Arc::new(FixedResolver {
            name: "test_factory_deduplicated_by_triple".to_string(),
            cache_key: "svc".to_string(),
            instances: vec![Arc::new(Instance::new(Network::Tcp, "0"))],
        });
        let lb = Arc::new(WeightedRoundRobin::new());
        let a = new_balancer_factory(resolver.clone(), lb.clone(), CacheOptions::default());
        let b = new_balancer_factory(resolver, lb, CacheOptions::default());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_balancer_shared_across_gets() {
        let count = 10;
        let instances: Vec<Arc<Instance>> = (0..count)
            .map(|i| Arc::new(Instance::new(Network::Tcp, i.to_string())))
            .collect();
        let resolver = Arc::new(FixedResolver {
            name: "test_balancer_shared_across_gets".to_string(),
            cache_key: "svc".to_string(),
            instances,
        });
        let lb = Arc::new(WeightedRoundRobin::new());
        let cx = Context::new();
        let endpoint = EndpointInfo::new("svc", "");

        let mut first: Option<Arc<Balancer>> = None;
        let valid: HashSet<String> = (0..count).map(|i| i.to_string()).collect();
        for _ in 0..count {
            let factory =
                new_balancer_factory(resolver.clone(), lb.clone(), CacheOptions::default());
            let balancer = factory.get(&cx, &endpoint).await.unwrap();
            match &first {
                None => first = Some(balancer.clone()),
                Some(prev) => assert!(Arc::ptr_eq(prev, &balancer)),
            }
            let picker = balancer.get_picker();
            for _ in 0..count {
                let addr = picker.next(&cx).unwrap().address().to_string();
                assert!(valid.contains(&addr), "unexpected address {}", addr);
            }
        }
    }

    #[tokio::test]
    async fn test_cache_key_prefixed_with_resolver_name() {
        let resolver = Arc::new(FixedResolver {
            name: "test_cache_key_prefixed".to_string(),
            cache_key: "1".to_string(),
            instances: vec![Arc::new(Instance::new(Network::Tcp, "1"))],
        });
        let lb = Arc::new(WeightedRoundRobin::new());
        let factory = new_balancer_factory(resolver, lb, CacheOptions::default());
        let balancer = factory
            .get(&Context::new(), &EndpointInfo::new("svc", ""))
            .await
            .unwrap();
        assert_eq!(balancer.result().cache_key, "test_cache_key_prefixed:1");
    }

    struct UncacheableResolver {
        name: String,
    }

    #[async_trait]
    impl Resolver for UncacheableResolver {
        async fn resolve(&self, _cx: &Context, _key: &str) -> Result<DiscoveryResult, RpcError> {
            Ok(DiscoveryResult {
                cacheable: false,
                cache_key: String::new(),
                instances: vec![Arc::new(Instance::new(Network::Tcp, "solo"))],
            })
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    #[tokio::test]
    async fn test_uncacheable_result_not_retained() {
        let resolver = Arc::new(UncacheableResolver {
            name: "test_uncacheable_result_not_retained".to_string(),
        });
        let lb = Arc::new(WeightedRoundRobin::new());
        let factory = new_balancer_factory(resolver, lb, CacheOptions::default());
        let cx = Context::new();
        let endpoint = EndpointInfo::new("svc", "");

        let a = factory.get(&cx, &endpoint).await.unwrap();
        let b = factory.get(&cx, &endpoint).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(factory.cached_len(), 0);
    }
}
