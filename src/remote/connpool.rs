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

//! Connection pools.
//!
//! [`ConnPool`] is the contract the per-call connection wrapper consumes.
//! [`LongPool`] is the bundled long-lived implementation: idle connections
//! are kept per address, bounded, and handed back out as wrappers that
//! remember their routing key so [`ConnPool::put`] can file them by value.

use crate::context::Context;
use crate::error::BoxError;
use crate::remote::{BoxConn, Conn, ConnOption};
use crate::rpcinfo::Network;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context as TaskContext, Poll};

/// Pool of transport connections.
///
/// `get` may block until the option's connect timeout, then must fail.
/// `put` accepts any connection this pool previously returned and may
/// retain or close it. `discard` never reuses. `close` releases all
/// resources and makes the pool unusable.
#[async_trait]
pub trait ConnPool: Send + Sync {
    /// Acquires a connection to `address`, reusing an idle one when
    /// possible.
    async fn get(
        &self,
        cx: &Context,
        network: Network,
        address: &str,
        opt: ConnOption<'_>,
    ) -> Result<BoxConn, BoxError>;

    /// Returns a healthy connection for reuse.
    fn put(&self, conn: BoxConn);

    /// Disposes of a connection that must not be reused.
    fn discard(&self, conn: BoxConn);

    /// Releases all resources; the pool is unusable afterwards.
    async fn close(&self);

    /// Probes for the long-pool capability.
    fn as_long_pool(&self) -> Option<&dyn LongConnPool> {
        None
    }
}

/// Optional capability of pools that retain idle connections.
pub trait LongConnPool: Send + Sync {
    /// Evicts all idle connections to the given address.
    fn clean(&self, network: Network, address: &str);
}

fn route_key(network: Network, address: &str) -> String {
    format!("{}|{}", network, address)
}

/// Wrapper a [`LongPool`] hands out: forwards I/O to the raw transport and
/// carries the routing key the pool files it back under.
#[derive(Debug)]
struct PooledLongConn {
    inner: BoxConn,
    key: String,
}

impl tokio::io::AsyncRead for PooledLongConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for PooledLongConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl Conn for PooledLongConn {
    fn raw_conn(&mut self) -> Option<&mut dyn Conn> {
        Some(self.inner.as_mut())
    }

    fn pool_key(&self) -> Option<&str> {
        Some(&self.key)
    }
}

/// Long-lived connection pool with a bounded idle set per address.
pub struct LongPool {
    max_idle_per_address: usize,
    idle: Mutex<HashMap<String, Vec<BoxConn>>>,
    closed: AtomicBool,
}

impl LongPool {
    /// Creates a pool keeping up to `max_idle_per_address` idle
    /// connections per address.
    pub fn new(max_idle_per_address: usize) -> Self {
        Self {
            max_idle_per_address,
            idle: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of idle connections currently retained for the address.
    pub fn idle_len(&self, network: Network, address: &str) -> usize {
        self.idle
            .lock()
            .get(&route_key(network, address))
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for LongPool {
    fn default() -> Self {
        Self::new(8)
    }
}

#[async_trait]
impl ConnPool for LongPool {
    async fn get(
        &self,
        _cx: &Context,
        network: Network,
        address: &str,
        opt: ConnOption<'_>,
    ) -> Result<BoxConn, BoxError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Box::new(io::Error::new(
                io::ErrorKind::Other,
                "connection pool is closed",
            )));
        }

        let key = route_key(network, address);
        if let Some(conn) = self.idle.lock().get_mut(&key).and_then(Vec::pop) {
            return Ok(conn);
        }

        // Enforce the budget here as well: a dialer ignoring its timeout
        // must not hold the call past the contract.
        let timeout = opt.connect_timeout;
        let dial = opt.dialer.dial_timeout(network, address, timeout);
        let raw = if timeout.is_zero() {
            dial.await?
        } else {
            tokio::time::timeout(timeout, dial)
                .await
                .map_err(|_| {
                    Box::new(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("pool get for {} timed out after {:?}", address, timeout),
                    )) as BoxError
                })??
        };
        Ok(Box::new(PooledLongConn { inner: raw, key }))
    }

    fn put(&self, conn: BoxConn) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let key = match conn.pool_key() {
            Some(key) => key.to_string(),
            // Not one of ours; closing it is the only safe move.
            None => return,
        };
        let mut idle = self.idle.lock();
        let slot = idle.entry(key).or_default();
        if slot.len() < self.max_idle_per_address {
            slot.push(conn);
        }
    }

    fn discard(&self, conn: BoxConn) {
        drop(conn);
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.idle.lock().clear();
    }

    fn as_long_pool(&self) -> Option<&dyn LongConnPool> {
        Some(self)
    }
}

impl LongConnPool for LongPool {
    fn clean(&self, network: Network, address: &str) {
        self.idle.lock().remove(&route_key(network, address));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{DefaultDialer, Dialer};
    use std::time::Duration;

    async fn echo_listener() -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((_conn, _)) = listener.accept().await else {
                    return;
                };
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_get_put_reuses_connection() {
        let addr = echo_listener().await.to_string();
        let pool = LongPool::new(4);
        let dialer = DefaultDialer;
        let cx = Context::new();
        let opt = ConnOption {
            dialer: &dialer,
            connect_timeout: Duration::from_secs(1),
        };

        let conn = pool.get(&cx, Network::Tcp, &addr, opt).await.unwrap();
        assert!(conn.pool_key().is_some());
        pool.put(conn);
        assert_eq!(pool.idle_len(Network::Tcp, &addr), 1);

        let opt = ConnOption {
            dialer: &dialer,
            connect_timeout: Duration::from_secs(1),
        };
        let _conn = pool.get(&cx, Network::Tcp, &addr, opt).await.unwrap();
        assert_eq!(pool.idle_len(Network::Tcp, &addr), 0);
    }

    #[tokio::test]
    async fn test_idle_bounded() {
        let addr = echo_listener().await.to_string();
        let pool = LongPool::new(1);
        let dialer = DefaultDialer;
        let cx = Context::new();

        let mut conns = Vec::new();
        for _ in 0..3 {
            let opt = ConnOption {
                dialer: &dialer,
                connect_timeout: Duration::from_secs(1),
            };
            conns.push(pool.get(&cx, Network::Tcp, &addr, opt).await.unwrap());
        }
        for conn in conns {
            pool.put(conn);
        }
        assert_eq!(pool.idle_len(Network::Tcp, &addr), 1);
    }

    struct HangingDialer;

    #[async_trait]
    impl Dialer for HangingDialer {
        async fn dial_timeout(
            &self,
            _network: Network,
            _address: &str,
            _timeout: Duration,
        ) -> io::Result<BoxConn> {
            // Deliberately ignores the timeout contract.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_get_enforces_connect_timeout() {
        let pool = LongPool::new(4);
        let dialer = HangingDialer;
        let cx = Context::new();
        let opt = ConnOption {
            dialer: &dialer,
            connect_timeout: Duration::from_millis(50),
        };

        let start = std::time::Instant::now();
        let err = pool
            .get(&cx, Network::Tcp, "10.0.0.1:1", opt)
            .await
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(2));
        let ioe = err.downcast_ref::<io::Error>().unwrap();
        assert_eq!(ioe.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_clean_evicts_idle() {
        let addr = echo_listener().await.to_string();
        let pool = LongPool::new(4);
        let dialer = DefaultDialer;
        let cx = Context::new();
        let opt = ConnOption {
            dialer: &dialer,
            connect_timeout: Duration::from_secs(1),
        };

        let conn = pool.get(&cx, Network::Tcp, &addr, opt).await.unwrap();
        pool.put(conn);
        pool.as_long_pool().unwrap().clean(Network::Tcp, &addr);
        assert_eq!(pool.idle_len(Network::Tcp, &addr), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_get() {
        let pool = LongPool::new(4);
        pool.close().await;
        let dialer = DefaultDialer;
        let cx = Context::new();
        let opt = ConnOption {
            dialer: &dialer,
            connect_timeout: Duration::from_secs(1),
        };
        assert!(pool.get(&cx, Network::Tcp, "127.0.0.1:1", opt).await.is_err());
    }
}
