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

//! The per-call connection holder.
//!
//! A [`ConnWrapper`] is a pooled one-shot adapter: it acquires at most one
//! connection for the lifetime of a call and releases it exactly once.
//! Release routing: on error the connection is discarded; on success it is
//! discarded when the peer signalled shutdown via the conn-reset tag and
//! returned to the pool otherwise; without a pool it is closed.

use crate::context::Context;
use crate::error::RpcError;
use crate::remote::{BoxConn, Conn, ConnOption, ConnPool, Dialer};
use crate::rpcinfo::{RpcInfo, StatsEvent, StatsStatus, CONN_RESET_TAG};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// Pooled one-shot holder for a call's connection.
pub struct ConnWrapper {
    pool: Option<Arc<dyn ConnPool>>,
    conn: Option<BoxConn>,
}

fn wrapper_pool() -> &'static Mutex<Vec<Box<ConnWrapper>>> {
    static POOL: OnceLock<Mutex<Vec<Box<ConnWrapper>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(Vec::new()))
}

const MAX_POOLED_WRAPPERS: usize = 128;

impl ConnWrapper {
    /// Draws a wrapper from the free-list and installs the pool to use.
    pub fn acquire(pool: Option<Arc<dyn ConnPool>>) -> Box<ConnWrapper> {
        let mut wrapper = wrapper_pool()
            .lock()
            .pop()
            .unwrap_or_else(|| Box::new(ConnWrapper {
                pool: None,
                conn: None,
            }));
        wrapper.pool = pool;
        wrapper
    }

    /// Acquires a connection for the call's destination address.
    ///
    /// Uses the configured pool when present, the dialer otherwise, under
    /// the call's connect timeout. Records conn start/finish stats events
    /// around the attempt.
    pub async fn get_conn(
        &mut self,
        cx: &Context,
        dialer: &dyn Dialer,
        ri: &RpcInfo,
    ) -> Result<(), RpcError> {
        let (network, address) = match ri.to().address() {
            Some((network, addr)) => (network, addr.to_string()),
            None => return Err(RpcError::NoDestAddress),
        };
        let connect_timeout = ri.config().connect_timeout();

        ri.stats()
            .record(cx, StatsEvent::ClientConnStart, StatsStatus::Info, "");

        let cancel = cx.cancel_token().clone();
        let pool = self.pool.clone();
        let attempt = async {
            match &pool {
                Some(pool) => pool
                    .get(
                        cx,
                        network,
                        &address,
                        ConnOption {
                            dialer,
                            connect_timeout,
                        },
                    )
                    .await
                    .map_err(RpcError::get_connection),
                None => dialer
                    .dial_timeout(network, &address, connect_timeout)
                    .await
                    .map_err(RpcError::get_connection),
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(RpcError::Cancelled),
            result = attempt => result,
        };

        match result {
            Ok(conn) => {
                ri.stats()
                    .record(cx, StatsEvent::ClientConnFinish, StatsStatus::Info, "");
                self.conn = Some(conn);
                Ok(())
            }
            Err(err) => {
                ri.stats().record(
                    cx,
                    StatsEvent::ClientConnFinish,
                    StatsStatus::Error,
                    &err.to_string(),
                );
                Err(err)
            }
        }
    }

    /// The connection for transport use: the raw transport when the pool
    /// handed out a long-conn wrapper, the connection itself otherwise.
    pub fn conn_mut(&mut self) -> Option<&mut dyn Conn> {
        let conn = self.conn.as_mut()?;
        if conn.raw_conn().is_some() {
            conn.raw_conn()
        } else {
            Some(conn.as_mut())
        }
    }

    /// Releases the connection (if one was acquired) and recycles the
    /// wrapper. No-op on the connection when none was acquired.
    pub fn release_conn(mut self: Box<Self>, err: Option<&RpcError>, ri: &RpcInfo) {
        if let Some(conn) = self.conn.take() {
            match &self.pool {
                Some(pool) => {
                    if err.is_some() {
                        pool.discard(conn);
                    } else if ri.to().tag(CONN_RESET_TAG).is_some() {
                        tracing::debug!("discarding connection, peer will shut down");
                        pool.discard(conn);
                    } else {
                        pool.put(conn);
                    }
                }
                None => drop(conn),
            }
        }

        self.pool = None;
        let mut pool = wrapper_pool().lock();
        if pool.len() < MAX_POOLED_WRAPPERS {
            pool.push(self);
        }
    }
}
