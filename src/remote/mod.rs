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

//! Transport-facing layer: connections, dialers, pools, the per-call
//! connection wrapper, and the bound-handler pipeline around the codec.

pub mod buffer;
pub mod client_handler;
pub mod conn_wrapper;
pub mod connpool;
pub mod dialer;
pub mod http;
pub mod message;
pub mod pipeline;
pub mod transmeta;

pub use buffer::{ReaderBuffer, WriterBuffer};
pub use client_handler::ClientTransHandler;
pub use conn_wrapper::ConnWrapper;
pub use connpool::{ConnPool, LongConnPool, LongPool};
pub use dialer::DefaultDialer;
pub use http::{DefaultHttpResolver, HttpResolver};
pub use message::{Message, MessageType, Payload, RpcRole};
pub use pipeline::{BoundHandler, TransHandler, TransPipeline};
pub use transmeta::{MetaHandler, MetainfoMetaHandler, TransMetaHandler};

use crate::rpcinfo::Network;
use async_trait::async_trait;
use std::io;
use std::time::Duration;

/// A transport connection usable by one call at a time.
///
/// The two probe methods are optional capabilities with `None` defaults:
/// long-lived pool wrappers expose the raw transport they guard through
/// [`Conn::raw_conn`], and carry their pool routing key in
/// [`Conn::pool_key`] so a pool can accept them back by value.
pub trait Conn: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + std::fmt::Debug {
    /// The underlying raw transport, for wrappers that guard one.
    fn raw_conn(&mut self) -> Option<&mut dyn Conn> {
        None
    }

    /// The pool routing key, for connections owned by a pool.
    fn pool_key(&self) -> Option<&str> {
        None
    }
}

impl Conn for tokio::net::TcpStream {}
impl Conn for tokio::net::UnixStream {}
impl Conn for tokio::io::DuplexStream {}

/// Owned connection handle.
pub type BoxConn = Box<dyn Conn>;

/// Parameters for one pool acquisition.
pub struct ConnOption<'a> {
    /// Dialer the pool uses when it has no idle connection.
    pub dialer: &'a dyn Dialer,
    /// Budget for the acquisition. Zero means no limit.
    pub connect_timeout: Duration,
}

/// Establishes transport connections.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dials `address` on `network`, failing after `timeout` (zero means
    /// no limit). Timeouts surface as [`io::ErrorKind::TimedOut`].
    async fn dial_timeout(
        &self,
        network: Network,
        address: &str,
        timeout: Duration,
    ) -> io::Result<BoxConn>;
}
