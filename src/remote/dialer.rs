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

//! Default dialer over tokio's TCP and unix streams.

use crate::remote::{BoxConn, Dialer};
use crate::rpcinfo::Network;
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::net::{TcpStream, UnixStream};

fn timed_out(network: Network, address: &str, timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!(
            "connect {}://{} timed out after {:?}",
            network, address, timeout
        ),
    )
}

/// Dialer backed by `TcpStream::connect` / `UnixStream::connect`.
#[derive(Debug, Default)]
pub struct DefaultDialer;

#[async_trait]
impl Dialer for DefaultDialer {
    async fn dial_timeout(
        &self,
        network: Network,
        address: &str,
        timeout: Duration,
    ) -> io::Result<BoxConn> {
        match network {
            Network::Tcp => {
                let stream = if timeout.is_zero() {
                    TcpStream::connect(address).await?
                } else {
                    tokio::time::timeout(timeout, TcpStream::connect(address))
                        .await
                        .map_err(|_| timed_out(network, address, timeout))??
                };
                let _ = stream.set_nodelay(true);
                Ok(Box::new(stream))
            }
            Network::Unix => {
                let stream = if timeout.is_zero() {
                    UnixStream::connect(address).await?
                } else {
                    tokio::time::timeout(timeout, UnixStream::connect(address))
                        .await
                        .map_err(|_| timed_out(network, address, timeout))??
                };
                Ok(Box::new(stream))
            }
        }
    }
}
